use std::{
    fmt,
    fs::File,
    io::{Read as _, Write as _},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use regpub_utils::{
    fs::{copy_file, create_unique_temp_dir, safe_remove},
    hash::integrity_hash,
};
use tracing::{debug, warn};
use url::Url;

use crate::{
    error::{DownloadError, Result},
    http_client,
    retry::{retry, RetryEvent, RetryPolicy},
    utils::filename_from_url,
};

const DEFAULT_BACKOFF_DELAY_FACTOR: Duration = Duration::from_secs(10);
const DEFAULT_RETRIES: u32 = 3;

pub type RetryHook = Arc<dyn Fn(&RetryEvent) + Send + Sync>;

/// Knobs for [`Artifact::download`].
#[derive(Clone)]
pub struct DownloadOptions {
    /// Base delay of the exponential backoff between attempts.
    pub backoff_delay_factor: Duration,
    /// Attempts made after the first one fails.
    pub retries: u32,
    pub on_retry: Option<RetryHook>,
}

impl Default for DownloadOptions {
    fn default() -> Self {
        Self {
            backoff_delay_factor: DEFAULT_BACKOFF_DELAY_FACTOR,
            retries: DEFAULT_RETRIES,
            on_retry: None,
        }
    }
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("backoff_delay_factor", &self.backoff_delay_factor)
            .field("retries", &self.retries)
            .field("on_retry", &self.on_retry.is_some())
            .finish()
    }
}

impl DownloadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn backoff_delay_factor(mut self, factor: Duration) -> Self {
        self.backoff_delay_factor = factor;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Registers a hook that runs once for every failed attempt that will be retried.
    pub fn on_retry<F>(mut self, hook: F) -> Self
    where
        F: Fn(&RetryEvent) + Send + Sync + 'static,
    {
        self.on_retry = Some(Arc::new(hook));
        self
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(self.retries.saturating_add(1))
            .with_base_delay(self.backoff_delay_factor)
            .with_jitter(0.2)
    }
}

enum State {
    Pending,
    Downloaded { dir: PathBuf, path: PathBuf },
    Released,
}

/// A remote file fetched into its own temporary directory.
///
/// An artifact downloads at most once. The temporary directory is removed by
/// [`Artifact::cleanup`] or, failing that, when the artifact is dropped.
pub struct Artifact {
    url: String,
    state: State,
}

impl Artifact {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: State::Pending,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn is_downloaded(&self) -> bool {
        matches!(self.state, State::Downloaded { .. })
    }

    /// Downloads the artifact and returns the path of the local copy.
    ///
    /// `file://` URLs are copied from disk. Anything else goes through HTTP with retries on
    /// network failures, 404 and 5xx responses.
    ///
    /// # Errors
    ///
    /// * [`DownloadError::AlreadyDownloaded`] if this artifact was downloaded before.
    /// * [`DownloadError::ArtifactDownload`] for a failing HTTP status after retries.
    /// * [`DownloadError::NoResponse`] / [`DownloadError::RequestNotSent`] for transport
    ///   failures after retries.
    pub fn download(&mut self, options: &DownloadOptions) -> Result<&Path> {
        if !matches!(self.state, State::Pending) {
            return Err(DownloadError::AlreadyDownloaded {
                url: self.url.clone(),
            });
        }

        let parsed = Url::parse(&self.url).map_err(|source| {
            DownloadError::InvalidUrl {
                url: self.url.clone(),
                source,
            }
        })?;
        let filename = filename_from_url(&self.url).ok_or_else(|| {
            DownloadError::NoFilename {
                url: self.url.clone(),
            }
        })?;

        let dir = create_unique_temp_dir("artifact")?;
        let dest = dir.join(&filename);

        let result = if parsed.scheme() == "file" {
            copy_local(&parsed, &self.url, &dest)
        } else {
            fetch_with_retry(&self.url, &dest, options)
        };

        if let Err(err) = result {
            let _ = safe_remove(&dir);
            return Err(err);
        }

        debug!(url = %self.url, path = %dest.display(), "artifact downloaded");
        self.state = State::Downloaded {
            dir,
            path: dest,
        };
        self.disk_path()
    }

    /// Path of the downloaded file.
    pub fn disk_path(&self) -> Result<&Path> {
        match &self.state {
            State::Downloaded { path, .. } => Ok(path.as_path()),
            _ => {
                Err(DownloadError::NotDownloaded {
                    url: self.url.clone(),
                })
            }
        }
    }

    /// SRI integrity string (`sha256-<base64>`) of the downloaded bytes.
    pub fn compute_integrity_hash(&self) -> Result<String> {
        Ok(integrity_hash(self.disk_path()?)?)
    }

    /// Deletes the downloaded file and its directory. The path accessor fails afterwards.
    pub fn cleanup(&mut self) {
        if let State::Downloaded { dir, .. } = std::mem::replace(&mut self.state, State::Released) {
            if let Err(err) = safe_remove(&dir) {
                warn!(url = %self.url, "failed to remove artifact: {err}");
            }
        }
    }
}

impl Drop for Artifact {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn copy_local(parsed: &Url, url: &str, dest: &Path) -> Result<()> {
    let source = parsed.to_file_path().map_err(|_| {
        DownloadError::RequestNotSent {
            url: url.to_string(),
            reason: "not a local file path".to_string(),
        }
    })?;
    copy_file(&source, dest)?;
    Ok(())
}

fn fetch_with_retry(url: &str, dest: &Path, options: &DownloadOptions) -> Result<()> {
    let policy = options.retry_policy();
    let (result, stats) = retry(
        &policy,
        |_| fetch_to_file(url, dest),
        DownloadError::is_retryable,
        |event| {
            if let Some(hook) = &options.on_retry {
                hook(event);
            }
        },
    );

    if stats.attempts > 1 {
        debug!(url, attempts = stats.attempts, "download finished after retrying");
    }
    result
}

fn fetch_to_file(url: &str, dest: &Path) -> Result<()> {
    let resp = http_client::agent()
        .get(url)
        .call()
        .map_err(|err| DownloadError::from_ureq(url, err))?;

    let status = resp.status().as_u16();
    if !(200..300).contains(&status) {
        return Err(DownloadError::ArtifactDownload {
            url: url.to_string(),
            status,
        });
    }

    let mut file = File::create(dest)?;
    let mut reader = resp.into_body().into_reader();
    let mut buffer = [0u8; 8192];

    loop {
        let n = reader.read(&mut buffer).map_err(|source| {
            DownloadError::Interrupted {
                url: url.to_string(),
                source,
            }
        })?;
        if n == 0 {
            break;
        }
        file.write_all(&buffer[..n])?;
    }
    file.flush()?;

    Ok(())
}
