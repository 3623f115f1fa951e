use regpub_config::config::SecretNames;
use tracing::debug;

use crate::error::{PublishError, PublishResult};

pub trait SecretsClient: Send + Sync {
    fn access_secret(&self, name: &str) -> PublishResult<String>;
}

/// Reads secrets from environment variables named after the secret, uppercased with `-`
/// replaced by `_` (`github-app-private-key` becomes `GITHUB_APP_PRIVATE_KEY`).
#[derive(Debug, Default, Clone)]
pub struct EnvSecretsClient;

impl EnvSecretsClient {
    pub fn variable_name(secret: &str) -> String {
        secret.to_ascii_uppercase().replace('-', "_")
    }
}

impl SecretsClient for EnvSecretsClient {
    fn access_secret(&self, name: &str) -> PublishResult<String> {
        let var = Self::variable_name(name);
        std::env::var(&var).map_err(|err| {
            PublishError::Secret {
                name: name.to_string(),
                message: format!("{var}: {err}"),
            }
        })
    }
}

/// Credentials of a GitHub app.
#[derive(Clone, PartialEq, Eq)]
pub struct AppCredentials {
    pub private_key: String,
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCredentials")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

fn fetch_credentials(
    secrets: &dyn SecretsClient,
    private_key: &str,
    client_id: &str,
    client_secret: &str,
) -> PublishResult<AppCredentials> {
    Ok(AppCredentials {
        private_key: secrets.access_secret(private_key)?,
        client_id: secrets.access_secret(client_id)?,
        client_secret: secrets.access_secret(client_secret)?,
    })
}

/// Credentials of the webhook app and the bot app, fetched concurrently.
pub fn fetch_app_credentials(
    secrets: &dyn SecretsClient,
    names: &SecretNames,
) -> PublishResult<(AppCredentials, AppCredentials)> {
    debug!("fetching app credentials");
    let (webhook, bot) = rayon::join(
        || {
            fetch_credentials(
                secrets,
                &names.webhook_app_private_key,
                &names.webhook_app_client_id,
                &names.webhook_app_client_secret,
            )
        },
        || {
            fetch_credentials(
                secrets,
                &names.bot_app_private_key,
                &names.bot_app_client_id,
                &names.bot_app_client_secret,
            )
        },
    );
    Ok((webhook?, bot?))
}
