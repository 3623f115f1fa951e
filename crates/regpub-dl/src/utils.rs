use percent_encoding::percent_decode_str;
use url::Url;

/// Last path segment of `url`, percent-decoded. `None` for directory URLs.
pub fn filename_from_url(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    if last.is_empty() {
        return None;
    }
    percent_decode_str(last)
        .decode_utf8()
        .ok()
        .map(|name| name.into_owned())
}
