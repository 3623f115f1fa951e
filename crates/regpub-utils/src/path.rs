use std::{env, path::PathBuf};

/// Returns the user's home directory.
///
/// Reads `HOME`, falling back to the system temp dir when it is unset so service
/// environments without a home still resolve a usable path.
pub fn home_dir() -> PathBuf {
    env::var_os("HOME")
        .filter(|home| !home.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(env::temp_dir)
}

/// Returns the user's config directory following the XDG Base Directory Specification.
///
/// Checks `XDG_CONFIG_HOME`, defaulting to `$HOME/.config`.
pub fn xdg_config_home() -> PathBuf {
    env::var_os("XDG_CONFIG_HOME")
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| home_dir().join(".config"))
}
