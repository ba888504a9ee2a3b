use std::path::PathBuf;

/// Expands a leading `~` in a path to the user's home directory.
/// Also normalizes path separators for the current OS.
pub fn expand_tilde(path: &str) -> String {
    let result = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => match dirs::home_dir() {
            Some(home) => home
                .join(rest.trim_start_matches('/'))
                .to_string_lossy()
                .to_string(),
            None => path.to_string(),
        },
        _ => path.to_string(),
    };
    if cfg!(windows) {
        result.replace('/', "\\")
    } else {
        result
    }
}

/// Root directory for everything the app persists: `~/.lcu-copilot`.
pub fn app_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".lcu-copilot"))
}

/// Current Unix time in milliseconds.
pub fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Current Unix time in seconds.
pub fn unix_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
