use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::util::{app_dir, unix_timestamp};

const MAX_SESSIONS: usize = 10;

/// Install the global tracing subscriber.
///
/// Events go to stderr and to `~/.lcu-copilot/logs/latest.log`. The previous
/// `latest.log` is rotated to `session-{timestamp}.log` first, and only the
/// ten newest sessions are kept. `RUST_LOG` overrides `level`.
///
/// Returns the log file path, or `None` when the file could not be opened
/// (stderr logging still works). Subsequent calls are no-ops.
pub fn init_logging(level: &str) -> Option<PathBuf> {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let log_file = app_dir().and_then(|dir| open_session_log(&dir.join("logs")));

    let (file_layer, path) = match log_file {
        Some((file, path)) => {
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    path
}

/// Rotate the previous session log, prune old ones, and open a fresh
/// `latest.log` with a header line.
fn open_session_log(logs_dir: &Path) -> Option<(File, PathBuf)> {
    std::fs::create_dir_all(logs_dir).ok()?;

    let latest = logs_dir.join("latest.log");
    rotate_latest(logs_dir, &latest, unix_timestamp());
    cleanup_old_sessions(logs_dir, MAX_SESSIONS);

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&latest)
        .ok()?;

    let header = format!("=== LCU Copilot session {} ===\n\n", unix_timestamp());
    let _ = file.write_all(header.as_bytes());

    Some((file, latest))
}

fn rotate_latest(logs_dir: &Path, latest: &Path, ts: u64) {
    if latest.exists() {
        let rotated = logs_dir.join(format!("session-{ts}.log"));
        let _ = std::fs::rename(latest, rotated);
    }
}

/// Keep only the `keep` most recent `session-*.log` files.
fn cleanup_old_sessions(logs_dir: &Path, keep: usize) {
    let Ok(entries) = std::fs::read_dir(logs_dir) else {
        return;
    };

    let mut session_files: Vec<PathBuf> = entries
        .flatten()
        .filter(|entry| {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            name.starts_with("session-") && name.ends_with(".log")
        })
        .map(|entry| entry.path())
        .collect();

    // Timestamps share a width for centuries, so name order is age order.
    session_files.sort();

    let excess = session_files.len().saturating_sub(keep);
    for oldest in session_files.iter().take(excess) {
        let _ = std::fs::remove_file(oldest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotate_latest() {
        let dir = tempfile::tempdir().unwrap();
        let latest = dir.path().join("latest.log");
        std::fs::write(&latest, "old session").unwrap();

        rotate_latest(dir.path(), &latest, 1_700_000_000);

        assert!(!latest.exists());
        let rotated = dir.path().join("session-1700000000.log");
        assert_eq!(std::fs::read_to_string(rotated).unwrap(), "old session");
    }

    #[test]
    fn test_cleanup_keeps_newest() {
        let dir = tempfile::tempdir().unwrap();
        for ts in 1_700_000_000u64..1_700_000_012 {
            std::fs::write(dir.path().join(format!("session-{ts}.log")), "").unwrap();
        }
        std::fs::write(dir.path().join("latest.log"), "").unwrap();

        cleanup_old_sessions(dir.path(), MAX_SESSIONS);

        let mut names: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().to_string())
            .filter(|n| n.starts_with("session-"))
            .collect();
        names.sort();
        assert_eq!(names.len(), MAX_SESSIONS);
        assert_eq!(names[0], "session-1700000002.log");
        assert!(dir.path().join("latest.log").exists());
    }

    #[test]
    fn test_open_session_log_writes_header() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");

        let (_, path) = open_session_log(&logs).unwrap();
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("=== LCU Copilot session "));
        let stamp = content
            .trim_start_matches("=== LCU Copilot session ")
            .split_whitespace()
            .next()
            .unwrap();
        assert!(stamp.parse::<u64>().is_ok());

        // A second open rotates the first.
        open_session_log(&logs).unwrap();
        let rotated = std::fs::read_dir(&logs)
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with("session-"))
            .count();
        assert_eq!(rotated, 1);
    }
}
