//! File utility functions

use std::path::PathBuf;

/// Expand a path string to an absolute path.
///
/// - `~` or `~/path` -> home directory
/// - relative paths and bare names -> joined onto the current directory
/// - absolute paths -> unchanged
///
/// ```text
/// expand_path("~/.agentwatch/events.db") // -> /home/user/.agentwatch/events.db
/// expand_path("./events.jsonl")          // -> /current/dir/./events.jsonl
/// ```
pub fn expand_path(path: &str) -> PathBuf {
    let path = path.trim();

    if path.is_empty() {
        return std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    }

    let expanded = if path == "~" {
        dirs::home_dir().unwrap_or_else(|| PathBuf::from(path))
    } else if let Some(rest) = path.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        }
    } else {
        PathBuf::from(path)
    };

    if expanded.is_relative() {
        std::env::current_dir()
            .map(|cwd| cwd.join(&expanded))
            .unwrap_or(expanded)
    } else {
        expanded
    }
}
