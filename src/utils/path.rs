use std::path::{Path, PathBuf};

/// Shorten a path for list display: home becomes ~, very long paths are
/// truncated in the middle.
pub fn shorten_path_for_display(path: &str) -> String {
    let path_buf = Path::new(path);

    if let Some(user_dirs) = directories::UserDirs::new() {
        let home_dir = user_dirs.home_dir();
        if let Ok(relative_path) = path_buf.strip_prefix(home_dir) {
            let home_path = if relative_path.as_os_str().is_empty() {
                "~".to_string()
            } else {
                format!("~/{}", relative_path.to_string_lossy())
            };
            return shorten_long_path(&home_path);
        }
    }

    shorten_long_path(path)
}

fn shorten_long_path(path: &str) -> String {
    const MAX_LENGTH: usize = 50;

    let char_count = path.chars().count();
    if char_count <= MAX_LENGTH {
        return path.to_string();
    }

    // Cut on character boundaries; byte indexing would panic inside a
    // multi-byte directory name.
    let start_len = MAX_LENGTH / 2 - 2;
    let end_len = MAX_LENGTH / 2 - 1;
    let start: String = path.chars().take(start_len).collect();
    let end: String = path.chars().skip(char_count - end_len).collect();
    format!("{}...{}", start, end)
}

/// Canonicalize a path, resolving symlinks and normalizing. Falls back to
/// the absolute form when the path does not exist yet.
pub fn canonicalize_path(path: &Path) -> anyhow::Result<PathBuf> {
    let absolute_path = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    Ok(absolute_path.canonicalize().unwrap_or(absolute_path))
}
