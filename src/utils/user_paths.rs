use std::path::{Path, PathBuf};

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .or_else(dirs::home_dir)
}

pub fn expand_home_path(path: impl AsRef<Path>) -> PathBuf {
    let path = path.as_ref();
    if let Some(str_path) = path.to_str() {
        if let Some(rest) = str_path.strip_prefix("~/") {
            if let Some(home) = home_dir() {
                return home.join(rest);
            }
        }
        if str_path == "~" {
            if let Some(home) = home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

pub fn current_username() -> String {
    whoami::username()
}

/// Last `/`-separated component, the way remote (POSIX) paths are split.
pub fn base_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

/// Joins with `/` and collapses a duplicate separator at the seam.
pub fn join_remote(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        return name.to_string();
    }
    format!("{}/{}", dir.trim_end_matches('/'), name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_name_splits_on_last_slash() {
        assert_eq!(base_name("/tmp/a.txt"), "a.txt");
        assert_eq!(base_name("a.txt"), "a.txt");
        assert_eq!(base_name("/tmp/dir/"), "");
    }

    #[test]
    fn join_remote_avoids_double_slash() {
        assert_eq!(join_remote("/remote/dir", "a.txt"), "/remote/dir/a.txt");
        assert_eq!(join_remote("/remote/dir/", "a.txt"), "/remote/dir/a.txt");
        assert_eq!(join_remote("/", "a.txt"), "/a.txt");
    }

    #[test]
    fn expand_home_leaves_plain_paths() {
        assert_eq!(expand_home_path("/etc/hosts"), PathBuf::from("/etc/hosts"));
        assert_eq!(expand_home_path("relative/key"), PathBuf::from("relative/key"));
    }
}
