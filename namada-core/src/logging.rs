use env_logger::Target;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const DEFAULT_LOG_DIR: &str = "/var/log/namada-setup";
pub const DEFAULT_LOG_FILE: &str = "setup.log";

fn open_log(path: &Path) -> io::Result<Target> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(Target::Pipe(Box::new(file)))
}

/// Resolve where logs go: the requested file, else the default file, else stderr.
pub fn resolve_target(log_file: Option<PathBuf>) -> (Target, Option<PathBuf>) {
    let candidate =
        log_file.unwrap_or_else(|| Path::new(DEFAULT_LOG_DIR).join(DEFAULT_LOG_FILE));
    match open_log(&candidate) {
        Ok(target) => (target, Some(candidate)),
        Err(_) => (Target::Stderr, None),
    }
}

/// Initialise logging once. `RUST_LOG` overrides the default `info` level.
pub fn init_with(log_file: Option<PathBuf>) -> Option<PathBuf> {
    let (target, path) = resolve_target(log_file);
    let _ = env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_env("RUST_LOG")
        .target(target)
        .format_timestamp_secs()
        .try_init();
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn explicit_log_file_is_created() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/setup.log");
        let (target, resolved) = resolve_target(Some(path.clone()));
        assert!(matches!(target, Target::Pipe(_)));
        assert_eq!(resolved, Some(path.clone()));
        assert!(path.exists());
    }

    #[test]
    fn unwritable_log_file_falls_back_to_stderr() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let (target, resolved) = resolve_target(Some(blocker.join("setup.log")));
        assert!(matches!(target, Target::Stderr));
        assert_eq!(resolved, None);
    }
}
