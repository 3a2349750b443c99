use crate::validation::MAX_NAME_LENGTH;
use std::fs::{self, OpenOptions};
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Subdirectory of the media root that receives uploads.
pub const UPLOAD_DIR: &str = "uploads";

const MAX_ATTEMPTS: usize = 100;
/// Length of the random suffix added on a name clash.
pub const SUFFIX_LEN: usize = 7;

/// Writes uploaded files below `<media_root>/uploads`.
#[derive(Debug, Clone)]
pub struct MediaStorage {
    root: PathBuf,
}

impl MediaStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Stores `data` under a free name derived from `name` and returns the
    /// path relative to the media root, e.g. `uploads/hello.txt`.
    ///
    /// Existing files are never replaced: on a clash a random suffix is
    /// appended to the stem and creation is retried.
    pub fn save(&self, name: &str, data: &[u8]) -> io::Result<String> {
        fs::create_dir_all(self.root.join(UPLOAD_DIR))?;
        let (stem, ext) = split_name(name);

        for attempt in 0..MAX_ATTEMPTS {
            let suffix = if attempt == 0 { String::new() } else { format!("_{}", random_suffix()) };
            let relative = fit_length(stem, &suffix, ext)?;
            let path = self.path_of(&relative);

            let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(f) => f,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            };
            if let Err(e) = file.write_all(data).and_then(|_| file.sync_all()) {
                drop(file);
                let _ = fs::remove_file(&path);
                return Err(e);
            }
            return Ok(relative);
        }

        Err(io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free name for {name} after {MAX_ATTEMPTS} attempts"),
        ))
    }

    pub fn delete(&self, relative: &str) -> io::Result<()> {
        fs::remove_file(self.path_of(relative))
    }
}

/// Splits off the last extension, keeping the dot: `a.tar.gz` -> (`a.tar`, `.gz`).
/// Dotfiles like `.env` have no extension.
pub(crate) fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(i) if i > 0 && name[..i].chars().any(|c| c != '.') => name.split_at(i),
        _ => (name, ""),
    }
}

fn random_suffix() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..SUFFIX_LEN].to_string()
}

/// Builds `uploads/<stem><suffix><ext>`, cutting the stem so the whole path
/// stays within the column width.
fn fit_length(stem: &str, suffix: &str, ext: &str) -> io::Result<String> {
    let fixed = UPLOAD_DIR.len() + 1 + suffix.chars().count() + ext.chars().count();
    let room = MAX_NAME_LENGTH.saturating_sub(fixed);
    let kept: String = stem.chars().take(room).collect();
    if kept.is_empty() {
        return Err(io::Error::new(
            ErrorKind::InvalidInput,
            format!("cannot fit {stem}{ext} into {MAX_NAME_LENGTH} characters"),
        ));
    }
    Ok(format!("{UPLOAD_DIR}/{kept}{suffix}{ext}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saves_under_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MediaStorage::new(dir.path());
        let rel = storage.save("hello.txt", b"hi").unwrap();
        assert_eq!(rel, "uploads/hello.txt");
        assert_eq!(fs::read(dir.path().join("uploads/hello.txt")).unwrap(), b"hi");
    }

    #[test]
    fn never_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MediaStorage::new(dir.path());
        let first = storage.save("hello.txt", b"one").unwrap();
        let second = storage.save("hello.txt", b"two").unwrap();

        assert_ne!(first, second);
        assert!(second.starts_with("uploads/hello_"));
        assert!(second.ends_with(".txt"));
        assert_eq!(second.len(), "uploads/hello_".len() + SUFFIX_LEN + ".txt".len());
        assert_eq!(fs::read(storage.path_of(&first)).unwrap(), b"one");
        assert_eq!(fs::read(storage.path_of(&second)).unwrap(), b"two");
    }

    #[test]
    fn splits_extensions() {
        assert_eq!(split_name("a.tar.gz"), ("a.tar", ".gz"));
        assert_eq!(split_name(".env"), (".env", ""));
        assert_eq!(split_name("README"), ("README", ""));
    }

    #[test]
    fn truncates_long_stems() {
        let rel = fit_length(&"x".repeat(120), "_abcdefg", ".txt").unwrap();
        assert_eq!(rel.chars().count(), MAX_NAME_LENGTH);
        assert!(rel.ends_with("_abcdefg.txt"));
    }

    #[test]
    fn refuses_when_extension_leaves_no_room() {
        let err = fit_length("a", "", &format!(".{}", "e".repeat(95))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn fails_when_uploads_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(UPLOAD_DIR), b"in the way").unwrap();
        let storage = MediaStorage::new(dir.path());
        assert!(storage.save("hello.txt", b"hi").is_err());
    }

    #[test]
    fn delete_removes_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = MediaStorage::new(dir.path());
        let rel = storage.save("gone.txt", b"x").unwrap();
        storage.delete(&rel).unwrap();
        assert!(!storage.path_of(&rel).exists());
    }
}
