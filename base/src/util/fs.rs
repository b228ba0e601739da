use std::fs::{create_dir_all, read, rename, write, File};
use std::path::{Path, PathBuf};

use crate::defs::{IntoResult, Result};

fn describe(action: &str, path: &Path) -> String {
    if let Some(path) = path.to_str() {
        format!("failed to {} '{}'", action, path)
    } else {
        format!("failed to {}", action)
    }
}

pub fn open_file<P: AsRef<Path>>(path: P) -> Result<File> {
    let path = path.as_ref();
    File::open(path).res(|| describe("open file", path))
}

pub fn read_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    read(path).res(|| describe("read file", path))
}

pub fn write_file<P: AsRef<Path>>(path: P, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    write(path, data).res(|| describe("write file", path))
}

// Writes a hidden sibling and renames it into place.
pub fn write_file_atomically<P: AsRef<Path>>(
    path: P,
    data: &[u8],
) -> Result<()> {
    let path = path.as_ref();
    let temp = temporary_sibling(path);
    write_file(&temp, data)?;
    rename_file(&temp, path)
}

pub fn create_dir<P: AsRef<Path>>(path: P) -> Result<()> {
    let path = path.as_ref();
    create_dir_all(path).res(|| describe("create directory", path))
}

pub fn rename_file<P: AsRef<Path>, Q: AsRef<Path>>(
    from: P,
    to: Q,
) -> Result<()> {
    let (from, to) = (from.as_ref(), to.as_ref());
    rename(from, to).res(|| describe("move file into", to))
}

// Hidden sibling used for write-then-rename.
pub fn temporary_sibling<P: AsRef<Path>>(path: P) -> PathBuf {
    let path = path.as_ref();
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.partial", name))
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::tempdir;

    #[test]
    fn test_temporary_sibling() {
        assert_eq!(
            temporary_sibling("/out/img_texture.png"),
            PathBuf::from("/out/.img_texture.png.partial")
        );
    }

    #[test]
    fn test_write_file_atomically() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("out.bin");
        create_dir(path.parent().unwrap()).unwrap();
        write_file_atomically(&path, b"data").unwrap();
        assert_eq!(read_file(&path).unwrap(), b"data");
        assert!(!temporary_sibling(&path).exists());
    }

    #[test]
    fn test_open_missing_file() {
        let err = open_file("/nonexistent/dir/file.png").unwrap_err();
        assert_eq!(
            &err.description,
            "failed to open file '/nonexistent/dir/file.png'"
        );
    }
}
