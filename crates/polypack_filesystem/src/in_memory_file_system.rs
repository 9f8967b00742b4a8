use std::collections::HashMap;
use std::io;
use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use parking_lot::RwLock;

use crate::FileSystem;

/// In memory implementation of a file-system entry
#[derive(Debug)]
enum InMemoryFileSystemEntry {
  File { contents: String },
  Directory,
}

/// In memory implementation of the `FileSystem` trait, for testing purposes.
///
/// Every `is_file` / `is_dir` probe increments a counter so tests can assert
/// how many stats actually reached the file system underneath a cache.
#[derive(Debug)]
pub struct InMemoryFileSystem {
  files: RwLock<HashMap<PathBuf, InMemoryFileSystemEntry>>,
  current_working_directory: RwLock<PathBuf>,
  stat_count: AtomicUsize,
}

impl Default for InMemoryFileSystem {
  fn default() -> Self {
    Self {
      files: Default::default(),
      current_working_directory: RwLock::new(PathBuf::from("/")),
      stat_count: AtomicUsize::new(0),
    }
  }
}

impl InMemoryFileSystem {
  /// Change the current working directory. Used for resolving relative paths.
  pub fn set_current_working_directory(&self, cwd: &Path) {
    let cwd = self.normalize(cwd);
    let mut state = self.current_working_directory.write();
    *state = cwd;
  }

  /// Write a file, creating every parent directory.
  pub fn write_file(&self, path: &Path, contents: impl Into<String>) {
    let path = self.normalize(path);
    let mut files = self.files.write();

    files.insert(
      path.clone(),
      InMemoryFileSystemEntry::File {
        contents: contents.into(),
      },
    );

    let mut dir = path.parent();
    while let Some(path) = dir {
      files.insert(path.to_path_buf(), InMemoryFileSystemEntry::Directory);
      dir = path.parent();
    }
  }

  pub fn create_directory(&self, path: &Path) {
    let path = self.normalize(path);
    let mut files = self.files.write();
    let mut dir = Some(path.as_path());
    while let Some(path) = dir {
      files.insert(path.to_path_buf(), InMemoryFileSystemEntry::Directory);
      dir = path.parent();
    }
  }

  /// Number of `is_file` / `is_dir` probes that reached this file system.
  pub fn stat_count(&self) -> usize {
    self.stat_count.load(Ordering::SeqCst)
  }

  fn normalize(&self, path: &Path) -> PathBuf {
    let path = if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.current_working_directory.read().join(path)
    };

    let mut result = PathBuf::new();
    for component in path.components() {
      match component {
        Component::ParentDir => {
          result.pop();
        }
        Component::CurDir => {}
        component => result.push(component),
      }
    }
    result
  }
}

impl FileSystem for InMemoryFileSystem {
  fn cwd(&self) -> io::Result<PathBuf> {
    Ok(self.current_working_directory.read().clone())
  }

  fn read_to_string(&self, path: &Path) -> io::Result<String> {
    let path = self.normalize(path);
    let files = self.files.read();
    match files.get(&path) {
      None => Err(io::Error::new(io::ErrorKind::NotFound, "File not found")),
      Some(InMemoryFileSystemEntry::File { contents }) => Ok(contents.clone()),
      Some(InMemoryFileSystemEntry::Directory) => Err(io::Error::new(
        io::ErrorKind::InvalidInput,
        "Path is a directory",
      )),
    }
  }

  fn is_file(&self, path: &Path) -> bool {
    self.stat_count.fetch_add(1, Ordering::SeqCst);
    let path = self.normalize(path);
    let files = self.files.read();
    matches!(files.get(&path), Some(InMemoryFileSystemEntry::File { .. }))
  }

  fn is_dir(&self, path: &Path) -> bool {
    self.stat_count.fetch_add(1, Ordering::SeqCst);
    let path = self.normalize(path);
    let files = self.files.read();
    matches!(files.get(&path), Some(InMemoryFileSystemEntry::Directory))
  }
}

#[cfg(test)]
mod test {
  use super::*;

  #[test]
  fn test_read_file() {
    let fs = InMemoryFileSystem::default();
    fs.write_file(Path::new("/foo/bar"), "contents");
    let result = fs.read_to_string(Path::new("/foo/bar")).unwrap();
    assert_eq!(result, "contents");
  }

  #[test]
  fn test_read_file_not_found() {
    let fs = InMemoryFileSystem::default();
    let result = fs.read_to_string(Path::new("/foo/bar"));
    assert!(result.is_err());
  }

  #[test]
  fn test_write_creates_parent_directories() {
    let fs = InMemoryFileSystem::default();
    fs.write_file(Path::new("/foo/bar/baz.js"), "");
    assert!(fs.is_dir(Path::new("/foo")));
    assert!(fs.is_dir(Path::new("/foo/bar")));
    assert!(fs.is_file(Path::new("/foo/bar/baz.js")));
  }

  #[test]
  fn test_relative_paths_resolve_against_cwd() {
    let fs = InMemoryFileSystem::default();
    fs.set_current_working_directory(Path::new("/project"));
    fs.write_file(Path::new("src/index.js"), "");
    assert!(fs.is_file(Path::new("/project/src/index.js")));
  }

  #[test]
  fn test_stat_count_tracks_probes() {
    let fs = InMemoryFileSystem::default();
    fs.write_file(Path::new("/a.js"), "");
    assert_eq!(fs.stat_count(), 0);
    fs.is_file(Path::new("/a.js"));
    fs.is_dir(Path::new("/a.js"));
    assert_eq!(fs.stat_count(), 2);
  }
}
