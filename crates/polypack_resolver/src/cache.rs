use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Condvar;
use parking_lot::Mutex;
use polypack_filesystem::FileSystemRef;

use crate::package_json::PackageJson;

/// Result of a single path probe
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathStat {
  pub is_file: bool,
  pub is_dir: bool,
}

/// Memoized outcome of reading a directory's package descriptor
#[derive(Clone, Debug)]
pub enum PackageEntry {
  /// No descriptor file in the directory
  Missing,
  Package(Arc<PackageJson>),
  /// The descriptor exists but could not be parsed
  Error(String),
}

enum Slot<T> {
  /// A caller is performing the underlying I/O; everyone else waits
  Pending,
  Ready(T),
}

/// Process-lifetime caches over the file system
///
/// Both maps are memoized for the life of the resolver instance, negative
/// results included, and are only dropped by [`Cache::clear`]. Concurrent
/// lookups of the same not-yet-cached key are coalesced: the first caller
/// inserts a pending slot and performs the I/O, later callers block on the
/// condvar and are all notified from that single completion.
pub struct Cache {
  pub fs: FileSystemRef,
  stats: Mutex<HashMap<PathBuf, Slot<PathStat>>>,
  stats_ready: Condvar,
  packages: Mutex<HashMap<PathBuf, Slot<PackageEntry>>>,
  packages_ready: Condvar,
}

impl std::fmt::Debug for Cache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Cache").finish()
  }
}

impl Cache {
  pub fn new(fs: FileSystemRef) -> Self {
    Self {
      fs,
      stats: Mutex::new(HashMap::new()),
      stats_ready: Condvar::new(),
      packages: Mutex::new(HashMap::new()),
      packages_ready: Condvar::new(),
    }
  }

  /// Probe `path`, serving repeats from the cache.
  pub fn stat(&self, path: &Path) -> PathStat {
    {
      let mut stats = self.stats.lock();
      loop {
        match stats.get(path) {
          Some(Slot::Ready(stat)) => return *stat,
          Some(Slot::Pending) => {
            self.stats_ready.wait(&mut stats);
          }
          None => break,
        }
      }
      stats.insert(path.to_path_buf(), Slot::Pending);
    }

    let is_file = self.fs.is_file(path);
    let is_dir = if is_file { false } else { self.fs.is_dir(path) };
    let stat = PathStat { is_file, is_dir };

    let mut stats = self.stats.lock();
    stats.insert(path.to_path_buf(), Slot::Ready(stat));
    self.stats_ready.notify_all();
    stat
  }

  /// Read and parse `dir/package.json`, serving repeats from the cache.
  pub fn read_package(&self, dir: &Path) -> PackageEntry {
    let descriptor = dir.join("package.json");

    {
      let mut packages = self.packages.lock();
      loop {
        match packages.get(&descriptor) {
          Some(Slot::Ready(entry)) => return entry.clone(),
          Some(Slot::Pending) => {
            self.packages_ready.wait(&mut packages);
          }
          None => break,
        }
      }
      packages.insert(descriptor.clone(), Slot::Pending);
    }

    let entry = match self.fs.read_to_string(&descriptor) {
      Err(_) => PackageEntry::Missing,
      Ok(contents) => match PackageJson::parse(&contents) {
        Ok(package) => PackageEntry::Package(Arc::new(package)),
        Err(error) => PackageEntry::Error(error.to_string()),
      },
    };

    let mut packages = self.packages.lock();
    packages.insert(descriptor, Slot::Ready(entry.clone()));
    self.packages_ready.notify_all();
    entry
  }

  /// Drop every memoized entry. Required between builds that need fresh
  /// file-system observations, since negative entries never expire on
  /// their own.
  pub fn clear(&self) {
    self.stats.lock().clear();
    self.packages.lock().clear();
  }
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use polypack_filesystem::InMemoryFileSystem;

  use super::*;

  #[test]
  fn repeated_stats_hit_the_cache() {
    let fs = Arc::new(InMemoryFileSystem::default());
    fs.write_file(Path::new("/a.js"), "");
    let cache = Cache::new(fs.clone());

    let first = cache.stat(Path::new("/a.js"));
    let probes = fs.stat_count();
    let second = cache.stat(Path::new("/a.js"));

    assert_eq!(first, second);
    assert_eq!(fs.stat_count(), probes);
  }

  #[test]
  fn negative_stats_are_cached_until_cleared() {
    let fs = Arc::new(InMemoryFileSystem::default());
    let cache = Cache::new(fs.clone());

    assert!(!cache.stat(Path::new("/late.js")).is_file);
    fs.write_file(Path::new("/late.js"), "");
    assert!(!cache.stat(Path::new("/late.js")).is_file);

    cache.clear();
    assert!(cache.stat(Path::new("/late.js")).is_file);
  }

  #[test]
  fn concurrent_stats_coalesce_onto_one_probe() {
    let baseline_fs = Arc::new(InMemoryFileSystem::default());
    baseline_fs.write_file(Path::new("/a.js"), "");
    let baseline_cache = Cache::new(baseline_fs.clone());
    baseline_cache.stat(Path::new("/a.js"));
    let single_caller_probes = baseline_fs.stat_count();

    let fs = Arc::new(InMemoryFileSystem::default());
    fs.write_file(Path::new("/a.js"), "");
    let cache = Cache::new(fs.clone());

    std::thread::scope(|scope| {
      for _ in 0..8 {
        scope.spawn(|| cache.stat(Path::new("/a.js")));
      }
    });

    assert_eq!(fs.stat_count(), single_caller_probes);
  }

  #[test]
  fn package_read_is_memoized() {
    let fs = Arc::new(InMemoryFileSystem::default());
    fs.write_file(Path::new("/pkg/package.json"), r#"{"main": "lib.js"}"#);
    let cache = Cache::new(fs.clone());

    let PackageEntry::Package(first) = cache.read_package(Path::new("/pkg")) else {
      panic!("expected a package");
    };
    assert_eq!(first.entry(), Some("lib.js"));

    // Second read must not re-parse; mutate the file to prove it.
    fs.write_file(Path::new("/pkg/package.json"), r#"{"main": "other.js"}"#);
    let PackageEntry::Package(second) = cache.read_package(Path::new("/pkg")) else {
      panic!("expected a package");
    };
    assert_eq!(second.entry(), Some("lib.js"));
  }

  #[test]
  fn unparsable_package_is_an_error_entry() {
    let fs = Arc::new(InMemoryFileSystem::default());
    fs.write_file(Path::new("/pkg/package.json"), "not json");
    let cache = Cache::new(fs.clone());

    assert!(matches!(
      cache.read_package(Path::new("/pkg")),
      PackageEntry::Error(_)
    ));
  }
}
