//! Node-style module resolution
//!
//! Maps a module specifier plus an importing context onto an absolute,
//! existing, extension-valid path. Relative and absolute specifiers
//! resolve directly; bare specifiers walk the directory tree upward over
//! the configured search paths. Every file-system observation goes
//! through a process-lifetime [`cache::Cache`] with request coalescing.

use std::path::Component;
use std::path::Path;
use std::path::PathBuf;

use polypack_core::diagnostic::ResolutionAttempt;
use polypack_core::diagnostic::ResolutionError;
use polypack_filesystem::FileSystemRef;

pub mod cache;
mod package_json;

pub use package_json::PackageJson;

use cache::Cache;
use cache::PackageEntry;
use cache::PathStat;

/// Search configuration, fixed for the life of a resolver
#[derive(Clone, Debug)]
pub struct ResolverOptions {
  /// Upward directory walks stop here
  pub base_dir: PathBuf,

  /// Probed as `dir/search_path/specifier` at every level of the walk;
  /// absolute entries are probed directly, without walking
  pub search_paths: Vec<PathBuf>,

  /// Acceptable file extensions, in probe order, without the dot
  pub extensions: Vec<String>,
}

impl Default for ResolverOptions {
  fn default() -> Self {
    Self {
      base_dir: PathBuf::from("/"),
      search_paths: vec![PathBuf::from("node_modules")],
      extensions: vec![String::from("js"), String::from("json")],
    }
  }
}

#[derive(Debug)]
pub struct Resolver {
  options: ResolverOptions,
  cache: Cache,
}

impl Resolver {
  pub fn new(options: ResolverOptions, fs: FileSystemRef) -> Self {
    Self {
      options,
      cache: Cache::new(fs),
    }
  }

  /// Drop the path and descriptor caches. Required between builds that
  /// need fresh file-system observations.
  pub fn clear_caches(&self) {
    self.cache.clear();
  }

  /// Resolve `specifier` as imported from `from_module`.
  ///
  /// On failure the error carries every probed path in probe order.
  pub fn resolve(
    &self,
    specifier: &str,
    from_module: &Path,
    expect_folder: bool,
  ) -> Result<PathBuf, ResolutionError> {
    tracing::trace!(specifier, from = %from_module.display(), "resolving");
    let mut attempts = Vec::new();
    let from_dir = from_module.parent().unwrap_or(Path::new("/"));

    let resolved = if Path::new(specifier).is_absolute() {
      self.probe(Path::new(specifier), expect_folder, &mut attempts)
    } else if specifier.starts_with('.') {
      let candidate = normalize(&from_dir.join(specifier));
      self.probe(&candidate, expect_folder, &mut attempts)
    } else {
      self.resolve_bare(specifier, from_dir, expect_folder, &mut attempts)
    };

    resolved.ok_or_else(|| ResolutionError {
      specifier: specifier.to_string(),
      from_module: from_module.display().to_string(),
      attempts,
    })
  }

  /// Walk upward from `from_dir` toward the configured base directory,
  /// probing every search path at each level. Absolute search paths are
  /// position-independent, so they are probed once, on the first level.
  fn resolve_bare(
    &self,
    specifier: &str,
    from_dir: &Path,
    expect_folder: bool,
    attempts: &mut Vec<ResolutionAttempt>,
  ) -> Option<PathBuf> {
    let mut dir = from_dir;
    let mut first_level = true;

    loop {
      for search_path in &self.options.search_paths {
        let candidate = if search_path.is_absolute() {
          if !first_level {
            continue;
          }
          search_path.join(specifier)
        } else {
          dir.join(search_path).join(specifier)
        };
        if let Some(found) = self.probe(&candidate, expect_folder, attempts) {
          return Some(found);
        }
      }

      first_level = false;
      if dir == self.options.base_dir {
        return None;
      }
      match dir.parent() {
        Some(parent) => dir = parent,
        None => return None,
      }
    }
  }

  fn probe(
    &self,
    candidate: &Path,
    expect_folder: bool,
    attempts: &mut Vec<ResolutionAttempt>,
  ) -> Option<PathBuf> {
    let stat = self.cache.stat(candidate);

    if stat.is_dir {
      if expect_folder {
        return Some(candidate.to_path_buf());
      }
      return self.probe_package_dir(candidate, attempts);
    }

    self.probe_file(candidate, stat, attempts)
  }

  /// The file-or-extension probe: an existing file must carry a
  /// configured extension; a missing one without a recognized extension
  /// gets each configured extension appended in order.
  fn probe_file(
    &self,
    candidate: &Path,
    stat: PathStat,
    attempts: &mut Vec<ResolutionAttempt>,
  ) -> Option<PathBuf> {
    if stat.is_file {
      if self.has_configured_extension(candidate) {
        return Some(candidate.to_path_buf());
      }
      attempts.push(ResolutionAttempt::new(
        candidate,
        "existing file has an unsupported extension",
      ));
      return None;
    }

    if self.has_configured_extension(candidate) {
      attempts.push(ResolutionAttempt::new(candidate, "does not exist"));
      return None;
    }

    attempts.push(ResolutionAttempt::new(candidate, "does not exist"));
    for extension in &self.options.extensions {
      let with_extension = append_extension(candidate, extension);
      if self.cache.stat(&with_extension).is_file {
        return Some(with_extension);
      }
      attempts.push(ResolutionAttempt::new(with_extension, "does not exist"));
    }
    None
  }

  /// Resolve a directory candidate through its package descriptor:
  /// `browser` preferred, then `main`, then `index` + extensions when no
  /// descriptor names an entry.
  fn probe_package_dir(
    &self,
    dir: &Path,
    attempts: &mut Vec<ResolutionAttempt>,
  ) -> Option<PathBuf> {
    match self.cache.read_package(dir) {
      PackageEntry::Package(package) => {
        if let Some(entry) = package.entry() {
          let target = normalize(&dir.join(entry));
          let stat = self.cache.stat(&target);
          if stat.is_dir {
            attempts.push(ResolutionAttempt::new(target, "package entry is a directory"));
            return None;
          }
          return self.probe_file(&target, stat, attempts);
        }
      }
      PackageEntry::Error(message) => {
        attempts.push(ResolutionAttempt::new(
          dir.join("package.json"),
          format!("invalid package descriptor: {message}"),
        ));
        return None;
      }
      PackageEntry::Missing => {}
    }

    let index = dir.join("index");
    let stat = self.cache.stat(&index);
    self.probe_file(&index, stat, attempts)
  }

  fn has_configured_extension(&self, path: &Path) -> bool {
    path
      .extension()
      .and_then(|extension| extension.to_str())
      .is_some_and(|extension| {
        self
          .options
          .extensions
          .iter()
          .any(|configured| configured == extension)
      })
  }
}

fn append_extension(path: &Path, extension: &str) -> PathBuf {
  let mut raw = path.as_os_str().to_os_string();
  raw.push(".");
  raw.push(extension);
  PathBuf::from(raw)
}

/// Lexically normalize `.` and `..` components out of a joined path.
fn normalize(path: &Path) -> PathBuf {
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
