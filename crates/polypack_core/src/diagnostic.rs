use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

/// One path the resolver probed and rejected, with the reason
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionAttempt {
  pub path: PathBuf,
  pub reason: String,
}

impl ResolutionAttempt {
  pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
    Self {
      path: path.into(),
      reason: reason.into(),
    }
  }
}

/// A module specifier could not be resolved
///
/// Carries the ordered list of every path that was probed, for
/// diagnostics.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("failed to resolve '{specifier}' from '{from_module}' ({} paths tried)", .attempts.len())]
pub struct ResolutionError {
  pub specifier: String,
  pub from_module: String,
  pub attempts: Vec<ResolutionAttempt>,
}

/// A content handler failed to process a module
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("handler '{handler}' failed on {} [{}]: {message}", .module.display(), .variants.join(", "))]
pub struct ContentError {
  pub handler: String,
  pub variants: Vec<String>,
  pub module: PathBuf,
  pub message: String,
}

/// A bundle emitter failed
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("bundler '{bundler}' failed on bundle '{bundle}': {message}")]
pub struct BundleError {
  pub bundler: String,
  pub bundle: String,
  pub message: String,
}

/// A bundle's restricted module subgraph contained an import cycle
///
/// Fatal: emission order is undefined, so no partial ordering escapes.
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("import cycle in bundle '{bundle}' among {} modules", .members.len())]
pub struct CycleError {
  pub bundle: String,
  pub members: Vec<PathBuf>,
}

/// A worker crashed or failed outside the normal error channel
#[derive(Clone, Debug, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("worker {worker_id} fault: {message}")]
pub struct WorkerFault {
  pub worker_id: usize,
  pub message: String,
}

/// Any error that aborts a build
///
/// All build errors are fail-fast: the first one tears the worker pool
/// down and surfaces to the caller. There is no partial-result mode.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum BuildError {
  #[error(transparent)]
  Resolution(#[from] ResolutionError),

  #[error(transparent)]
  Content(#[from] ContentError),

  #[error(transparent)]
  Bundle(#[from] BundleError),

  #[error(transparent)]
  Cycle(#[from] CycleError),

  #[error(transparent)]
  Worker(#[from] WorkerFault),

  /// No resolver in the chain matched the specifier
  #[error("no resolver matched '{specifier}' from '{from_module}'")]
  NoResolverMatched {
    specifier: String,
    from_module: String,
  },
}

/// Non-fatal issues accumulated during a build and surfaced to the caller
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum BuildWarning {
  /// A content handler reported a warning for a module
  Handler {
    handler: String,
    module: PathBuf,
    variants: Vec<String>,
    message: String,
  },

  /// A bundle emitter reported a warning
  Emitter {
    bundler: String,
    bundle: String,
    message: String,
  },

  /// A module was skipped by a common bundle's content-type filter
  ContentTypeSkipped {
    module: PathBuf,
    common_bundle: String,
    content_type: String,
  },
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolution_error_reports_attempt_count() {
    let error = ResolutionError {
      specifier: String::from("lodash"),
      from_module: String::from("/app/src/index.js"),
      attempts: vec![
        ResolutionAttempt::new("/app/src/lib/lodash", "not found"),
        ResolutionAttempt::new("/app/lib/lodash", "not found"),
      ],
    };
    assert_eq!(
      error.to_string(),
      "failed to resolve 'lodash' from '/app/src/index.js' (2 paths tried)"
    );
  }

  #[test]
  fn build_error_wraps_cycle_error() {
    let error = BuildError::from(CycleError {
      bundle: String::from("main"),
      members: vec![PathBuf::from("/a.js"), PathBuf::from("/b.js")],
    });
    assert_eq!(
      error.to_string(),
      "import cycle in bundle 'main' among 2 modules"
    );
  }
}
