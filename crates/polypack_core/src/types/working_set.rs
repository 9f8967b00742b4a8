use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// A module root selected for a build
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingSetRoot {
  pub specifier: String,

  /// Resolve the specifier as a directory rather than a file
  #[serde(default)]
  pub is_folder: bool,
}

impl WorkingSetRoot {
  pub fn new(specifier: impl Into<String>) -> Self {
    Self {
      specifier: specifier.into(),
      is_folder: false,
    }
  }
}

/// The bundles and roots selected for one build invocation
///
/// Incremental working sets are an explicit limitation: the orchestrator
/// always builds the full set, since the graph's bundle membership is
/// grow-only and cannot be retracted for a diffing rebuild.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkingSet {
  /// Bundle name to the roots that seed it
  pub bundles: BTreeMap<String, Vec<WorkingSetRoot>>,

  /// Candidate common bundles participating in this build
  #[serde(default)]
  pub commons: Vec<String>,
}

impl WorkingSet {
  pub fn with_bundle(
    mut self,
    name: impl Into<String>,
    roots: impl IntoIterator<Item = WorkingSetRoot>,
  ) -> Self {
    self
      .bundles
      .insert(name.into(), roots.into_iter().collect());
    self
  }

  pub fn with_commons(mut self, commons: impl IntoIterator<Item = String>) -> Self {
    self.commons = commons.into_iter().collect();
    self
  }

  /// Every bundle name participating in the build, commons included.
  pub fn bundle_names(&self) -> impl Iterator<Item = &String> {
    self.bundles.keys().chain(self.commons.iter())
  }
}
