use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use polypack_core::diagnostic::BuildWarning;
use polypack_core::types::OutputPaths;
use polypack_core::types::SymbolSet;

/// Identity of a dynamic bundle: the bundle it was split out of and the
/// dynamically-imported module that roots it.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamicBundleKey {
  pub parent: String,
  pub root_module: PathBuf,
}

/// One finalized bundle, static or dynamic
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedBundleData {
  /// Digest of the ordered member content hashes and used-symbol lists.
  /// Bundles with equal hashes are the same artifact.
  pub hash: String,

  pub paths: OutputPaths,

  /// Member modules in dependency-first order
  pub modules: Vec<PathBuf>,

  /// Symbols each member is used for within this bundle
  pub used_symbols: BTreeMap<PathBuf, SymbolSet>,
}

/// The output of one bundle-generation run over a variant
#[derive(Clone, Debug, Default)]
pub struct GeneratedBundles {
  pub static_bundles: BTreeMap<String, GeneratedBundleData>,

  pub dynamic_bundles: BTreeMap<DynamicBundleKey, GeneratedBundleData>,

  /// Non-fatal issues encountered while partitioning
  pub warnings: Vec<BuildWarning>,
}

impl GeneratedBundles {
  /// Deduplicated artifacts: bundles whose signature hashes collide are
  /// emitted once. Static bundles first, then dynamic, in key order.
  pub fn artifacts(&self) -> Vec<&GeneratedBundleData> {
    let mut seen = std::collections::HashSet::new();
    let mut artifacts = Vec::new();
    for data in self
      .static_bundles
      .values()
      .chain(self.dynamic_bundles.values())
    {
      if seen.insert(&data.hash) {
        artifacts.push(data);
      }
    }
    artifacts
  }

  /// Dynamic children of `parent`, as root module to public path.
  pub fn dynamic_children(&self, parent: &str) -> BTreeMap<PathBuf, String> {
    self
      .dynamic_bundles
      .iter()
      .filter(|(key, _)| key.parent == parent)
      .map(|(key, data)| {
        (
          key.root_module.clone(),
          data.paths.output_public_path.clone(),
        )
      })
      .collect()
  }
}
