use std::collections::BTreeMap;
use std::fmt::Debug;
use std::path::PathBuf;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;

use crate::diagnostic::BundleError;
use crate::types::OutputPaths;
use crate::types::SymbolSet;

/// Everything an emitter needs to serialize one bundle
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleEmission {
  /// Member modules in emission (dependency-first) order
  pub modules: Vec<PathBuf>,

  pub paths: OutputPaths,

  /// Per-module used symbols within this bundle
  pub module_map: BTreeMap<PathBuf, SymbolSet>,

  /// Generated sub-asset name to output path, across member modules
  pub asset_map: BTreeMap<String, String>,

  /// Dynamic child root module to that child's public path
  pub dynamic_bundle_map: BTreeMap<PathBuf, String>,
}

/// Performance counters an emitter reports back
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmitStats {
  pub module_count: usize,
  pub output_bytes: usize,
}

/// Receives non-fatal warnings an emitter reports while serializing.
pub trait EmitterDelegate {
  fn warning(&mut self, message: String);
}

/// Serializes a module list into a final artifact
///
/// Emitters are external collaborators resolved once at configuration
/// time, like [`super::ContentHandler`]s.
pub trait BundleEmitter: Debug + Send + Sync {
  fn name(&self) -> &str;

  fn init(&self, options: &serde_json::Value) -> Result<(), BundleError>;

  fn process(
    &self,
    options: &serde_json::Value,
    emission: &BundleEmission,
    delegate: &mut dyn EmitterDelegate,
  ) -> Result<EmitStats, BundleError>;
}

pub type BundleEmitterRef = Arc<dyn BundleEmitter>;
