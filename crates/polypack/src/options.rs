use std::collections::BTreeMap;

use polypack_core::types::BundleConfig;
use polypack_core::types::OutputPathTemplate;
use polypack_core::types::WorkingSet;
use polypack_resolver::ResolverOptions;

/// Everything a build invocation consumes
///
/// Parsing, validation and defaulting of the on-disk configuration happen
/// upstream; this struct is the already-validated shape.
#[derive(Clone, Debug)]
pub struct PolypackOptions {
  /// Build configurations to run; the graph is fully independent per
  /// variant. Empty means one variant named "default".
  pub variants: Vec<String>,

  pub working_set: WorkingSet,

  pub bundle_configs: BTreeMap<String, BundleConfig>,

  pub output_template: OutputPathTemplate,

  pub resolver: ResolverOptions,

  /// Worker thread count; defaults to the machine's logical CPUs
  pub workers: Option<usize>,

  /// Invariant options handed to every worker's content handler
  pub handler_options: serde_json::Value,

  /// Invariant options handed to every worker's bundle emitter
  pub emitter_options: serde_json::Value,
}

impl Default for PolypackOptions {
  fn default() -> Self {
    Self {
      variants: Vec::new(),
      working_set: WorkingSet::default(),
      bundle_configs: BTreeMap::new(),
      output_template: OutputPathTemplate::default(),
      resolver: ResolverOptions::default(),
      workers: None,
      handler_options: serde_json::Value::Null,
      emitter_options: serde_json::Value::Null,
    }
  }
}

impl PolypackOptions {
  pub fn effective_variants(&self) -> Vec<String> {
    if self.variants.is_empty() {
      vec![String::from("default")]
    } else {
      self.variants.clone()
    }
  }
}
