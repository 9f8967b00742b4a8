use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

/// The kind of output grouping a bundle name refers to
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BundleType {
  /// An eagerly-loaded application entry
  #[default]
  Entrypoint,

  /// A standalone bundle an entrypoint can externalize modules to
  Library,

  /// A bundle filled with modules shared across its dependents
  Common,
}

/// Per-bundle configuration, consumed as given
///
/// Validation and defaulting of the on-disk form happen upstream; by the
/// time this struct reaches the core the reverse references
/// (`depended_by`) are already populated.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleConfig {
  #[serde(rename = "type")]
  pub bundle_type: BundleType,

  /// Library/common bundles this entrypoint is backed by
  #[serde(default)]
  pub depends: Vec<String>,

  /// Common bundles this bundle may contribute modules to
  #[serde(default)]
  pub commons: Vec<String>,

  /// Content types accepted by this bundle; empty accepts all
  #[serde(default)]
  pub content_types: Vec<String>,

  /// Sharing frequency a module must reach to be promoted into this
  /// common bundle, as a fraction of `depended_by`
  #[serde(default = "default_threshold")]
  pub threshold: f64,

  /// Reverse of `depends`/`commons`
  #[serde(default)]
  pub depended_by: Vec<String>,

  /// Duplicate statically-shared modules into dynamic children instead of
  /// forcing an extra round trip
  #[serde(default)]
  pub preserve_duplicates: bool,

  /// Name of the emitter that serializes this bundle
  #[serde(default)]
  pub bundler: Option<String>,

  /// Extra `${options.*}` parameters for the output path template
  #[serde(default)]
  pub template_options: BTreeMap<String, String>,
}

fn default_threshold() -> f64 {
  1.0
}

impl Default for BundleConfig {
  fn default() -> Self {
    Self {
      bundle_type: BundleType::default(),
      depends: Vec::new(),
      commons: Vec::new(),
      content_types: Vec::new(),
      threshold: default_threshold(),
      depended_by: Vec::new(),
      preserve_duplicates: false,
      bundler: None,
      template_options: BTreeMap::new(),
    }
  }
}

impl BundleConfig {
  /// Empty filter accepts every content type.
  pub fn accepts_content_type(&self, content_type: &str) -> bool {
    self.content_types.is_empty()
      || self
        .content_types
        .iter()
        .any(|accepted| accepted == content_type)
  }
}
