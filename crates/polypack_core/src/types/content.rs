use serde::Deserialize;
use serde::Serialize;

/// Content metadata reported for a module, per variant
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentInfo {
  /// MIME-like content type string, e.g. `"application/javascript"`
  pub content_type: String,

  /// Content-addressed digest of the transformed output
  pub content_hash: String,
}
