use serde::Deserialize;
use serde::Serialize;

use super::SymbolSet;

/// Determines when the imported module is loaded
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImportKind {
  /// Loaded eagerly with the importing bundle
  #[default]
  Static,

  /// Loaded lazily at the import site, splitting a child bundle
  Dynamic,
}

impl ImportKind {
  /// A static import of the same target wins over a dynamic one; an edge
  /// already static is never downgraded.
  pub fn upgrade(&mut self, other: ImportKind) {
    if other == ImportKind::Static {
      *self = ImportKind::Static;
    }
  }
}

/// An import site discovered by a content handler
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportDeclaration {
  /// The specifier as written in the source
  pub source: String,

  pub symbols: SymbolSet,

  pub kind: ImportKind,
}

/// The exported surface of a module, as reported by a content handler
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportDeclaration {
  /// The exporting identifier name, when the module assigns one
  pub identifier: Option<String>,

  /// Whether the module uses ES module semantics
  pub es_module: bool,

  pub symbols: SymbolSet,
}

/// A sub-asset produced while processing a module (e.g. an extracted image)
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedAsset {
  pub name: String,

  pub output_path: String,
}
