use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use crate::diagnostic::ContentError;
use crate::types::ContentInfo;
use crate::types::ExportDeclaration;
use crate::types::GeneratedAsset;
use crate::types::ImportDeclaration;

/// Receives the events a content handler reports while processing a
/// module, each scoped to the variant(s) it applies to.
pub trait HandlerDelegate {
  fn content(&mut self, variant: &str, content: ContentInfo);
  fn import(&mut self, variants: &[String], declaration: ImportDeclaration);
  fn export(&mut self, variants: &[String], declaration: ExportDeclaration);
  fn generated_asset(&mut self, variants: &[String], asset: GeneratedAsset);
  fn warning(&mut self, variants: &[String], message: String);
}

/// Source-to-output transform for a given content type
///
/// Handlers are external collaborators: the concrete implementation is
/// resolved once at configuration time and held behind this trait for
/// the life of the build. Handler execution happens inside workers and
/// may run in true parallel.
pub trait ContentHandler: Debug + Send + Sync {
  fn name(&self) -> &str;

  /// Called once per worker with the build-invariant options.
  fn init(&self, options: &serde_json::Value) -> Result<(), ContentError>;

  /// Process one resolved module, reporting content per variant plus any
  /// discovered imports, exports, generated sub-assets and warnings
  /// through the delegate.
  fn process(
    &self,
    module: &Path,
    scope_id: &str,
    variants: &[String],
    delegate: &mut dyn HandlerDelegate,
  ) -> Result<(), ContentError>;
}

pub type ContentHandlerRef = Arc<dyn ContentHandler>;

#[cfg(test)]
mod tests {
  use super::*;

  #[derive(Debug)]
  struct NoopHandler;

  impl ContentHandler for NoopHandler {
    fn name(&self) -> &str {
      "noop"
    }

    fn init(&self, _options: &serde_json::Value) -> Result<(), ContentError> {
      Ok(())
    }

    fn process(
      &self,
      _module: &Path,
      _scope_id: &str,
      _variants: &[String],
      _delegate: &mut dyn HandlerDelegate,
    ) -> Result<(), ContentError> {
      Ok(())
    }
  }

  #[test]
  fn can_be_held_as_trait_object() {
    let handlers: Vec<ContentHandlerRef> = vec![Arc::new(NoopHandler)];
    assert_eq!(handlers[0].name(), "noop");
  }
}
