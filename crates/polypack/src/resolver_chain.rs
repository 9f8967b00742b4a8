use std::fmt::Debug;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use polypack_core::diagnostic::BuildError;
use polypack_core::diagnostic::ResolutionError;
use polypack_resolver::Resolver;

/// One link in the resolver chain
///
/// `Ok(None)` means "not mine, try the next resolver"; `Ok(Some(path))`
/// resolves and stops the chain; `Err` is a hard failure that aborts the
/// build immediately.
pub trait SpecifierResolver: Debug + Send + Sync {
  fn resolve(
    &self,
    specifier: &str,
    from_module: &Path,
    expect_folder: bool,
  ) -> Result<Option<PathBuf>, ResolutionError>;
}

/// Adapts the built-in resolver as the chain's last link.
///
/// The built-in resolver claims every specifier, so a miss is a hard
/// resolution failure carrying the attempt list.
#[derive(Debug)]
pub struct BuiltinResolver {
  resolver: Resolver,
}

impl BuiltinResolver {
  pub fn new(resolver: Resolver) -> Self {
    Self { resolver }
  }

  pub fn clear_caches(&self) {
    self.resolver.clear_caches();
  }
}

impl SpecifierResolver for BuiltinResolver {
  fn resolve(
    &self,
    specifier: &str,
    from_module: &Path,
    expect_folder: bool,
  ) -> Result<Option<PathBuf>, ResolutionError> {
    self
      .resolver
      .resolve(specifier, from_module, expect_folder)
      .map(Some)
  }
}

/// Tries each configured resolver in declared order, the built-in
/// resolver last.
#[derive(Debug)]
pub struct ResolverChain {
  resolvers: Vec<Arc<dyn SpecifierResolver>>,
}

impl ResolverChain {
  pub fn new(custom: Vec<Arc<dyn SpecifierResolver>>, builtin: Arc<BuiltinResolver>) -> Self {
    let mut resolvers = custom;
    resolvers.push(builtin);
    Self { resolvers }
  }

  pub fn resolve(
    &self,
    specifier: &str,
    from_module: &Path,
    expect_folder: bool,
  ) -> Result<PathBuf, BuildError> {
    for resolver in &self.resolvers {
      match resolver.resolve(specifier, from_module, expect_folder) {
        Ok(Some(path)) => return Ok(path),
        Ok(None) => continue,
        Err(error) => return Err(BuildError::Resolution(error)),
      }
    }

    Err(BuildError::NoResolverMatched {
      specifier: specifier.to_string(),
      from_module: from_module.display().to_string(),
    })
  }
}
