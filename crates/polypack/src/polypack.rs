use std::sync::Arc;

use polypack_core::diagnostic::BuildError;
use polypack_core::plugin::BundleEmitterRef;
use polypack_core::plugin::ContentHandlerRef;
use polypack_filesystem::FileSystemRef;
use polypack_filesystem::OsFileSystem;
use polypack_resolver::Resolver;

use crate::build::run_build;
use crate::build::BuildResult;
use crate::options::PolypackOptions;
use crate::resolver_chain::BuiltinResolver;
use crate::resolver_chain::ResolverChain;
use crate::resolver_chain::SpecifierResolver;
use crate::worker::WorkerPool;

/// A configured bundler instance
///
/// The content handler and bundle emitter are resolved once, here, and
/// held behind their capability traits for every build this instance
/// runs.
pub struct Polypack {
  pub options: PolypackOptions,
  pub fs: FileSystemRef,
  handler: ContentHandlerRef,
  emitter: BundleEmitterRef,
  custom_resolvers: Vec<Arc<dyn SpecifierResolver>>,
}

impl Polypack {
  pub fn new(
    options: PolypackOptions,
    fs: Option<FileSystemRef>,
    handler: ContentHandlerRef,
    emitter: BundleEmitterRef,
  ) -> Self {
    Self {
      options,
      fs: fs.unwrap_or_else(|| Arc::new(OsFileSystem)),
      handler,
      emitter,
      custom_resolvers: Vec::new(),
    }
  }

  /// Custom resolvers run before the built-in one, in the given order.
  pub fn with_resolvers(mut self, resolvers: Vec<Arc<dyn SpecifierResolver>>) -> Self {
    self.custom_resolvers = resolvers;
    self
  }

  /// Run one full build: resolve and process the working set to a fixed
  /// point, partition each variant into bundles, emit every unique
  /// artifact.
  ///
  /// Fail-fast: the first error tears the worker pool down and surfaces
  /// alone. A fresh resolver is constructed per build, so its path and
  /// descriptor caches never carry observations across builds.
  pub fn build(&self) -> Result<BuildResult, BuildError> {
    let builtin = Arc::new(BuiltinResolver::new(Resolver::new(
      self.options.resolver.clone(),
      self.fs.clone(),
    )));
    let chain = ResolverChain::new(self.custom_resolvers.clone(), builtin);

    let workers = self.options.workers.unwrap_or_else(num_cpus::get);
    let mut pool = WorkerPool::new(workers, self.handler.clone(), self.emitter.clone());
    pool.configure(
      self.options.handler_options.clone(),
      self.options.emitter_options.clone(),
    );

    let result = run_build(&self.options, &chain, &mut pool);
    pool.shutdown();
    result
  }
}
