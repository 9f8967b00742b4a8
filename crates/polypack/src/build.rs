use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::path::PathBuf;

use tracing::debug;
use tracing::instrument;

use polypack_bundling::generate_bundles;
use polypack_bundling::GeneratedBundleData;
use polypack_bundling::GeneratedBundles;
use polypack_core::diagnostic::BuildError;
use polypack_core::diagnostic::BuildWarning;
use polypack_core::graph::DependencyGraph;
use polypack_core::graph::VariantGraph;
use polypack_core::plugin::BundleEmission;
use polypack_core::plugin::EmitStats;
use polypack_core::types::ImportDeclaration;

use crate::options::PolypackOptions;
use crate::resolver_chain::ResolverChain;
use crate::worker::WorkerEnvelope;
use crate::worker::WorkerPool;
use crate::worker::WorkerRequest;
use crate::worker::WorkerResponse;

/// One emitted bundle's report
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EmittedBundle {
  pub variant: String,
  pub bundle: String,
  pub stats: EmitStats,
}

/// Everything a completed build hands back to the caller
#[derive(Debug)]
pub struct BuildResult {
  pub graph: DependencyGraph,

  /// Generated bundles per variant
  pub bundles: BTreeMap<String, GeneratedBundles>,

  pub emitted: Vec<EmittedBundle>,

  /// Non-fatal issues accumulated across the whole build
  pub warnings: Vec<BuildWarning>,
}

/// Resolution work still to be fed through the resolver chain
enum ResolutionTask {
  Root {
    specifier: String,
    bundle: String,
    expect_folder: bool,
  },
  Import {
    specifier: String,
    from_module: PathBuf,
    variants: Vec<String>,
    declaration: ImportDeclaration,
  },
}

/// Drive resolution and content processing to a fixed point, then bundle
/// and emit.
///
/// This always builds the full working set: the graph's bundle membership
/// is grow-only, so there is no incremental mode to fall back to.
#[instrument(level = "debug", skip_all)]
pub(crate) fn run_build(
  options: &PolypackOptions,
  chain: &ResolverChain,
  pool: &mut WorkerPool,
) -> Result<BuildResult, BuildError> {
  let mut orchestrator = BuildOrchestrator {
    options,
    variants: options.effective_variants(),
    chain,
    pool,
    graph: DependencyGraph::new(options.effective_variants()),
    resolution_queue: VecDeque::new(),
    dispatched: HashSet::new(),
    scope_ids: HashMap::new(),
    warnings: Vec::new(),
    emitted: Vec::new(),
  };
  orchestrator.run()
}

struct BuildOrchestrator<'a> {
  options: &'a PolypackOptions,
  variants: Vec<String>,
  chain: &'a ResolverChain,
  pool: &'a mut WorkerPool,
  graph: DependencyGraph,
  resolution_queue: VecDeque<ResolutionTask>,

  /// First-reference gate: each resolved path is dispatched for content
  /// processing at most once per build, however many importers race to it
  dispatched: HashSet<PathBuf>,

  scope_ids: HashMap<PathBuf, String>,
  warnings: Vec<BuildWarning>,
  emitted: Vec<EmittedBundle>,
}

impl BuildOrchestrator<'_> {
  fn run(mut self) -> Result<BuildResult, BuildError> {
    for (bundle, roots) in &self.options.working_set.bundles {
      for root in roots {
        self.resolution_queue.push_back(ResolutionTask::Root {
          specifier: root.specifier.clone(),
          bundle: bundle.clone(),
          expect_folder: root.is_folder,
        });
      }
    }

    // Fixed point: the build is complete only when the resolution queue
    // and the worker pool are idle at the same observation point. Either
    // side can enqueue work for the other, so each drained side re-checks
    // its counterpart.
    loop {
      self.drain_resolution_queue()?;
      if self.pool.is_idle() {
        break;
      }
      let envelope = self.pool.recv().map_err(BuildError::Worker)?;
      self.handle_response(envelope)?;
    }

    debug!(
      modules = self.dispatched.len(),
      "resolution and processing complete"
    );

    let bundles = self.generate_and_emit()?;

    Ok(BuildResult {
      graph: self.graph,
      bundles,
      emitted: self.emitted,
      warnings: self.warnings,
    })
  }

  fn drain_resolution_queue(&mut self) -> Result<(), BuildError> {
    while let Some(task) = self.resolution_queue.pop_front() {
      match task {
        ResolutionTask::Root {
          specifier,
          bundle,
          expect_folder,
        } => {
          let context = self.root_context();
          let resolved = self.chain.resolve(&specifier, &context, expect_folder)?;
          let variants = self.variants.clone();
          self.graph.entrypoint(&resolved, &variants, &bundle);
          self.dispatch_processing(resolved);
        }
        ResolutionTask::Import {
          specifier,
          from_module,
          variants,
          declaration,
        } => {
          let resolved = self.chain.resolve(&specifier, &from_module, false)?;
          self
            .graph
            .imports(&from_module, &resolved, &variants, &declaration);
          self.dispatch_processing(resolved);
        }
      }
    }
    Ok(())
  }

  /// Working-set roots have no importer; they resolve against a synthetic
  /// module directly inside the configured base directory.
  fn root_context(&self) -> PathBuf {
    self.options.resolver.base_dir.join("entry")
  }

  fn dispatch_processing(&mut self, resolved: PathBuf) {
    if !self.dispatched.insert(resolved.clone()) {
      return;
    }

    // Scope ids follow dispatch order, which the single-threaded
    // resolution loop keeps build-stable.
    let scope_id = format!("m{}", self.scope_ids.len());
    self.scope_ids.insert(resolved.clone(), scope_id.clone());

    self.pool.enqueue(WorkerRequest::ProcessModule {
      resolved_module: resolved,
      scope_id,
      variants: self.variants.clone(),
    });
  }

  fn handle_response(&mut self, envelope: WorkerEnvelope) -> Result<(), BuildError> {
    match envelope.response {
      WorkerResponse::ModuleContent {
        module,
        variant,
        content,
      } => {
        self
          .graph
          .content(&module, std::slice::from_ref(&variant), &content);
      }
      WorkerResponse::ModuleImport {
        module,
        variants,
        declaration,
      } => {
        self.resolution_queue.push_back(ResolutionTask::Import {
          specifier: declaration.source.clone(),
          from_module: module,
          variants,
          declaration,
        });
      }
      WorkerResponse::ModuleExport {
        module,
        variants,
        declaration,
      } => {
        self.graph.exports(&module, &variants, &declaration);
      }
      WorkerResponse::ModuleGeneratedAsset {
        module,
        variants,
        asset,
      } => {
        self.graph.generated_asset(&module, &variants, &asset);
      }
      WorkerResponse::ModuleWarning {
        handler,
        module,
        variants,
        message,
      } => {
        self.warnings.push(BuildWarning::Handler {
          handler,
          module,
          variants,
          message,
        });
      }
      WorkerResponse::ModuleContentError { error } => {
        return Err(BuildError::Content(error));
      }
      WorkerResponse::BundleContent {
        bundle,
        variant,
        stats,
      } => {
        self.emitted.push(EmittedBundle {
          variant,
          bundle,
          stats,
        });
      }
      WorkerResponse::BundleContentError { error } => {
        return Err(BuildError::Bundle(error));
      }
      WorkerResponse::BundleWarning {
        bundler,
        bundle,
        message,
      } => {
        self.warnings.push(BuildWarning::Emitter {
          bundler,
          bundle,
          message,
        });
      }
      WorkerResponse::TaskComplete | WorkerResponse::StatusChange { .. } => {}
    }
    Ok(())
  }

  /// Run the bundle generator once per variant over the completed graph
  /// and hand each deduplicated artifact to the emitter exactly once.
  fn generate_and_emit(&mut self) -> Result<BTreeMap<String, GeneratedBundles>, BuildError> {
    let mut all = BTreeMap::new();

    for (variant, variant_graph) in self.graph.variants() {
      let generated = generate_bundles(
        variant_graph,
        &self.options.working_set,
        &self.options.bundle_configs,
        &self.options.output_template,
      )
      .map_err(BuildError::Cycle)?;
      self.warnings.extend(generated.warnings.iter().cloned());

      let mut seen_hashes = HashSet::new();
      for (bundle, data) in &generated.static_bundles {
        if !seen_hashes.insert(data.hash.clone()) {
          continue;
        }
        self.pool.enqueue(WorkerRequest::ProcessBundle {
          bundle: bundle.clone(),
          variant: variant.clone(),
          data: build_emission(variant_graph, &generated, data, bundle),
          options: self.options.emitter_options.clone(),
        });
      }
      for (key, data) in &generated.dynamic_bundles {
        if !seen_hashes.insert(data.hash.clone()) {
          continue;
        }
        let label = format!("{}:{}", key.parent, key.root_module.display());
        self.pool.enqueue(WorkerRequest::ProcessBundle {
          bundle: label,
          variant: variant.clone(),
          data: build_emission(variant_graph, &generated, data, &key.parent),
          options: self.options.emitter_options.clone(),
        });
      }

      all.insert(variant.clone(), generated);
    }

    while !self.pool.is_idle() {
      let envelope = self.pool.recv().map_err(BuildError::Worker)?;
      self.handle_response(envelope)?;
    }

    Ok(all)
  }
}

fn build_emission(
  graph: &VariantGraph,
  generated: &GeneratedBundles,
  data: &GeneratedBundleData,
  parent: &str,
) -> BundleEmission {
  let mut asset_map = BTreeMap::new();
  for module in &data.modules {
    if let Some(handle) = graph.handle(module) {
      for (name, path) in &graph.node(handle).generated_assets {
        asset_map.insert(name.clone(), path.clone());
      }
    }
  }

  BundleEmission {
    modules: data.modules.clone(),
    paths: data.paths.clone(),
    module_map: data.used_symbols.clone(),
    asset_map,
    dynamic_bundle_map: generated.dynamic_children(parent),
  }
}

#[cfg(test)]
mod tests {
  use std::path::Path;
  use std::sync::Arc;

  use parking_lot::Mutex;
  use polypack_bundling::DynamicBundleKey;
  use polypack_core::diagnostic::ContentError;
  use polypack_core::hash::hash_bytes;
  use polypack_core::plugin::BundleEmitter;
  use polypack_core::plugin::ContentHandler;
  use polypack_core::plugin::EmitterDelegate;
  use polypack_core::plugin::HandlerDelegate;
  use polypack_core::types::BundleConfig;
  use polypack_core::types::ContentInfo;
  use polypack_core::types::ImportKind;
  use polypack_core::types::SymbolSet;
  use polypack_core::types::WorkingSet;
  use polypack_core::types::WorkingSetRoot;
  use polypack_filesystem::InMemoryFileSystem;
  use polypack_resolver::ResolverOptions;
  use pretty_assertions::assert_eq;

  use crate::Polypack;
  use crate::PolypackOptions;

  use super::*;

  /// Test handler driven by a specifier table: each module "parses" into
  /// the imports scripted for it.
  #[derive(Debug, Default)]
  struct ScriptedHandler {
    imports: HashMap<PathBuf, Vec<(String, ImportKind)>>,
    processed: Arc<Mutex<Vec<PathBuf>>>,
    fail_on: Option<PathBuf>,
    warn_on: Option<PathBuf>,
  }

  impl ScriptedHandler {
    fn with_imports(imports: &[(&str, &[(&str, ImportKind)])]) -> Self {
      Self {
        imports: imports
          .iter()
          .map(|(module, declarations)| {
            (
              PathBuf::from(module),
              declarations
                .iter()
                .map(|(specifier, kind)| (String::from(*specifier), *kind))
                .collect(),
            )
          })
          .collect(),
        ..Self::default()
      }
    }
  }

  impl ContentHandler for ScriptedHandler {
    fn name(&self) -> &str {
      "scripted"
    }

    fn init(&self, _options: &serde_json::Value) -> Result<(), ContentError> {
      Ok(())
    }

    fn process(
      &self,
      module: &Path,
      _scope_id: &str,
      variants: &[String],
      delegate: &mut dyn HandlerDelegate,
    ) -> Result<(), ContentError> {
      if self.fail_on.as_deref() == Some(module) {
        return Err(ContentError {
          handler: String::from("scripted"),
          variants: variants.to_vec(),
          module: module.to_path_buf(),
          message: String::from("scripted failure"),
        });
      }

      self.processed.lock().push(module.to_path_buf());

      for variant in variants {
        delegate.content(
          variant,
          ContentInfo {
            content_type: String::from("application/javascript"),
            content_hash: hash_bytes(module.to_string_lossy().as_bytes()),
          },
        );
      }

      if self.warn_on.as_deref() == Some(module) {
        delegate.warning(variants, String::from("scripted warning"));
      }

      for (specifier, kind) in self.imports.get(module).into_iter().flatten() {
        delegate.import(
          variants,
          polypack_core::types::ImportDeclaration {
            source: specifier.clone(),
            symbols: SymbolSet::default(),
            kind: *kind,
          },
        );
      }

      Ok(())
    }
  }

  #[derive(Debug, Default)]
  struct CollectingEmitter {
    emissions: Arc<Mutex<Vec<(String, BundleEmission)>>>,
  }

  impl BundleEmitter for CollectingEmitter {
    fn name(&self) -> &str {
      "collecting"
    }

    fn init(&self, _options: &serde_json::Value) -> Result<(), polypack_core::diagnostic::BundleError> {
      Ok(())
    }

    fn process(
      &self,
      _options: &serde_json::Value,
      emission: &BundleEmission,
      _delegate: &mut dyn EmitterDelegate,
    ) -> Result<EmitStats, polypack_core::diagnostic::BundleError> {
      self
        .emissions
        .lock()
        .push((emission.paths.asset_name.clone(), emission.clone()));
      Ok(EmitStats {
        module_count: emission.modules.len(),
        output_bytes: 0,
      })
    }
  }

  fn app_fs(files: &[&str]) -> Arc<InMemoryFileSystem> {
    let fs = Arc::new(InMemoryFileSystem::default());
    for file in files {
      fs.write_file(Path::new(file), "");
    }
    fs
  }

  fn options(bundles: &[(&str, &str)]) -> PolypackOptions {
    let mut working_set = WorkingSet::default();
    let mut configs = BTreeMap::new();
    for (bundle, root) in bundles {
      working_set = working_set.with_bundle(*bundle, [WorkingSetRoot::new(*root)]);
      configs.insert(String::from(*bundle), BundleConfig::default());
    }
    PolypackOptions {
      working_set,
      bundle_configs: configs,
      resolver: ResolverOptions {
        base_dir: PathBuf::from("/app"),
        ..ResolverOptions::default()
      },
      workers: Some(2),
      ..PolypackOptions::default()
    }
  }

  fn build(
    options: PolypackOptions,
    fs: Arc<InMemoryFileSystem>,
    handler: ScriptedHandler,
    emitter: CollectingEmitter,
  ) -> Result<BuildResult, BuildError> {
    Polypack::new(options, Some(fs), Arc::new(handler), Arc::new(emitter)).build()
  }

  #[test]
  fn builds_the_worked_fixture_end_to_end() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let fs = app_fs(&[
      "/app/bundle-a.js",
      "/app/module-2.js",
      "/app/module-3.js",
      "/app/module-4.js",
      "/app/module-5.js",
      "/app/module-6.js",
    ]);
    let handler = ScriptedHandler::with_imports(&[
      (
        "/app/bundle-a.js",
        &[
          ("./module-2", ImportKind::Static),
          ("./module-3", ImportKind::Static),
          ("./module-4", ImportKind::Dynamic),
        ],
      ),
      ("/app/module-4.js", &[("./module-5", ImportKind::Static)]),
      (
        "/app/module-5.js",
        &[
          ("./module-3", ImportKind::Static),
          ("./module-6", ImportKind::Dynamic),
        ],
      ),
    ]);
    let processed = handler.processed.clone();

    let result = build(
      options(&[("bundle-a", "./bundle-a")]),
      fs,
      handler,
      CollectingEmitter::default(),
    )
    .unwrap();

    let generated = &result.bundles["default"];
    assert_eq!(
      generated.static_bundles["bundle-a"].modules,
      vec![
        PathBuf::from("/app/module-2.js"),
        PathBuf::from("/app/module-3.js"),
        PathBuf::from("/app/bundle-a.js"),
      ]
    );

    let four = &generated.dynamic_bundles[&DynamicBundleKey {
      parent: String::from("bundle-a"),
      root_module: PathBuf::from("/app/module-4.js"),
    }];
    assert_eq!(
      four.modules,
      vec![
        PathBuf::from("/app/module-5.js"),
        PathBuf::from("/app/module-4.js"),
      ]
    );
    let six = &generated.dynamic_bundles[&DynamicBundleKey {
      parent: String::from("bundle-a"),
      root_module: PathBuf::from("/app/module-6.js"),
    }];
    assert_eq!(six.modules, vec![PathBuf::from("/app/module-6.js")]);

    // Three distinct artifacts, each emitted once.
    let mut hashes: Vec<&str> = generated
      .artifacts()
      .iter()
      .map(|data| data.hash.as_str())
      .collect();
    hashes.dedup();
    assert_eq!(hashes.len(), 3);
    assert_eq!(result.emitted.len(), 3);

    // Every module was processed exactly once.
    let mut modules = processed.lock().clone();
    modules.sort();
    assert_eq!(modules.len(), 6);
    modules.dedup();
    assert_eq!(modules.len(), 6);
  }

  #[test]
  fn shared_modules_are_dispatched_once() {
    let fs = app_fs(&["/app/a.js", "/app/b.js", "/app/c.js", "/app/shared.js"]);
    let handler = ScriptedHandler::with_imports(&[
      (
        "/app/a.js",
        &[("./b", ImportKind::Static), ("./c", ImportKind::Static)],
      ),
      ("/app/b.js", &[("./shared", ImportKind::Static)]),
      ("/app/c.js", &[("./shared", ImportKind::Static)]),
    ]);
    let processed = handler.processed.clone();

    build(
      options(&[("main", "./a")]),
      fs,
      handler,
      CollectingEmitter::default(),
    )
    .unwrap();

    let count = processed
      .lock()
      .iter()
      .filter(|module| module.as_path() == Path::new("/app/shared.js"))
      .count();
    assert_eq!(count, 1);
  }

  #[test]
  fn completion_requires_both_sides_idle() {
    // A sequential import chain with a single worker: after each module
    // the pool is momentarily empty while its import is still waiting on
    // resolution. The build must keep going until the whole chain is in
    // the graph.
    let fs = app_fs(&["/app/a.js", "/app/b.js", "/app/c.js"]);
    let handler = ScriptedHandler::with_imports(&[
      ("/app/a.js", &[("./b", ImportKind::Static)]),
      ("/app/b.js", &[("./c", ImportKind::Static)]),
    ]);

    let mut options = options(&[("main", "./a")]);
    options.workers = Some(1);
    let result = build(options, fs, handler, CollectingEmitter::default()).unwrap();

    let variant = result.graph.variant("default").unwrap();
    for module in ["/app/a.js", "/app/b.js", "/app/c.js"] {
      let handle = variant.handle(Path::new(module)).unwrap();
      assert!(
        variant.node(handle).content.is_some(),
        "missing content for {module}"
      );
    }
  }

  #[test]
  fn handler_errors_abort_the_build() {
    let fs = app_fs(&["/app/a.js", "/app/bad.js"]);
    let handler = ScriptedHandler {
      fail_on: Some(PathBuf::from("/app/bad.js")),
      ..ScriptedHandler::with_imports(&[("/app/a.js", &[("./bad", ImportKind::Static)])])
    };

    let error = build(
      options(&[("main", "./a")]),
      fs,
      handler,
      CollectingEmitter::default(),
    )
    .unwrap_err();

    let BuildError::Content(content) = error else {
      panic!("expected a content error, got {error:?}");
    };
    assert_eq!(content.module, PathBuf::from("/app/bad.js"));
  }

  #[test]
  fn unresolvable_imports_abort_with_the_attempt_list() {
    let fs = app_fs(&["/app/a.js"]);
    let handler =
      ScriptedHandler::with_imports(&[("/app/a.js", &[("./missing", ImportKind::Static)])]);

    let error = build(
      options(&[("main", "./a")]),
      fs,
      handler,
      CollectingEmitter::default(),
    )
    .unwrap_err();

    let BuildError::Resolution(resolution) = error else {
      panic!("expected a resolution error, got {error:?}");
    };
    assert_eq!(resolution.specifier, "./missing");
    assert!(!resolution.attempts.is_empty());
  }

  #[test]
  fn handler_warnings_surface_without_aborting() {
    let fs = app_fs(&["/app/a.js"]);
    let handler = ScriptedHandler {
      warn_on: Some(PathBuf::from("/app/a.js")),
      ..ScriptedHandler::with_imports(&[])
    };

    let result = build(
      options(&[("main", "./a")]),
      fs,
      handler,
      CollectingEmitter::default(),
    )
    .unwrap();

    assert!(result.warnings.iter().any(|warning| matches!(
      warning,
      BuildWarning::Handler { message, .. } if message == "scripted warning"
    )));
  }

  #[test]
  fn identical_dynamic_subtrees_are_emitted_once() {
    let fs = app_fs(&["/app/a.js", "/app/b.js", "/app/widget.js", "/app/util.js"]);
    let handler = ScriptedHandler::with_imports(&[
      ("/app/a.js", &[("./widget", ImportKind::Dynamic)]),
      ("/app/b.js", &[("./widget", ImportKind::Dynamic)]),
      ("/app/widget.js", &[("./util", ImportKind::Static)]),
    ]);
    let emitter = CollectingEmitter::default();
    let emissions = emitter.emissions.clone();

    let result = build(
      options(&[("bundle-a", "./a"), ("bundle-b", "./b")]),
      fs,
      handler,
      emitter,
    )
    .unwrap();

    // Two static parents plus one shared dynamic artifact.
    assert_eq!(result.emitted.len(), 3);
    assert_eq!(emissions.lock().len(), 3);

    let generated = &result.bundles["default"];
    let from_a = &generated.dynamic_bundles[&DynamicBundleKey {
      parent: String::from("bundle-a"),
      root_module: PathBuf::from("/app/widget.js"),
    }];
    let from_b = &generated.dynamic_bundles[&DynamicBundleKey {
      parent: String::from("bundle-b"),
      root_module: PathBuf::from("/app/widget.js"),
    }];
    assert_eq!(from_a.hash, from_b.hash);
    assert_eq!(from_a.paths.output_path, from_b.paths.output_path);
  }

  #[test]
  fn variants_build_independent_graphs() {
    let fs = app_fs(&["/app/a.js", "/app/b.js"]);
    let handler = ScriptedHandler::with_imports(&[("/app/a.js", &[("./b", ImportKind::Static)])]);
    let processed = handler.processed.clone();

    let mut options = options(&[("main", "./a")]);
    options.variants = vec![String::from("en"), String::from("fr")];
    let result = build(options, fs, handler, CollectingEmitter::default()).unwrap();

    assert!(result.bundles.contains_key("en"));
    assert!(result.bundles.contains_key("fr"));
    for variant in ["en", "fr"] {
      assert!(result.bundles[variant].static_bundles.contains_key("main"));
    }

    // Both variants were fed from a single processing pass per module.
    assert_eq!(processed.lock().len(), 2);
  }

  #[test]
  fn import_cycles_fail_the_whole_build() {
    let fs = app_fs(&["/app/a.js", "/app/b.js"]);
    let handler = ScriptedHandler::with_imports(&[
      ("/app/a.js", &[("./b", ImportKind::Static)]),
      ("/app/b.js", &[("./a", ImportKind::Static)]),
    ]);

    let error = build(
      options(&[("main", "./a")]),
      fs,
      handler,
      CollectingEmitter::default(),
    )
    .unwrap_err();

    assert!(matches!(error, BuildError::Cycle(_)));
  }

  #[test]
  fn scope_ids_are_distinct_per_module() {
    let fs = app_fs(&["/app/a.js", "/app/b.js", "/app/c.js"]);
    let handler = ScriptedHandler::with_imports(&[(
      "/app/a.js",
      &[("./b", ImportKind::Static), ("./c", ImportKind::Static)],
    )]);

    // Scope ids are internal, but dispatch order is observable through
    // them being unique; a collision would alias renamed scopes.
    let mut options = options(&[("main", "./a")]);
    options.workers = Some(1);
    let result = build(options, fs, handler, CollectingEmitter::default()).unwrap();
    assert_eq!(result.graph.variant("default").unwrap().node_count(), 3);
  }
}
