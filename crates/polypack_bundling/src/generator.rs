use std::collections::BTreeMap;
use std::collections::HashMap;
use std::collections::HashSet;
use std::collections::VecDeque;
use std::path::Path;
use std::path::PathBuf;

use indexmap::IndexSet;
use petgraph::graph::NodeIndex;
use petgraph::stable_graph::StableDiGraph;
use petgraph::Direction;
use tracing::debug;
use tracing::instrument;

use polypack_core::diagnostic::BuildWarning;
use polypack_core::diagnostic::CycleError;
use polypack_core::graph::NodeHandle;
use polypack_core::graph::VariantGraph;
use polypack_core::hash::hash_bytes;
use polypack_core::types::BundleConfig;
use polypack_core::types::BundleType;
use polypack_core::types::ImportKind;
use polypack_core::types::OutputPathParams;
use polypack_core::types::OutputPathTemplate;
use polypack_core::types::OutputPaths;
use polypack_core::types::SymbolSet;
use polypack_core::types::WorkingSet;

use crate::types::DynamicBundleKey;
use crate::types::GeneratedBundleData;
use crate::types::GeneratedBundles;

/// Partition one completed graph variant into static, dynamic and common
/// bundles.
#[instrument(level = "debug", skip_all)]
pub fn generate_bundles(
  graph: &VariantGraph,
  working_set: &WorkingSet,
  configs: &BTreeMap<String, BundleConfig>,
  template: &OutputPathTemplate,
) -> Result<GeneratedBundles, CycleError> {
  let mut generator = BundleGenerator {
    graph,
    working_set,
    configs,
    template,
    default_config: BundleConfig::default(),
    pending: BTreeMap::new(),
    used_symbols: BTreeMap::new(),
    dynamic: BTreeMap::new(),
    static_root_reach: HashMap::new(),
    common_memo: HashMap::new(),
    warnings: Vec::new(),
  };

  // Phase 1: assign every reachable module to its pending bundles,
  // externalizing to backing library bundles.
  generator.assign_pending();

  // Phase 2: split dynamic-import subtrees out of their parents.
  generator.extract_dynamic();

  // Phase 3: promote shared modules into common bundles by frequency.
  generator.extract_commons();

  // Phase 4: subtract commons from dynamic bundles, order, hash, dedup.
  generator.finalize()
}

struct BundleGenerator<'a> {
  graph: &'a VariantGraph,
  working_set: &'a WorkingSet,
  configs: &'a BTreeMap<String, BundleConfig>,
  template: &'a OutputPathTemplate,
  default_config: BundleConfig,

  /// Modules currently assigned to each bundle, in discovery order
  pending: BTreeMap<String, IndexSet<NodeHandle>>,

  /// Symbols each bundle uses a module for; survives moves between
  /// bundles so dynamic children can consult their parent's entries
  used_symbols: BTreeMap<String, HashMap<NodeHandle, SymbolSet>>,

  /// Dynamic bundles keyed by (parent bundle, dynamic root)
  dynamic: BTreeMap<(String, NodeHandle), IndexSet<NodeHandle>>,

  /// Lazily computed static reachability from each bundle's own roots
  static_root_reach: HashMap<String, HashSet<NodeHandle>>,

  /// Memoized (module, common bundle) promotion outcomes
  common_memo: HashMap<(NodeHandle, String), bool>,

  warnings: Vec<BuildWarning>,
}

impl<'a> BundleGenerator<'a> {
  fn config(&self, bundle: &str) -> &BundleConfig {
    self.configs.get(bundle).unwrap_or(&self.default_config)
  }

  // ----------------------------
  // Phase 1: pending assignment
  // ----------------------------

  fn assign_pending(&mut self) {
    for handle in self.graph.handles() {
      let node = self.graph.node(handle);
      for bundle in self.working_set.bundles.keys() {
        if !node.bundles().contains(bundle) {
          continue;
        }

        let config = self.config(bundle);
        let backing = if config.bundle_type == BundleType::Entrypoint {
          config
            .depends
            .iter()
            .find(|library| node.bundles().contains(*library))
            .cloned()
        } else {
          None
        };

        let symbols = self.graph.used_symbols_for_bundle(handle, bundle);
        match backing {
          // The backing bundle already ships this module; record the
          // entrypoint's symbol demand against it instead.
          Some(library) => {
            self
              .used_symbols
              .entry(library)
              .or_default()
              .entry(handle)
              .or_default()
              .merge(&symbols);
          }
          None => {
            self
              .pending
              .entry(bundle.clone())
              .or_default()
              .insert(handle);
            self
              .used_symbols
              .entry(bundle.clone())
              .or_default()
              .entry(handle)
              .or_default()
              .merge(&symbols);
          }
        }
      }
    }
    debug!(bundles = self.pending.len(), "assigned pending modules");
  }

  // ----------------------------
  // Phase 2: dynamic extraction
  // ----------------------------

  fn extract_dynamic(&mut self) {
    let bundles: Vec<String> = self.working_set.bundles.keys().cloned().collect();

    for bundle in bundles {
      let preserve_duplicates = self.config(&bundle).preserve_duplicates;
      let members: Vec<NodeHandle> = match self.pending.get(&bundle) {
        Some(pending) => pending.iter().copied().collect(),
        None => continue,
      };

      for root in members {
        if !self.is_pending(&bundle, root) {
          // Already moved into an earlier dynamic sibling
          continue;
        }
        if self.graph.is_root_of(root, &bundle) {
          continue;
        }
        if self.graph.import_type_for_bundle(root, &bundle) != ImportKind::Dynamic {
          continue;
        }

        self.ensure_static_root_reach(&bundle);
        let subtree = self.static_subtree(root);
        let reachable = &self.static_root_reach[&bundle];

        for module in subtree {
          if !self
            .pending
            .get(&bundle)
            .is_some_and(|pending| pending.contains(&module))
          {
            // Externalized in phase 1 or already claimed
            continue;
          }

          if reachable.contains(&module) {
            // Also needed eagerly; keep it in the parent, duplicating
            // into the child only when configured to skip the extra
            // round trip.
            if preserve_duplicates {
              self
                .dynamic
                .entry((bundle.clone(), root))
                .or_default()
                .insert(module);
            }
          } else {
            if let Some(pending) = self.pending.get_mut(&bundle) {
              pending.shift_remove(&module);
            }
            self
              .dynamic
              .entry((bundle.clone(), root))
              .or_default()
              .insert(module);
          }
        }
      }
    }
    debug!(dynamic_bundles = self.dynamic.len(), "extracted dynamic bundles");
  }

  fn is_pending(&self, bundle: &str, handle: NodeHandle) -> bool {
    self
      .pending
      .get(bundle)
      .is_some_and(|pending| pending.contains(&handle))
  }

  /// Modules reachable from `root` over static import edges, `root`
  /// included, in breadth-first discovery order.
  fn static_subtree(&self, root: NodeHandle) -> Vec<NodeHandle> {
    let mut seen = HashSet::from([root]);
    let mut order = vec![root];
    let mut queue = VecDeque::from([root]);

    while let Some(handle) = queue.pop_front() {
      for (target, edge) in self.graph.node(handle).imports() {
        if edge.kind == ImportKind::Static && seen.insert(target) {
          order.push(target);
          queue.push_back(target);
        }
      }
    }
    order
  }

  fn ensure_static_root_reach(&mut self, bundle: &str) {
    if self.static_root_reach.contains_key(bundle) {
      return;
    }

    let mut seen: HashSet<NodeHandle> = self.graph.roots(bundle).iter().copied().collect();
    let mut queue: VecDeque<NodeHandle> = seen.iter().copied().collect();
    while let Some(handle) = queue.pop_front() {
      for (target, edge) in self.graph.node(handle).imports() {
        if edge.kind == ImportKind::Static && seen.insert(target) {
          queue.push_back(target);
        }
      }
    }
    self.static_root_reach.insert(bundle.to_string(), seen);
  }

  // ----------------------------
  // Phase 3: common extraction
  // ----------------------------

  fn extract_commons(&mut self) {
    let bundles: Vec<String> = self.working_set.bundles.keys().cloned().collect();

    for bundle in bundles {
      let commons = self.config(&bundle).commons.clone();
      for common in commons {
        if !self.working_set.commons.contains(&common) {
          continue;
        }
        let members: Vec<NodeHandle> = match self.pending.get(&bundle) {
          Some(pending) => pending.iter().copied().collect(),
          None => continue,
        };
        for module in members {
          self.test_common_promotion(module, &common);
        }
      }
    }
  }

  /// Runs at most once per (module, common bundle) pair regardless of how
  /// many dependent bundles scan the module.
  fn test_common_promotion(&mut self, module: NodeHandle, common: &str) {
    if self.common_memo.contains_key(&(module, common.to_string())) {
      return;
    }

    let config = self.config(common).clone();
    let node = self.graph.node(module);

    if let Some(content) = &node.content {
      if !config.accepts_content_type(&content.content_type) {
        self.warnings.push(BuildWarning::ContentTypeSkipped {
          module: node.module.clone(),
          common_bundle: common.to_string(),
          content_type: content.content_type.clone(),
        });
        self.common_memo.insert((module, common.to_string()), false);
        return;
      }
    }

    let dependents = &config.depended_by;
    let promoted = if dependents.is_empty() {
      false
    } else {
      let pending_count = dependents
        .iter()
        .filter(|dependent| self.is_pending(dependent, module))
        .count();
      let frequency = pending_count as f64 / dependents.len() as f64;
      frequency >= config.threshold
    };

    if promoted {
      self
        .pending
        .entry(common.to_string())
        .or_default()
        .insert(module);

      for dependent in dependents {
        let removed = self
          .pending
          .get_mut(dependent)
          .is_some_and(|pending| pending.shift_remove(&module));
        if removed {
          let symbols = self
            .used_symbols
            .get(dependent)
            .and_then(|symbols| symbols.get(&module))
            .cloned()
            .unwrap_or_else(|| self.graph.used_symbols_for_bundle(module, dependent));
          self
            .used_symbols
            .entry(common.to_string())
            .or_default()
            .entry(module)
            .or_default()
            .merge(&symbols);
        }
      }
    }

    self.common_memo.insert((module, common.to_string()), promoted);
  }

  // ----------------------------
  // Phase 4: finalization
  // ----------------------------

  fn finalize(mut self) -> Result<GeneratedBundles, CycleError> {
    // Dynamic bundles must not re-ship modules the parent's commons
    // already carry.
    let dynamic_keys: Vec<(String, NodeHandle)> = self.dynamic.keys().cloned().collect();
    for (parent, root) in dynamic_keys {
      for common in self.config(&parent).commons.clone() {
        let promoted: Vec<NodeHandle> = match self.pending.get(&common) {
          Some(pending) => pending.iter().copied().collect(),
          None => continue,
        };
        if let Some(members) = self.dynamic.get_mut(&(parent.clone(), root)) {
          for module in promoted {
            members.shift_remove(&module);
          }
        }
      }
    }

    let mut result = GeneratedBundles {
      warnings: std::mem::take(&mut self.warnings),
      ..GeneratedBundles::default()
    };
    let mut artifact_paths: HashMap<String, OutputPaths> = HashMap::new();

    for (bundle, members) in &self.pending {
      if members.is_empty() {
        continue;
      }
      let data = self.finalize_bundle(bundle, members, None, &mut artifact_paths)?;
      result.static_bundles.insert(bundle.clone(), data);
    }

    for ((parent, root), members) in &self.dynamic {
      if members.is_empty() {
        continue;
      }
      let data = self.finalize_bundle(parent, members, Some(*root), &mut artifact_paths)?;
      result.dynamic_bundles.insert(
        DynamicBundleKey {
          parent: parent.clone(),
          root_module: self.graph.node(*root).module.clone(),
        },
        data,
      );
    }

    Ok(result)
  }

  fn finalize_bundle(
    &self,
    bundle: &str,
    members: &IndexSet<NodeHandle>,
    dynamic_root: Option<NodeHandle>,
    artifact_paths: &mut HashMap<String, OutputPaths>,
  ) -> Result<GeneratedBundleData, CycleError> {
    let label = match dynamic_root {
      Some(root) => format!("{}:{}", bundle, self.graph.node(root).module.display()),
      None => bundle.to_string(),
    };
    let ordered = self.sort_members(&label, members)?;

    let mut used_symbols = BTreeMap::new();
    for handle in &ordered {
      let symbols = self
        .used_symbols
        .get(bundle)
        .and_then(|symbols| symbols.get(handle))
        .cloned()
        .unwrap_or_else(|| self.graph.used_symbols_for_bundle(*handle, bundle));
      used_symbols.insert(self.graph.node(*handle).module.clone(), symbols);
    }

    // Signature: ordered member content hashes plus their sorted
    // used-symbol lists. Bundles with equal signatures are one artifact.
    let mut signature = Vec::new();
    for handle in &ordered {
      let node = self.graph.node(*handle);
      if let Some(content) = &node.content {
        signature.extend_from_slice(content.content_hash.as_bytes());
      }
      signature.push(0);
      for symbol in used_symbols[&node.module].to_sorted_vec() {
        signature.extend_from_slice(symbol.as_bytes());
        signature.push(0);
      }
      signature.push(0);
    }
    let hash = hash_bytes(&signature);

    let (name, ext) = match dynamic_root {
      Some(root) => {
        let module = &self.graph.node(root).module;
        (file_stem(module), file_extension(module))
      }
      None => {
        let ext = ordered
          .first()
          .map(|handle| file_extension(&self.graph.node(*handle).module))
          .unwrap_or_else(|| String::from("js"));
        (bundle.to_string(), ext)
      }
    };

    let paths = artifact_paths
      .entry(hash.clone())
      .or_insert_with(|| {
        self.template.resolve(&OutputPathParams {
          name,
          ext,
          hash: hash.clone(),
          options: self.config(bundle).template_options.clone(),
        })
      })
      .clone();

    Ok(GeneratedBundleData {
      hash,
      paths,
      modules: ordered
        .iter()
        .map(|handle| self.graph.node(*handle).module.clone())
        .collect(),
      used_symbols,
    })
  }

  /// Topologically sort `members` over the import edges that stay within
  /// the member set, dependency-first. A cycle in this restricted
  /// subgraph is fatal: emission order would be undefined.
  fn sort_members(
    &self,
    label: &str,
    members: &IndexSet<NodeHandle>,
  ) -> Result<Vec<NodeHandle>, CycleError> {
    let mut subgraph: StableDiGraph<NodeHandle, ()> = StableDiGraph::new();
    let mut indices: HashMap<NodeHandle, NodeIndex> = HashMap::new();
    for handle in members {
      indices.insert(*handle, subgraph.add_node(*handle));
    }
    for handle in members {
      for (target, _edge) in self.graph.node(*handle).imports() {
        if let Some(target_index) = indices.get(&target) {
          // Importee before importer
          subgraph.add_edge(*target_index, indices[handle], ());
        }
      }
    }

    let mut in_degree: HashMap<NodeHandle, usize> = members
      .iter()
      .map(|handle| {
        (
          *handle,
          subgraph
            .edges_directed(indices[handle], Direction::Incoming)
            .count(),
        )
      })
      .collect();

    let member_list: Vec<NodeHandle> = members.iter().copied().collect();
    let mut ordered = Vec::with_capacity(member_list.len());
    let mut emitted: HashSet<NodeHandle> = HashSet::new();

    while ordered.len() < member_list.len() {
      let mut progressed = false;
      for handle in &member_list {
        if emitted.contains(handle) || in_degree[handle] > 0 {
          continue;
        }
        emitted.insert(*handle);
        ordered.push(*handle);
        progressed = true;
        for importer in subgraph.neighbors_directed(indices[handle], Direction::Outgoing) {
          let importer_handle = subgraph[importer];
          if let Some(degree) = in_degree.get_mut(&importer_handle) {
            *degree -= 1;
          }
        }
      }

      if !progressed {
        let mut remaining: Vec<PathBuf> = member_list
          .iter()
          .filter(|handle| !emitted.contains(handle))
          .map(|handle| self.graph.node(*handle).module.clone())
          .collect();
        remaining.sort();
        return Err(CycleError {
          bundle: label.to_string(),
          members: remaining,
        });
      }
    }

    Ok(ordered)
  }
}

fn file_stem(path: &Path) -> String {
  path
    .file_stem()
    .map(|stem| stem.to_string_lossy().into_owned())
    .unwrap_or_else(|| String::from("bundle"))
}

fn file_extension(path: &Path) -> String {
  path
    .extension()
    .map(|extension| extension.to_string_lossy().into_owned())
    .unwrap_or_else(|| String::from("js"))
}
