use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::path::Path;
use std::path::PathBuf;

use crate::types::ContentInfo;
use crate::types::ExportDeclaration;
use crate::types::GeneratedAsset;
use crate::types::ImportDeclaration;
use crate::types::ImportKind;
use crate::types::SymbolSet;

/// Index of a node within one variant's arena.
///
/// Handles are only meaningful within the [`VariantGraph`] that issued
/// them; edges are stored as handles rather than owning references so the
/// import/imported-by back references cannot form ownership cycles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(usize);

/// One import edge between two modules
#[derive(Clone, Debug, PartialEq)]
pub struct ImportEdge {
  pub symbols: SymbolSet,
  pub kind: ImportKind,
}

/// One resolved module within a variant
#[derive(Clone, Debug)]
pub struct DependencyNode {
  pub module: PathBuf,
  imports: BTreeMap<NodeHandle, ImportEdge>,
  imported_by: BTreeSet<NodeHandle>,
  pub exports: SymbolSet,
  pub export_identifier: Option<String>,
  pub es_module: bool,
  pub content: Option<ContentInfo>,
  pub generated_assets: BTreeMap<String, String>,
  bundles: BTreeSet<String>,
}

impl DependencyNode {
  fn new(module: PathBuf) -> Self {
    Self {
      module,
      imports: BTreeMap::new(),
      imported_by: BTreeSet::new(),
      exports: SymbolSet::default(),
      export_identifier: None,
      es_module: false,
      content: None,
      generated_assets: BTreeMap::new(),
      bundles: BTreeSet::new(),
    }
  }

  pub fn imports(&self) -> impl Iterator<Item = (NodeHandle, &ImportEdge)> {
    self.imports.iter().map(|(handle, edge)| (*handle, edge))
  }

  pub fn import_edge(&self, to: NodeHandle) -> Option<&ImportEdge> {
    self.imports.get(&to)
  }

  pub fn imported_by(&self) -> impl Iterator<Item = NodeHandle> + '_ {
    self.imported_by.iter().copied()
  }

  /// The bundles this module is transitively reachable from. Grow-only
  /// for the duration of a build.
  pub fn bundles(&self) -> &BTreeSet<String> {
    &self.bundles
  }
}

/// The dependency graph of a single variant
///
/// Nodes are created on first reference (as importer, importee or
/// entrypoint) and never deleted during a build. All mutation goes
/// through the owning [`DependencyGraph`].
#[derive(Clone, Debug, Default)]
pub struct VariantGraph {
  nodes: Vec<DependencyNode>,
  handles: HashMap<PathBuf, NodeHandle>,
  roots: BTreeMap<String, Vec<NodeHandle>>,
}

impl VariantGraph {
  pub fn handle(&self, module: &Path) -> Option<NodeHandle> {
    self.handles.get(module).copied()
  }

  pub fn node(&self, handle: NodeHandle) -> &DependencyNode {
    &self.nodes[handle.0]
  }

  pub fn node_count(&self) -> usize {
    self.nodes.len()
  }

  pub fn handles(&self) -> impl Iterator<Item = NodeHandle> {
    (0..self.nodes.len()).map(NodeHandle)
  }

  /// Entry modules of `bundle`, in registration order.
  pub fn roots(&self, bundle: &str) -> &[NodeHandle] {
    self.roots.get(bundle).map(Vec::as_slice).unwrap_or(&[])
  }

  pub fn is_root_of(&self, handle: NodeHandle, bundle: &str) -> bool {
    self.roots(bundle).contains(&handle)
  }

  /// Union of the symbol sets recorded on every importer of `handle` that
  /// belongs to `bundle`. Computed on demand; wildcard-dominant.
  pub fn used_symbols_for_bundle(&self, handle: NodeHandle, bundle: &str) -> SymbolSet {
    let mut symbols = SymbolSet::default();
    for importer in &self.nodes[handle.0].imported_by {
      let importer_node = &self.nodes[importer.0];
      if !importer_node.bundles.contains(bundle) {
        continue;
      }
      if let Some(edge) = importer_node.imports.get(&handle) {
        symbols.merge(&edge.symbols);
      }
    }
    symbols
  }

  /// How `bundle` reaches `handle`: static if any qualifying importer is
  /// static, dynamic only when every qualifying importer is dynamic.
  /// Roots of the bundle are static by definition.
  pub fn import_type_for_bundle(&self, handle: NodeHandle, bundle: &str) -> ImportKind {
    if self.is_root_of(handle, bundle) {
      return ImportKind::Static;
    }

    let mut saw_dynamic = false;
    for importer in &self.nodes[handle.0].imported_by {
      let importer_node = &self.nodes[importer.0];
      if !importer_node.bundles.contains(bundle) {
        continue;
      }
      match importer_node.imports.get(&handle).map(|edge| edge.kind) {
        Some(ImportKind::Static) => return ImportKind::Static,
        Some(ImportKind::Dynamic) => saw_dynamic = true,
        None => {}
      }
    }

    if saw_dynamic {
      ImportKind::Dynamic
    } else {
      ImportKind::Static
    }
  }

  fn ensure_node(&mut self, module: &Path) -> NodeHandle {
    if let Some(handle) = self.handles.get(module) {
      return *handle;
    }
    let handle = NodeHandle(self.nodes.len());
    self.nodes.push(DependencyNode::new(module.to_path_buf()));
    self.handles.insert(module.to_path_buf(), handle);
    handle
  }

  /// Fixed-point bundle propagation over the import edges.
  ///
  /// Each step passes only the delta of bundles the node did not already
  /// have; the delta strictly shrinks along any path, so the worklist
  /// drains even through import cycles.
  fn add_bundles(&mut self, handle: NodeHandle, new_bundles: &BTreeSet<String>) {
    let mut worklist = vec![(handle, new_bundles.clone())];

    while let Some((handle, bundles)) = worklist.pop() {
      let node = &mut self.nodes[handle.0];
      let delta: BTreeSet<String> = bundles
        .into_iter()
        .filter(|bundle| !node.bundles.contains(bundle))
        .collect();
      if delta.is_empty() {
        continue;
      }

      tracing::trace!(module = %node.module.display(), ?delta, "bundle membership grew");
      node.bundles.extend(delta.iter().cloned());
      for target in node.imports.keys().copied().collect::<Vec<_>>() {
        worklist.push((target, delta.clone()));
      }
    }
  }

  fn add_entrypoint(&mut self, module: &Path, bundle: &str) {
    let handle = self.ensure_node(module);
    let roots = self.roots.entry(bundle.to_string()).or_default();
    if !roots.contains(&handle) {
      roots.push(handle);
    }
    self.add_bundles(handle, &BTreeSet::from([bundle.to_string()]));
  }

  fn add_import(&mut self, from: &Path, to: &Path, declaration: &ImportDeclaration) {
    let from_handle = self.ensure_node(from);
    let to_handle = self.ensure_node(to);

    let edge = self.nodes[from_handle.0]
      .imports
      .entry(to_handle)
      .or_insert_with(|| ImportEdge {
        symbols: SymbolSet::default(),
        kind: declaration.kind,
      });
    edge.symbols.merge(&declaration.symbols);
    edge.kind.upgrade(declaration.kind);

    self.nodes[to_handle.0].imported_by.insert(from_handle);

    let importer_bundles = self.nodes[from_handle.0].bundles.clone();
    self.add_bundles(to_handle, &importer_bundles);
  }

  fn add_export(&mut self, module: &Path, declaration: &ExportDeclaration) {
    let handle = self.ensure_node(module);
    let node = &mut self.nodes[handle.0];
    node.exports.merge(&declaration.symbols);
    if declaration.identifier.is_some() {
      node.export_identifier = declaration.identifier.clone();
    }
    node.es_module |= declaration.es_module;
  }

  fn set_content(&mut self, module: &Path, content: ContentInfo) {
    let handle = self.ensure_node(module);
    self.nodes[handle.0].content = Some(content);
  }

  fn add_generated_asset(&mut self, module: &Path, asset: &GeneratedAsset) {
    let handle = self.ensure_node(module);
    self.nodes[handle.0]
      .generated_assets
      .insert(asset.name.clone(), asset.output_path.clone());
  }
}

/// All per-variant dependency graphs of one build
///
/// The same module path produces distinct node instances per variant; no
/// reachability or usage state crosses variants.
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
  variants: BTreeMap<String, VariantGraph>,
}

impl DependencyGraph {
  pub fn new<I, S>(variants: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      variants: variants
        .into_iter()
        .map(|name| (name.into(), VariantGraph::default()))
        .collect(),
    }
  }

  pub fn variant(&self, name: &str) -> Option<&VariantGraph> {
    self.variants.get(name)
  }

  pub fn variants(&self) -> impl Iterator<Item = (&String, &VariantGraph)> {
    self.variants.iter()
  }

  fn variant_mut(&mut self, name: &str) -> &mut VariantGraph {
    self.variants.entry(name.to_string()).or_default()
  }

  /// Mark `module` as a root of `bundle` in every named variant.
  pub fn entrypoint(&mut self, module: &Path, variants: &[String], bundle: &str) {
    for variant in variants {
      self.variant_mut(variant).add_entrypoint(module, bundle);
    }
  }

  /// Create or merge the import edge `from -> to` and propagate the
  /// importer's bundle membership to the importee.
  pub fn imports(
    &mut self,
    from: &Path,
    to: &Path,
    variants: &[String],
    declaration: &ImportDeclaration,
  ) {
    for variant in variants {
      self.variant_mut(variant).add_import(from, to, declaration);
    }
  }

  /// Merge exported symbols and record the exporting identifier.
  pub fn exports(&mut self, module: &Path, variants: &[String], declaration: &ExportDeclaration) {
    for variant in variants {
      self.variant_mut(variant).add_export(module, declaration);
    }
  }

  pub fn content(&mut self, module: &Path, variants: &[String], content: &ContentInfo) {
    for variant in variants {
      self.variant_mut(variant).set_content(module, content.clone());
    }
  }

  pub fn generated_asset(&mut self, module: &Path, variants: &[String], asset: &GeneratedAsset) {
    for variant in variants {
      self.variant_mut(variant).add_generated_asset(module, asset);
    }
  }
}
