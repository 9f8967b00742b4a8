use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use polypack_core::diagnostic::BundleError;
use polypack_core::diagnostic::ContentError;
use polypack_core::plugin::BundleEmission;
use polypack_core::plugin::EmitStats;
use polypack_core::types::ContentInfo;
use polypack_core::types::ExportDeclaration;
use polypack_core::types::GeneratedAsset;
use polypack_core::types::ImportDeclaration;

/// Reported worker life-cycle states
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WorkerStatus {
  Configuring,
  Idle,
  Processing,
  Bundling,
  Error,
  Stopped,
}

/// Dispatcher-to-worker messages
///
/// Workers share no memory with the dispatcher; everything they need
/// crosses this boundary as a serializable message, so the channel could
/// be swapped for a process pipe without touching the protocol.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerRequest {
  ProcessConfig {
    handler_options: serde_json::Value,
    emitter_options: serde_json::Value,
  },
  ProcessModule {
    resolved_module: PathBuf,
    scope_id: String,
    variants: Vec<String>,
  },
  ProcessBundle {
    bundle: String,
    variant: String,
    data: BundleEmission,
    options: serde_json::Value,
  },
  Close,
}

/// Worker-to-dispatcher messages
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerResponse {
  ModuleContent {
    module: PathBuf,
    variant: String,
    content: ContentInfo,
  },
  ModuleContentError {
    error: ContentError,
  },
  ModuleImport {
    module: PathBuf,
    variants: Vec<String>,
    declaration: ImportDeclaration,
  },
  ModuleExport {
    module: PathBuf,
    variants: Vec<String>,
    declaration: ExportDeclaration,
  },
  ModuleGeneratedAsset {
    module: PathBuf,
    variants: Vec<String>,
    asset: GeneratedAsset,
  },
  ModuleWarning {
    handler: String,
    module: PathBuf,
    variants: Vec<String>,
    message: String,
  },
  BundleContent {
    bundle: String,
    variant: String,
    stats: EmitStats,
  },
  BundleContentError {
    error: BundleError,
  },
  BundleWarning {
    bundler: String,
    bundle: String,
    message: String,
  },
  TaskComplete,
  StatusChange {
    status: WorkerStatus,
  },
}

/// A worker response tagged with its origin
#[derive(Clone, Debug)]
pub struct WorkerEnvelope {
  pub worker_id: usize,
  pub response: WorkerResponse,
}
