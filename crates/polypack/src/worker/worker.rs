use std::path::Path;
use std::path::PathBuf;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;

use polypack_core::plugin::BundleEmitterRef;
use polypack_core::plugin::ContentHandlerRef;
use polypack_core::plugin::EmitterDelegate;
use polypack_core::plugin::HandlerDelegate;
use polypack_core::types::ContentInfo;
use polypack_core::types::ExportDeclaration;
use polypack_core::types::GeneratedAsset;
use polypack_core::types::ImportDeclaration;

use super::messages::WorkerEnvelope;
use super::messages::WorkerRequest;
use super::messages::WorkerResponse;
use super::messages::WorkerStatus;

/// Spawn one worker thread.
///
/// The worker is isolated: it owns its plugin references and talks to
/// the dispatcher exclusively through the two channels.
pub(crate) fn spawn_worker(
  worker_id: usize,
  handler: ContentHandlerRef,
  emitter: BundleEmitterRef,
  requests: Receiver<WorkerRequest>,
  responses: Sender<WorkerEnvelope>,
) -> JoinHandle<()> {
  std::thread::Builder::new()
    .name(format!("polypack-worker-{worker_id}"))
    .spawn(move || {
      Worker {
        worker_id,
        handler,
        emitter,
        responses,
      }
      .run(requests)
    })
    .expect("failed to spawn worker thread")
}

struct Worker {
  worker_id: usize,
  handler: ContentHandlerRef,
  emitter: BundleEmitterRef,
  responses: Sender<WorkerEnvelope>,
}

impl Worker {
  fn run(&self, requests: Receiver<WorkerRequest>) {
    self.status(WorkerStatus::Configuring);

    while let Ok(request) = requests.recv() {
      match request {
        WorkerRequest::ProcessConfig {
          handler_options,
          emitter_options,
        } => self.process_config(&handler_options, &emitter_options),
        WorkerRequest::ProcessModule {
          resolved_module,
          scope_id,
          variants,
        } => self.process_module(&resolved_module, &scope_id, &variants),
        WorkerRequest::ProcessBundle {
          bundle,
          variant,
          data,
          options,
        } => self.process_bundle(&bundle, &variant, data, &options),
        WorkerRequest::Close => break,
      }
    }

    self.status(WorkerStatus::Stopped);
  }

  fn process_config(&self, handler_options: &serde_json::Value, emitter_options: &serde_json::Value) {
    if let Err(error) = self.handler.init(handler_options) {
      self.send(WorkerResponse::ModuleContentError { error });
      self.status(WorkerStatus::Error);
      return;
    }
    if let Err(error) = self.emitter.init(emitter_options) {
      self.send(WorkerResponse::BundleContentError { error });
      self.status(WorkerStatus::Error);
      return;
    }
    self.status(WorkerStatus::Idle);
  }

  fn process_module(&self, module: &Path, scope_id: &str, variants: &[String]) {
    self.status(WorkerStatus::Processing);

    let mut delegate = ChannelDelegate {
      worker_id: self.worker_id,
      handler: self.handler.name().to_string(),
      module: module.to_path_buf(),
      responses: &self.responses,
    };
    match self.handler.process(module, scope_id, variants, &mut delegate) {
      Ok(()) => self.send(WorkerResponse::TaskComplete),
      Err(error) => {
        self.send(WorkerResponse::ModuleContentError { error });
        self.send(WorkerResponse::TaskComplete);
      }
    }

    self.status(WorkerStatus::Idle);
  }

  fn process_bundle(
    &self,
    bundle: &str,
    variant: &str,
    data: polypack_core::plugin::BundleEmission,
    options: &serde_json::Value,
  ) {
    self.status(WorkerStatus::Bundling);

    let mut delegate = EmitterChannelDelegate {
      worker_id: self.worker_id,
      bundler: self.emitter.name().to_string(),
      bundle: bundle.to_string(),
      responses: &self.responses,
    };
    match self.emitter.process(options, &data, &mut delegate) {
      Ok(stats) => {
        self.send(WorkerResponse::BundleContent {
          bundle: bundle.to_string(),
          variant: variant.to_string(),
          stats,
        });
        self.send(WorkerResponse::TaskComplete);
      }
      Err(error) => {
        self.send(WorkerResponse::BundleContentError { error });
        self.send(WorkerResponse::TaskComplete);
      }
    }

    self.status(WorkerStatus::Idle);
  }

  fn status(&self, status: WorkerStatus) {
    self.send(WorkerResponse::StatusChange { status });
  }

  fn send(&self, response: WorkerResponse) {
    // A closed channel means the dispatcher is gone; nothing to report to
    let _ = self.responses.send(WorkerEnvelope {
      worker_id: self.worker_id,
      response,
    });
  }
}

/// Forwards handler events to the dispatcher as messages
struct ChannelDelegate<'a> {
  worker_id: usize,
  handler: String,
  module: PathBuf,
  responses: &'a Sender<WorkerEnvelope>,
}

impl ChannelDelegate<'_> {
  fn send(&self, response: WorkerResponse) {
    let _ = self.responses.send(WorkerEnvelope {
      worker_id: self.worker_id,
      response,
    });
  }
}

impl HandlerDelegate for ChannelDelegate<'_> {
  fn content(&mut self, variant: &str, content: ContentInfo) {
    self.send(WorkerResponse::ModuleContent {
      module: self.module.clone(),
      variant: variant.to_string(),
      content,
    });
  }

  fn import(&mut self, variants: &[String], declaration: ImportDeclaration) {
    self.send(WorkerResponse::ModuleImport {
      module: self.module.clone(),
      variants: variants.to_vec(),
      declaration,
    });
  }

  fn export(&mut self, variants: &[String], declaration: ExportDeclaration) {
    self.send(WorkerResponse::ModuleExport {
      module: self.module.clone(),
      variants: variants.to_vec(),
      declaration,
    });
  }

  fn generated_asset(&mut self, variants: &[String], asset: GeneratedAsset) {
    self.send(WorkerResponse::ModuleGeneratedAsset {
      module: self.module.clone(),
      variants: variants.to_vec(),
      asset,
    });
  }

  fn warning(&mut self, variants: &[String], message: String) {
    self.send(WorkerResponse::ModuleWarning {
      handler: self.handler.clone(),
      module: self.module.clone(),
      variants: variants.to_vec(),
      message,
    });
  }
}

struct EmitterChannelDelegate<'a> {
  worker_id: usize,
  bundler: String,
  bundle: String,
  responses: &'a Sender<WorkerEnvelope>,
}

impl EmitterDelegate for EmitterChannelDelegate<'_> {
  fn warning(&mut self, message: String) {
    let _ = self.responses.send(WorkerEnvelope {
      worker_id: self.worker_id,
      response: WorkerResponse::BundleWarning {
        bundler: self.bundler.clone(),
        bundle: self.bundle.clone(),
        message,
      },
    });
  }
}
