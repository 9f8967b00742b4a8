use std::collections::VecDeque;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use crossbeam_channel::Sender;
use tracing::debug;
use tracing::warn;

use polypack_core::diagnostic::WorkerFault;
use polypack_core::plugin::BundleEmitterRef;
use polypack_core::plugin::ContentHandlerRef;

use super::messages::WorkerEnvelope;
use super::messages::WorkerRequest;
use super::messages::WorkerResponse;
use super::messages::WorkerStatus;
use super::worker::spawn_worker;

struct WorkerHandle {
  id: usize,
  requests: Sender<WorkerRequest>,
  join: Option<JoinHandle<()>>,
  /// Dispatcher-side view: a task was sent and its TaskComplete has not
  /// arrived yet. This, not the reported status, gates dispatch.
  busy: bool,
  status: WorkerStatus,
}

/// Single-threaded dispatcher over a pool of worker threads
///
/// The pool owns the FIFO work queue and the status table exclusively;
/// workers communicate with it only through their message channels. The
/// head of the queue goes to any worker that is currently free, and the
/// pool is idle exactly when the queue is empty and every worker is free.
pub struct WorkerPool {
  workers: Vec<WorkerHandle>,
  queue: VecDeque<WorkerRequest>,
  responses: Receiver<WorkerEnvelope>,
}

impl WorkerPool {
  pub fn new(count: usize, handler: ContentHandlerRef, emitter: BundleEmitterRef) -> Self {
    let (response_sender, responses) = crossbeam_channel::unbounded();

    let workers = (0..count.max(1))
      .map(|id| {
        let (request_sender, request_receiver) = crossbeam_channel::unbounded();
        let join = spawn_worker(
          id,
          handler.clone(),
          emitter.clone(),
          request_receiver,
          response_sender.clone(),
        );
        WorkerHandle {
          id,
          requests: request_sender,
          join: Some(join),
          busy: false,
          status: WorkerStatus::Configuring,
        }
      })
      .collect();

    Self {
      workers,
      queue: VecDeque::new(),
      responses,
    }
  }

  pub fn worker_count(&self) -> usize {
    self.workers.len()
  }

  /// Broadcast the invariant plugin options to every worker.
  pub fn configure(&mut self, handler_options: serde_json::Value, emitter_options: serde_json::Value) {
    for worker in &self.workers {
      let _ = worker.requests.send(WorkerRequest::ProcessConfig {
        handler_options: handler_options.clone(),
        emitter_options: emitter_options.clone(),
      });
    }
  }

  pub fn enqueue(&mut self, request: WorkerRequest) {
    self.queue.push_back(request);
    self.dispatch();
  }

  /// True only when the queue is empty and every worker is free.
  pub fn is_idle(&self) -> bool {
    self.queue.is_empty() && self.workers.iter().all(|worker| !worker.busy)
  }

  /// Block until the next worker message, keeping the dispatcher's
  /// bookkeeping (busy flags, status table, follow-up dispatch) current.
  pub fn recv(&mut self) -> Result<WorkerEnvelope, WorkerFault> {
    let envelope = self.responses.recv().map_err(|_| WorkerFault {
      worker_id: 0,
      message: String::from("worker response channel closed unexpectedly"),
    })?;

    match &envelope.response {
      WorkerResponse::TaskComplete => {
        if let Some(worker) = self.workers.get_mut(envelope.worker_id) {
          worker.busy = false;
        }
        self.dispatch();
      }
      WorkerResponse::StatusChange { status } => {
        if let Some(worker) = self.workers.get_mut(envelope.worker_id) {
          worker.status = *status;
        }
      }
      _ => {}
    }

    Ok(envelope)
  }

  pub fn worker_statuses(&self) -> Vec<WorkerStatus> {
    self.workers.iter().map(|worker| worker.status).collect()
  }

  fn dispatch(&mut self) {
    while !self.queue.is_empty() {
      let Some(worker) = self
        .workers
        .iter_mut()
        .find(|worker| !worker.busy && worker.status != WorkerStatus::Stopped)
      else {
        return;
      };

      let request = self.queue.pop_front().expect("queue checked non-empty");
      match worker.requests.send(request) {
        Ok(()) => worker.busy = true,
        Err(crossbeam_channel::SendError(request)) => {
          // The worker died without a Close; stop selecting it. Its
          // request goes back to the head of the queue for a live worker.
          warn!(worker_id = worker.id, "worker channel closed, marking stopped");
          worker.status = WorkerStatus::Stopped;
          self.queue.push_front(request);
        }
      }
    }
  }

  /// Teardown handshake: signal close to each worker and wait for every
  /// thread to exit. No timeout is enforced.
  pub fn shutdown(mut self) {
    debug!(workers = self.workers.len(), "shutting down worker pool");
    for worker in &mut self.workers {
      let _ = worker.requests.send(WorkerRequest::Close);
    }
    for worker in &mut self.workers {
      if let Some(join) = worker.join.take() {
        let _ = join.join();
      }
    }
  }
}
