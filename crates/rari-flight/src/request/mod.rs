use rustc_hash::FxHashMap;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

mod emit;
mod encoder;
mod options;
mod outline;
mod render;
mod task;


pub use options::{ErrorHandler, PostponeHandler, RequestOptions};
pub use render::ComponentScope;
pub use task::{TaskStatus, ThenableState};

use crate::context::{ContextSnapshot, import_server_contexts};
use crate::destination::Destination;
use crate::error::{FlightError, Interrupt, Rejection};
use crate::model::{Model, ObjectId, ReferenceResolver, Thenable, ThenableStatus};
use crate::taint::TaintRegistry;
use crate::wire_format::{ChunkId, row, tokens};
use emit::Outbox;
use task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Open,
    /// A fatal error happened with no destination attached.
    Closing,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Written {
    /// Inlined once. A second sighting outlines it.
    Seen,
    Outlined(ChunkId),
}

/// State of one serialization, from the root model to the closed stream.
pub struct Request {
    status: RequestStatus,
    fatal_error: Option<FlightError>,
    destination: Option<Box<dyn Destination>>,
    /// Destination that reported backpressure, kept until `resume_flowing`.
    paused: Option<Box<dyn Destination>>,
    working: bool,

    resolver: Arc<dyn ReferenceResolver>,
    taint: Arc<TaintRegistry>,
    on_error: ErrorHandler,
    on_postpone: PostponeHandler,
    debug: bool,
    identifier_prefix: String,
    identifier_count: u64,

    outbox: Outbox,
    /// Non-terminal tasks. This is also the set an abort unwinds.
    tasks: BTreeMap<ChunkId, Task>,
    ready: VecDeque<ChunkId>,
    ping_tx: mpsc::UnboundedSender<ChunkId>,
    ping_rx: mpsc::UnboundedReceiver<ChunkId>,

    written_objects: FxHashMap<ObjectId, Written>,
    written_symbols: FxHashMap<ObjectId, ChunkId>,
    written_client_references: FxHashMap<String, ChunkId>,
    written_server_references: FxHashMap<ObjectId, ChunkId>,
    written_providers: FxHashMap<String, ChunkId>,

    active_context: ContextSnapshot,
    /// Model of the row being written, allowed to inline once even though it has an id.
    model_root: Option<ObjectId>,
    in_array: bool,
    suspended_thenable_state: Option<ThenableState>,
}

impl Request {
    pub fn new(model: impl Into<Model>, options: RequestOptions) -> Self {
        let (ping_tx, ping_rx) = mpsc::unbounded_channel();
        let mut request = Self {
            status: RequestStatus::Open,
            fatal_error: None,
            destination: None,
            paused: None,
            working: false,
            resolver: options.resolver,
            taint: options.taint,
            on_error: options.on_error.unwrap_or_else(options::default_error_handler),
            on_postpone: options.on_postpone.unwrap_or_else(options::default_postpone_handler),
            debug: options.debug,
            identifier_prefix: options.identifier_prefix,
            identifier_count: 1,
            outbox: Outbox::default(),
            tasks: BTreeMap::new(),
            ready: VecDeque::new(),
            ping_tx,
            ping_rx,
            written_objects: FxHashMap::default(),
            written_symbols: FxHashMap::default(),
            written_client_references: FxHashMap::default(),
            written_server_references: FxHashMap::default(),
            written_providers: FxHashMap::default(),
            active_context: ContextSnapshot::root(),
            model_root: None,
            in_array: false,
            suspended_thenable_state: None,
        };

        request.outbox.pending_chunks += 1;
        request.active_context = import_server_contexts(&options.contexts);
        let root = request.create_task(model.into(), None);
        request.active_context = ContextSnapshot::root();
        request.ready.push_back(root);
        request
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn is_closed(&self) -> bool {
        self.status == RequestStatus::Closed
    }

    pub fn fatal_error(&self) -> Option<&FlightError> {
        self.fatal_error.as_ref()
    }

    /// Number of tasks that have not reached a terminal state.
    pub fn pending_tasks(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_flowing(&self) -> bool {
        self.destination.is_some()
    }

    pub fn is_paused(&self) -> bool {
        self.paused.is_some()
    }

    /// Runs the root task and anything it makes ready.
    pub fn start_work(&mut self) {
        self.work_until_idle();
    }

    pub fn work_until_idle(&mut self) {
        while self.has_ready_work() {
            self.perform_work();
        }
    }

    /// True when a task is ready or a ping is waiting in the channel.
    pub fn has_ready_work(&mut self) -> bool {
        self.collect_pings();
        !self.ready.is_empty()
    }

    /// Retries every ready task once, then flushes.
    pub fn perform_work(&mut self) {
        self.collect_pings();
        let batch: Vec<ChunkId> = self.ready.drain(..).collect();
        self.working = true;
        let result = self.retry_batch(batch);
        self.working = false;
        if let Err(error) = result {
            self.log_recoverable_error(&error);
            self.handle_fatal_error(error);
        }
    }

    fn retry_batch(&mut self, batch: Vec<ChunkId>) -> Result<(), FlightError> {
        for id in batch {
            self.retry_task(id)?;
        }
        self.flush_completed_chunks()
    }

    /// Waits for a settled thenable to ping one of the tasks and queues it.
    pub async fn wait_for_ping(&mut self) {
        if let Some(id) = self.ping_rx.recv().await {
            self.ready.push_back(id);
        }
    }

    fn collect_pings(&mut self) {
        while let Ok(id) = self.ping_rx.try_recv() {
            self.ready.push_back(id);
        }
    }

    pub fn start_flowing(&mut self, destination: impl Destination + 'static) {
        self.attach(Box::new(destination));
    }

    fn attach(&mut self, mut destination: Box<dyn Destination>) {
        match self.status {
            RequestStatus::Closing => {
                self.status = RequestStatus::Closed;
                if let Some(error) = &self.fatal_error {
                    destination.close_with_error(error);
                }
                return;
            }
            RequestStatus::Closed => return,
            RequestStatus::Open => {}
        }
        if self.destination.is_some() {
            return;
        }
        self.paused = None;
        self.destination = Some(destination);
        if let Err(error) = self.flush_completed_chunks() {
            self.log_recoverable_error(&error);
            self.handle_fatal_error(error);
        }
    }

    /// Detaches the destination. Rows keep queueing until one is attached again.
    pub fn stop_flowing(&mut self) -> Option<Box<dyn Destination>> {
        self.destination.take().or_else(|| self.paused.take())
    }

    /// Reattaches a destination that reported backpressure and flushes.
    pub fn resume_flowing(&mut self) {
        if let Some(destination) = self.paused.take() {
            self.attach(destination);
        }
    }

    /// Emits an out-of-band hint row. Hints do not hold the stream open.
    pub fn emit_hint(&mut self, code: &str, model: &Value) {
        let result = self.emit_hint_chunk(code, model).and_then(|()| {
            if self.working || !self.ready.is_empty() {
                Ok(())
            } else {
                self.flush_completed_chunks()
            }
        });
        if let Err(error) = result {
            self.log_recoverable_error(&error);
            self.handle_fatal_error(error);
        }
    }

    /// Stops the request. Every pending task is answered with a reference to one
    /// shared error or postpone row.
    pub fn abort(&mut self, reason: Option<Rejection>) {
        if let Err(error) = self.try_abort(reason) {
            self.log_recoverable_error(&error);
            self.handle_fatal_error(error);
        }
    }

    fn try_abort(&mut self, reason: Option<Rejection>) -> Result<(), FlightError> {
        if !self.tasks.is_empty() {
            warn!("Aborting flight request with {} pending tasks", self.tasks.len());
            self.outbox.pending_chunks += 1;
            let error_id = self.outbox.allocate_id();
            let reason = reason.unwrap_or(Rejection::Error(FlightError::Aborted));
            self.emit_rejection(error_id, &reason)?;

            let reference = tokens::by_value(error_id);
            for (id, mut task) in std::mem::take(&mut self.tasks) {
                task.finish(TaskStatus::Aborted);
                self.outbox.errors.push_back(row::reference_row(id, &reference)?);
            }
        }
        self.flush_completed_chunks()
    }

    fn create_task(&mut self, model: Model, parent_key: Option<String>) -> ChunkId {
        let id = self.outbox.allocate_id();
        let mut task = Task::new(id, model, self.active_context.clone());
        task.parent_key = parent_key;
        self.tasks.insert(id, task);
        id
    }

    /// Pings `task` through the channel once `thenable` settles. Never retries inline.
    fn subscribe(&self, thenable: &Thenable, task: ChunkId) {
        let ping = self.ping_tx.clone();
        thenable.subscribe(move || {
            let _ = ping.send(task);
        });
    }

    fn retry_task(&mut self, id: ChunkId) -> Result<(), FlightError> {
        let Some(mut task) = self.tasks.remove(&id) else {
            return Ok(());
        };

        if let Some(thenable) = task.waiting_on.take() {
            match thenable.status() {
                ThenableStatus::Pending => {
                    task.waiting_on = Some(thenable);
                    self.tasks.insert(id, task);
                    return Ok(());
                }
                ThenableStatus::Fulfilled(value) => task.model = value,
                ThenableStatus::Rejected(reason) => {
                    task.finish(TaskStatus::Errored);
                    return self.emit_rejection(id, &reason);
                }
            }
        }

        let prev_context = std::mem::replace(&mut self.active_context, task.context.clone());
        let prev_root = self.model_root.take();
        let result = self.render_task(&mut task);
        self.active_context = prev_context;
        self.model_root = prev_root;

        match result {
            Ok(()) => {
                task.finish(TaskStatus::Completed);
                debug!("Task {:x} completed", id);
                Ok(())
            }
            Err(Interrupt::Suspend(thenable)) => {
                task.thenable_state = self.suspended_thenable_state.take().unwrap_or_default();
                debug!("Task {:x} suspended", id);
                self.subscribe(&thenable, id);
                self.tasks.insert(id, task);
                Ok(())
            }
            Err(Interrupt::Postpone(postpone)) => {
                task.finish(TaskStatus::Errored);
                self.emit_rejection(id, &Rejection::Postpone(postpone))
            }
            Err(Interrupt::Error(error)) => {
                task.finish(TaskStatus::Errored);
                self.emit_rejection(id, &Rejection::Error(error))
            }
        }
    }

    fn render_task(&mut self, task: &mut Task) -> Result<(), Interrupt> {
        let resolved = self.resolve_task_model(task)?;

        if let encoder::Resolved::Model(model) = &resolved
            && let Some(object_id) = model.identity()
        {
            self.written_objects.insert(object_id, Written::Outlined(task.id));
            self.model_root = Some(object_id);
        }

        let json = self.encode_resolved("", resolved)?;
        self.emit_model_chunk(task.id, &json)?;
        Ok(())
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("status", &self.status)
            .field("pending_chunks", &self.outbox.pending_chunks)
            .field("pending_tasks", &self.tasks.len())
            .finish()
    }
}
