//! External collaborator interfaces (spec §6) and in-memory fixtures used
//! by the CLI harness and the integration tests. The real object store,
//! blob store, RPC transport, and server listener are explicitly out of
//! scope (spec §1) - these fixtures exist only to drive the core end to
//! end without them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use crossbeam_channel::{Receiver, Sender};

use crate::error::EngineError;
use crate::execution::cache::ObjectId;
use crate::filter::Filter;

/// A candidate object flowing through the search (spec §3 "ObjectRecord").
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub attributes: HashMap<String, Vec<u8>>,
}

impl ObjectRecord {
    pub fn new(id: ObjectId) -> Self {
        ObjectRecord {
            id,
            attributes: HashMap::new(),
        }
    }
}

/// Result of fetching the next object (spec §6, `ObjectStore.next`).
pub enum NextObject {
    Object(ObjectRecord),
    EndOfStream,
}

/// Produces candidate objects in arbitrary order (spec §6).
pub trait ObjectStore: Send + Sync {
    fn next(&self) -> Result<NextObject, EngineError>;
}

/// Retrieves filter code / reference blobs by content signature (spec §6).
pub trait BlobStore: Send + Sync {
    fn get(&self, signature: u64) -> Result<Vec<u8>, EngineError>;
}

/// Executes one filter against one object; must be deterministic given an
/// identical `(filter.signature, object)` pair (spec §6).
pub trait FilterRuntime: Send + Sync {
    fn eval(&self, filter: &Filter, object: &ObjectRecord) -> Result<(i32, HashMap<String, Vec<u8>>), EngineError>;
}

/// Delivers a passing object downstream (spec §6).
pub trait ResultSink: Send + Sync {
    fn emit(&self, object: ObjectRecord);
}

/// Structured logging sink (spec §6). The crate's own internals log through
/// `tracing` directly; this trait exists so a caller can additionally bridge
/// events to their own sink (spec §10).
pub trait Logger: Send + Sync {
    fn log(&self, level: tracing::Level, msg: &str);
}

/// `Logger` implementation that forwards to `tracing` (the default, and
/// the only implementation the crate's own code needs).
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: tracing::Level, msg: &str) {
        match level {
            tracing::Level::ERROR => tracing::error!("{msg}"),
            tracing::Level::WARN => tracing::warn!("{msg}"),
            tracing::Level::INFO => tracing::info!("{msg}"),
            tracing::Level::DEBUG => tracing::debug!("{msg}"),
            tracing::Level::TRACE => tracing::trace!("{msg}"),
        }
    }
}

/// Fixed in-memory corpus, handed out one object at a time via an atomic
/// cursor so multiple worker threads can share one `ObjectStore` safely.
pub struct InMemoryObjectStore {
    objects: Vec<ObjectRecord>,
    cursor: AtomicU64,
}

impl InMemoryObjectStore {
    pub fn new(objects: Vec<ObjectRecord>) -> Self {
        InMemoryObjectStore {
            objects,
            cursor: AtomicU64::new(0),
        }
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn next(&self) -> Result<NextObject, EngineError> {
        let idx = self.cursor.fetch_add(1, Ordering::Relaxed) as usize;
        match self.objects.get(idx) {
            Some(obj) => Ok(NextObject::Object(obj.clone())),
            None => Ok(NextObject::EndOfStream),
        }
    }
}

/// `BlobStore` fixture that always reports `collaborator_unavailable` -
/// filter code isn't loaded out of blobs in this harness (spec §1: blob
/// packaging is out of scope).
#[derive(Debug, Default, Clone, Copy)]
pub struct NullBlobStore;

impl BlobStore for NullBlobStore {
    fn get(&self, signature: u64) -> Result<Vec<u8>, EngineError> {
        Err(EngineError::CollaboratorUnavailable {
            collaborator: "blob_store".into(),
            attempts: 0,
            message: format!("no blob store configured for signature {signature}"),
        })
    }
}

/// `FilterRuntime` fixture driven by per-filter-name closures, for tests and
/// the CLI demo harness.
pub struct ClosureFilterRuntime {
    evaluators: HashMap<String, Box<dyn Fn(&ObjectRecord) -> Result<(i32, HashMap<String, Vec<u8>>), EngineError> + Send + Sync>>,
}

impl ClosureFilterRuntime {
    pub fn new() -> Self {
        ClosureFilterRuntime {
            evaluators: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        filter_name: impl Into<String>,
        eval: impl Fn(&ObjectRecord) -> Result<(i32, HashMap<String, Vec<u8>>), EngineError> + Send + Sync + 'static,
    ) {
        self.evaluators.insert(filter_name.into(), Box::new(eval));
    }
}

impl Default for ClosureFilterRuntime {
    fn default() -> Self {
        ClosureFilterRuntime::new()
    }
}

impl FilterRuntime for ClosureFilterRuntime {
    fn eval(&self, filter: &Filter, object: &ObjectRecord) -> Result<(i32, HashMap<String, Vec<u8>>), EngineError> {
        match self.evaluators.get(&filter.name) {
            Some(f) => f(object),
            None => Err(EngineError::FilterEvalError {
                filter: filter.name.clone(),
                object_id: object.id,
                message: "no evaluator registered".to_string(),
            }),
        }
    }
}

/// `ResultSink` fixture that collects emitted objects, readable either by
/// draining the channel or by snapshotting the internal buffer.
pub struct InMemoryResultSink {
    sender: Sender<ObjectRecord>,
    receiver: Receiver<ObjectRecord>,
    seen: Mutex<Vec<ObjectId>>,
}

impl InMemoryResultSink {
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        InMemoryResultSink {
            sender,
            receiver,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn receiver(&self) -> Receiver<ObjectRecord> {
        self.receiver.clone()
    }

    pub fn emitted_ids(&self) -> Vec<ObjectId> {
        self.seen.lock().unwrap().clone()
    }
}

impl Default for InMemoryResultSink {
    fn default() -> Self {
        InMemoryResultSink::new()
    }
}

impl ResultSink for InMemoryResultSink {
    fn emit(&self, object: ObjectRecord) {
        self.seen.lock().unwrap().push(object.id);
        let _ = self.sender.send(object);
    }
}
