//! Off-thread sound decoding
//!
//! Decoding an asset can take seconds. Each cache miss is decoded on a
//! short-lived worker thread and the result is posted back to the control
//! path, which parks the requesting call until every buffer it asked for has
//! arrived. Fades and render completions keep running in the meantime.

use crate::buffer::{AssetLoader, SharedBuffer};
use crate::engine::MixingEngine;
use crate::error::{EngineError, LoadError};
use crossbeam_channel::{unbounded, Receiver, Sender};
use std::collections::HashMap;
use std::path::PathBuf;
use std::thread;
use tracing::{debug, error};

/// Buffers gathered for one call, keyed by sound name
pub type LoadedBuffers = HashMap<String, Result<SharedBuffer, EngineError>>;

/// Work to run once a request's buffers are all in
pub(crate) type Continuation = Box<dyn FnOnce(&mut MixingEngine, &LoadedBuffers) + Send>;

/// A worker finished decoding one sound
#[derive(Debug)]
pub struct LoadCompleted {
    request: u64,
    name: String,
    result: Result<SharedBuffer, LoadError>,
}

impl LoadCompleted {
    pub fn sound_name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_parts(self) -> (u64, String, Result<SharedBuffer, LoadError>) {
        (self.request, self.name, self.result)
    }
}

struct PendingRequest {
    loaded: LoadedBuffers,
    outstanding: usize,
    then: Continuation,
}

/// Requests waiting on worker decodes
pub(crate) struct LoadQueue {
    next_request: u64,
    pending: HashMap<u64, PendingRequest>,
    tx: Sender<LoadCompleted>,
    rx: Receiver<LoadCompleted>,
}

impl LoadQueue {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self {
            next_request: 1,
            pending: HashMap::new(),
            tx,
            rx,
        }
    }

    pub fn next_request(&mut self) -> u64 {
        let id = self.next_request;
        self.next_request += 1;
        id
    }

    pub fn receiver(&self) -> Receiver<LoadCompleted> {
        self.rx.clone()
    }

    /// Decode `name` on a worker thread; false if no thread could be started
    pub fn spawn_decode(&self, request: u64, name: &str, location: PathBuf, loader: AssetLoader) -> bool {
        let tx = self.tx.clone();
        let name = name.to_string();
        let spawned = thread::Builder::new()
            .name("hush-decode".into())
            .spawn(move || {
                let result = loader.decode(&name, &location);
                // Receiver gone means the engine shut down
                let _ = tx.send(LoadCompleted { request, name, result });
            });
        match spawned {
            Ok(_) => true,
            Err(e) => {
                error!(error = %e, "failed to start decode worker");
                false
            }
        }
    }

    pub fn park(&mut self, request: u64, loaded: LoadedBuffers, outstanding: usize, then: Continuation) {
        debug!(request, outstanding, "waiting on decodes");
        self.pending.insert(
            request,
            PendingRequest {
                loaded,
                outstanding,
                then,
            },
        );
    }

    /// Record one arrival; hands back the continuation once nothing is outstanding
    pub fn complete(
        &mut self,
        request: u64,
        name: String,
        result: Result<SharedBuffer, EngineError>,
    ) -> Option<(Continuation, LoadedBuffers)> {
        let pending = self.pending.get_mut(&request)?;
        pending.loaded.insert(name, result);
        pending.outstanding = pending.outstanding.saturating_sub(1);
        if pending.outstanding > 0 {
            return None;
        }
        self.pending
            .remove(&request)
            .map(|done| (done.then, done.loaded))
    }

    /// Requests still waiting on at least one decode
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}
