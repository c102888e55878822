//! Engine notifications
//!
//! Subscribers each get their own bounded queue. Emitting never blocks: a
//! full queue drops the event with a warning, a closed one is unsubscribed.

use crate::channel::ChannelHandle;
use crate::interruption::InterruptionState;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use tracing::warn;

/// Per-subscriber queue depth
const EVENT_QUEUE_DEPTH: usize = 1024;

/// Events from the engine to the UI/app layer
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    ChannelStarted {
        handle: ChannelHandle,
        sound_name: String,
    },
    /// Channel was removed from the mix
    ChannelStopped(ChannelHandle),
    /// A fade that keeps its channel reached its target
    FadeCompleted(ChannelHandle),
    MasterVolumeChanged(f32),
    InterruptionChanged(InterruptionState),
    Error(String),
}

#[derive(Default)]
pub struct Notifier {
    subscribers: Vec<Sender<EngineEvent>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new event stream
    pub fn subscribe(&mut self) -> Receiver<EngineEvent> {
        let (tx, rx) = bounded(EVENT_QUEUE_DEPTH);
        self.subscribers.push(tx);
        rx
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    pub fn emit(&mut self, event: EngineEvent) {
        self.subscribers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(dropped)) => {
                warn!(event = ?dropped, "event queue full, dropping");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}
