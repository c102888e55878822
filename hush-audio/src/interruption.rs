//! Interruption coordinator
//!
//! Tracks whether output is suspended by the host (call, alarm, device
//! unplugged) and pauses or restores the render graph accordingly. Never
//! fails; anything odd is logged.

use crate::fade::FadeScheduler;
use crate::graph::MixGraph;
use std::time::Instant;
use tracing::{debug, info};

/// Why output is paused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseReason {
    /// Host interruption (incoming call, alarm)
    Interruption,
    /// Output device went away
    RouteChange,
}

/// Output state as seen by the interruption coordinator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptionState {
    #[default]
    Active,
    Interrupted(PauseReason),
}

impl InterruptionState {
    pub fn is_interrupted(self) -> bool {
        matches!(self, InterruptionState::Interrupted(_))
    }
}

/// Audio route change notifications from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteChange {
    /// Current device vanished (headphones unplugged)
    OldDeviceUnavailable,
    /// A new device appeared
    NewDeviceAvailable,
    Other,
}

#[derive(Debug, Default)]
pub struct InterruptionCoordinator {
    state: InterruptionState,
}

impl InterruptionCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> InterruptionState {
        self.state
    }

    /// Pause every voice and freeze fade clocks
    ///
    /// Returns false if output was already paused.
    pub fn began(
        &mut self,
        reason: PauseReason,
        graph: &mut MixGraph,
        fades: &mut FadeScheduler,
        now: Instant,
    ) -> bool {
        if self.state.is_interrupted() {
            debug!(?reason, "already interrupted");
            return false;
        }
        graph.pause_all();
        fades.suspend(now);
        self.state = InterruptionState::Interrupted(reason);
        info!(?reason, "output interrupted");
        true
    }

    /// Host reports the interruption is over
    ///
    /// Output restarts only when the host says it may; otherwise it waits
    /// for an explicit `resume`.
    pub fn ended(
        &mut self,
        should_resume: bool,
        graph: &mut MixGraph,
        fades: &mut FadeScheduler,
        master: f32,
        now: Instant,
    ) -> bool {
        if !self.state.is_interrupted() {
            debug!("interruption ended while active");
            return false;
        }
        if !should_resume {
            info!("interruption ended; waiting for user to resume");
            return false;
        }
        self.resume(graph, fades, master, now)
    }

    /// Restart output unconditionally (user action)
    pub fn resume(
        &mut self,
        graph: &mut MixGraph,
        fades: &mut FadeScheduler,
        master: f32,
        now: Instant,
    ) -> bool {
        if !self.state.is_interrupted() {
            return false;
        }
        graph.set_master(master);
        graph.resume_all();
        fades.resume(now);
        self.state = InterruptionState::Active;
        info!("output resumed");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::AudioBuffer;
    use crate::channel::ChannelHandle;
    use crossbeam_channel::bounded;
    use std::sync::Arc;
    use std::time::Duration;

    fn setup() -> (MixGraph, FadeScheduler, ChannelHandle) {
        let (tx, _rx) = bounded(16);
        let mut graph = MixGraph::new(48000, 2, tx);
        let handle = ChannelHandle::new(1);
        graph.attach(handle, Arc::new(AudioBuffer::new(vec![0.1; 64], 48000, 2)), 1.0);
        (graph, FadeScheduler::new(Duration::from_millis(50)), handle)
    }

    #[test]
    fn test_began_pauses_and_suspends() {
        let (mut graph, mut fades, handle) = setup();
        let mut coordinator = InterruptionCoordinator::new();
        let now = Instant::now();

        assert!(coordinator.began(PauseReason::Interruption, &mut graph, &mut fades, now));
        assert_eq!(
            coordinator.state(),
            InterruptionState::Interrupted(PauseReason::Interruption)
        );
        assert_eq!(graph.is_paused(handle), Some(true));
        assert!(fades.is_suspended());

        // Second begin is a no-op
        assert!(!coordinator.began(PauseReason::RouteChange, &mut graph, &mut fades, now));
    }

    #[test]
    fn test_ended_without_resume_stays_paused() {
        let (mut graph, mut fades, handle) = setup();
        let mut coordinator = InterruptionCoordinator::new();
        let now = Instant::now();

        coordinator.began(PauseReason::Interruption, &mut graph, &mut fades, now);
        assert!(!coordinator.ended(false, &mut graph, &mut fades, 1.0, now));
        assert!(coordinator.state().is_interrupted());
        assert_eq!(graph.is_paused(handle), Some(true));

        assert!(coordinator.resume(&mut graph, &mut fades, 0.6, now));
        assert_eq!(coordinator.state(), InterruptionState::Active);
        assert_eq!(graph.is_paused(handle), Some(false));
        assert_eq!(graph.master(), 0.6);
        assert!(!fades.is_suspended());
    }

    #[test]
    fn test_ended_while_active_is_ignored() {
        let (mut graph, mut fades, _) = setup();
        let mut coordinator = InterruptionCoordinator::new();
        assert!(!coordinator.ended(true, &mut graph, &mut fades, 1.0, Instant::now()));
        assert_eq!(coordinator.state(), InterruptionState::Active);
    }
}
