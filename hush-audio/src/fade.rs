//! Fade scheduler - time-based linear gain ramps
//!
//! All fades share one tick. Each tick recomputes every task's gain from its
//! start time (no accumulated error) and snaps the final value to the exact
//! target. At most one task exists per channel; a new fade replaces the old one.

use crate::channel::{Channel, ChannelHandle, ChannelRegistry, ChannelState};
use std::time::{Duration, Instant};
use tracing::debug;

/// What the engine does when a fade reaches its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeAction {
    /// Keep the channel; report completion
    Notify,
    /// Remove the channel once silent
    Remove,
}

/// A linear gain ramp on one channel
#[derive(Debug, Clone)]
pub struct FadeTask {
    channel: ChannelHandle,
    start_gain: f32,
    target_gain: f32,
    duration: Duration,
    started_at: Instant,
    on_complete: FadeAction,
}

impl FadeTask {
    pub fn channel(&self) -> ChannelHandle {
        self.channel
    }

    pub fn start_gain(&self) -> f32 {
        self.start_gain
    }

    pub fn target_gain(&self) -> f32 {
        self.target_gain
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn on_complete(&self) -> FadeAction {
        self.on_complete
    }

    /// Fraction of the fade elapsed at `now`, in [0, 1]
    pub fn progress(&self, now: Instant) -> f32 {
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).clamp(0.0, 1.0) as f32
    }

    /// Gain at `now`; exactly the target once complete
    pub fn gain_at(&self, now: Instant) -> f32 {
        let progress = self.progress(now);
        if progress >= 1.0 {
            self.target_gain
        } else {
            self.start_gain + (self.target_gain - self.start_gain) * progress
        }
    }
}

/// A fade that reached its target on this tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompletedFade {
    pub channel: ChannelHandle,
    pub action: FadeAction,
}

/// Result of advancing the scheduler
#[derive(Debug, Default)]
pub struct FadeTick {
    /// Channels whose gain changed, with the new gain
    pub updated: Vec<(ChannelHandle, f32)>,
    /// Fades that finished and were removed
    pub completed: Vec<CompletedFade>,
}

/// Owns the live fade tasks; single writer of faded channel gains
pub struct FadeScheduler {
    tasks: Vec<FadeTask>,
    interval: Duration,
    suspended_at: Option<Instant>,
}

impl FadeScheduler {
    pub fn new(interval: Duration) -> Self {
        Self {
            tasks: Vec::new(),
            interval,
            suspended_at: None,
        }
    }

    /// Tick interval
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Start a fade from the channel's current gain, replacing any live fade
    ///
    /// Returns true if an earlier fade on the channel was cancelled. The
    /// duration must be non-zero; zero-length fades are applied directly by
    /// the caller.
    pub fn start_fade(
        &mut self,
        channel: &mut Channel,
        target_gain: f32,
        duration: Duration,
        now: Instant,
        on_complete: FadeAction,
    ) -> bool {
        debug_assert!(!duration.is_zero());
        let replaced = self.cancel_fade(channel.handle());

        // While suspended, the ramp starts counting only from resume
        let started_at = self.suspended_at.unwrap_or(now);
        let target_gain = crate::channel::clamp_gain(target_gain);
        self.tasks.push(FadeTask {
            channel: channel.handle(),
            start_gain: channel.gain(),
            target_gain,
            duration,
            started_at,
            on_complete,
        });
        channel.set_state(match on_complete {
            FadeAction::Notify => ChannelState::Fading,
            FadeAction::Remove => ChannelState::Stopping,
        });
        debug!(
            channel = %channel.handle(),
            from = channel.gain(),
            to = target_gain,
            ms = duration.as_millis() as u64,
            "fade started"
        );
        replaced
    }

    /// Drop the channel's fade, leaving its gain where it is
    pub fn cancel_fade(&mut self, channel: ChannelHandle) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.channel != channel);
        let cancelled = self.tasks.len() != before;
        if cancelled {
            debug!(channel = %channel, "fade cancelled");
        }
        cancelled
    }

    /// Drop every fade
    pub fn cancel_all(&mut self) -> usize {
        let count = self.tasks.len();
        self.tasks.clear();
        count
    }

    pub fn task(&self, channel: ChannelHandle) -> Option<&FadeTask> {
        self.tasks.iter().find(|t| t.channel == channel)
    }

    pub fn is_fading(&self, channel: ChannelHandle) -> bool {
        self.task(channel).is_some()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Whether the tick timer should be running
    pub fn needs_tick(&self) -> bool {
        !self.tasks.is_empty() && self.suspended_at.is_none()
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended_at.is_some()
    }

    /// Freeze every fade clock
    pub fn suspend(&mut self, now: Instant) {
        if self.suspended_at.is_none() {
            self.suspended_at = Some(now);
        }
    }

    /// Unfreeze fade clocks, shifting each task by the suspended span
    pub fn resume(&mut self, now: Instant) {
        if let Some(since) = self.suspended_at.take() {
            let paused_for = now.saturating_duration_since(since);
            for task in &mut self.tasks {
                task.started_at += paused_for;
            }
        }
    }

    /// Advance every fade to `now`, writing gains into the registry
    pub fn tick(&mut self, now: Instant, registry: &mut ChannelRegistry) -> FadeTick {
        let mut result = FadeTick::default();
        if self.suspended_at.is_some() {
            return result;
        }

        self.tasks.retain(|task| {
            let Some(channel) = registry.get_mut(task.channel) else {
                // Channel went away underneath the fade
                return false;
            };

            let gain = task.gain_at(now);
            channel.set_gain(gain);
            result.updated.push((task.channel, channel.gain()));

            if task.progress(now) >= 1.0 {
                if task.on_complete == FadeAction::Notify {
                    channel.set_state(ChannelState::Playing);
                }
                result.completed.push(CompletedFade {
                    channel: task.channel,
                    action: task.on_complete,
                });
                false
            } else {
                true
            }
        });

        for done in &result.completed {
            debug!(channel = %done.channel, "fade completed");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::AudioBuffer;
    use crate::graph::MixGraph;
    use crossbeam_channel::bounded;
    use std::sync::Arc;

    fn setup(gain: f32) -> (ChannelRegistry, ChannelHandle) {
        let (tx, _rx) = bounded(16);
        let graph = MixGraph::new(48000, 2, tx).into_shared();
        let mut registry = ChannelRegistry::new(5, graph);
        let buffer = Arc::new(AudioBuffer::new(vec![0.1; 64], 48000, 2));
        let handle = registry.create("rain", buffer, gain, true).unwrap();
        (registry, handle)
    }

    fn secs(s: f64) -> Duration {
        Duration::from_secs_f64(s)
    }

    #[test]
    fn test_linear_ramp_and_exact_snap() {
        let (mut registry, handle) = setup(0.0);
        let mut fades = FadeScheduler::new(Duration::from_millis(50));
        let t0 = Instant::now();

        fades.start_fade(registry.get_mut(handle).unwrap(), 1.0, secs(2.0), t0, FadeAction::Notify);

        fades.tick(t0 + secs(1.0), &mut registry);
        let mid = registry.get(handle).unwrap().gain();
        assert!((mid - 0.5).abs() < 1e-4);
        assert_eq!(registry.get(handle).unwrap().state(), ChannelState::Fading);

        let tick = fades.tick(t0 + secs(2.3), &mut registry);
        assert_eq!(registry.get(handle).unwrap().gain(), 1.0);
        assert_eq!(registry.get(handle).unwrap().state(), ChannelState::Playing);
        assert_eq!(
            tick.completed,
            vec![CompletedFade {
                channel: handle,
                action: FadeAction::Notify
            }]
        );
        assert!(fades.is_empty());
        assert!(!fades.needs_tick());
    }

    #[test]
    fn test_snap_is_exact_for_awkward_targets() {
        let (mut registry, handle) = setup(0.9);
        let mut fades = FadeScheduler::new(Duration::from_millis(50));
        let t0 = Instant::now();
        let target = 0.1 + 0.2; // not representable exactly

        fades.start_fade(registry.get_mut(handle).unwrap(), target, secs(0.7), t0, FadeAction::Notify);
        let mut t = t0;
        while !fades.is_empty() {
            t += Duration::from_millis(50);
            fades.tick(t, &mut registry);
        }

        assert_eq!(registry.get(handle).unwrap().gain(), crate::channel::clamp_gain(target));
    }

    #[test]
    fn test_new_fade_replaces_old() {
        let (mut registry, handle) = setup(0.0);
        let mut fades = FadeScheduler::new(Duration::from_millis(50));
        let t0 = Instant::now();

        fades.start_fade(registry.get_mut(handle).unwrap(), 1.0, secs(1.0), t0, FadeAction::Notify);
        fades.tick(t0 + secs(0.5), &mut registry);

        let replaced = fades.start_fade(
            registry.get_mut(handle).unwrap(),
            0.2,
            secs(1.0),
            t0 + secs(0.5),
            FadeAction::Notify,
        );
        assert!(replaced);
        assert_eq!(fades.len(), 1);

        let task = fades.task(handle).unwrap();
        assert!((task.start_gain() - 0.5).abs() < 1e-4);
        assert_eq!(task.target_gain(), 0.2);

        fades.tick(t0 + secs(2.0), &mut registry);
        assert_eq!(registry.get(handle).unwrap().gain(), 0.2);
    }

    #[test]
    fn test_cancel_keeps_gain() {
        let (mut registry, handle) = setup(1.0);
        let mut fades = FadeScheduler::new(Duration::from_millis(50));
        let t0 = Instant::now();

        fades.start_fade(registry.get_mut(handle).unwrap(), 0.0, secs(1.0), t0, FadeAction::Remove);
        assert_eq!(registry.get(handle).unwrap().state(), ChannelState::Stopping);
        fades.tick(t0 + secs(0.25), &mut registry);

        assert!(fades.cancel_fade(handle));
        assert!(!fades.cancel_fade(handle));
        fades.tick(t0 + secs(5.0), &mut registry);
        assert!((registry.get(handle).unwrap().gain() - 0.75).abs() < 1e-4);
    }

    #[test]
    fn test_suspended_clock_freezes_progress() {
        let (mut registry, handle) = setup(0.0);
        let mut fades = FadeScheduler::new(Duration::from_millis(50));
        let t0 = Instant::now();

        fades.start_fade(registry.get_mut(handle).unwrap(), 1.0, secs(2.0), t0, FadeAction::Notify);
        fades.tick(t0 + secs(1.0), &mut registry);

        fades.suspend(t0 + secs(1.0));
        assert!(!fades.needs_tick());
        let tick = fades.tick(t0 + secs(10.0), &mut registry);
        assert!(tick.updated.is_empty());

        fades.resume(t0 + secs(11.0));
        fades.tick(t0 + secs(11.5), &mut registry);
        assert!((registry.get(handle).unwrap().gain() - 0.75).abs() < 1e-4);
    }

    #[test]
    fn test_task_dropped_when_channel_removed() {
        let (mut registry, handle) = setup(1.0);
        let mut fades = FadeScheduler::new(Duration::from_millis(50));
        let t0 = Instant::now();

        fades.start_fade(registry.get_mut(handle).unwrap(), 0.0, secs(1.0), t0, FadeAction::Remove);
        registry.remove(handle);

        let tick = fades.tick(t0 + secs(2.0), &mut registry);
        assert!(tick.completed.is_empty());
        assert!(fades.is_empty());
    }

    #[test]
    fn test_gain_stays_in_range_mid_fade() {
        let (mut registry, handle) = setup(1.0);
        let mut fades = FadeScheduler::new(Duration::from_millis(50));
        let t0 = Instant::now();

        fades.start_fade(registry.get_mut(handle).unwrap(), 0.0, secs(1.0), t0, FadeAction::Notify);
        for step in 0..30 {
            fades.tick(t0 + Duration::from_millis(step * 50), &mut registry);
            let gain = registry.get(handle).unwrap().gain();
            assert!((0.0..=1.0).contains(&gain));
        }
    }
}
