//! Seek, playback-rate, trick-mode and volume arithmetic.
//!
//! Everything here is computed from the session plus one command. Engine
//! refusals never mutate the session: the rate and trick mode are committed
//! only after the engine accepted the seek that carries them.

use std::time::Duration;

use log::{debug, warn};

use crate::engine::{MediaEngine, SeekFlags, SeekRequest};
use crate::session::PlaybackSession;

/// Number of volume steps per unity gain.
pub const VOLUME_STEPS: f64 = 20.0;
/// One remote volume step.
pub const VOLUME_STEP: f64 = 1.0 / VOLUME_STEPS;
pub const MAX_VOLUME: f64 = 10.0;

/// Relative seek applied by the `SeekRight` signal.
pub const SEEK_RIGHT_FRACTION: f64 = 0.08;
/// Relative seek applied by the `SeekLeft` signal. Forward, like `SeekRight`.
pub const SEEK_LEFT_FRACTION: f64 = 0.08;

/// Smallest relative seek step; smaller steps are rounded up to this.
pub const MIN_RELATIVE_SEEK_STEP: Duration = Duration::from_secs(1);

const NANOS_PER_SECOND: i128 = 1_000_000_000;

/// Seek-flag combinations controlling fast playback fidelity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrickMode {
    #[default]
    None,
    Default,
    DefaultNoAudio,
    KeyUnits,
    KeyUnitsNoAudio,
}

impl TrickMode {
    /// Cycle order.
    pub const ALL: [TrickMode; 5] = [
        TrickMode::None,
        TrickMode::Default,
        TrickMode::DefaultNoAudio,
        TrickMode::KeyUnits,
        TrickMode::KeyUnitsNoAudio,
    ];

    /// Successor in the cycle; wraps from `KeyUnitsNoAudio` straight to `None`.
    pub fn next(self) -> TrickMode {
        let index = Self::ALL
            .iter()
            .position(|mode| *mode == self)
            .unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }

    pub fn description(self) -> &'static str {
        match self {
            TrickMode::None => "normal playback, trick modes disabled",
            TrickMode::Default => "trick mode: default",
            TrickMode::DefaultNoAudio => "trick mode: default, no audio",
            TrickMode::KeyUnits => "trick mode: key frames only",
            TrickMode::KeyUnitsNoAudio => "trick mode: key frames only, no audio",
        }
    }

    /// Mode-specific flags, without the flush/accurate base.
    pub fn seek_flags(self) -> SeekFlags {
        match self {
            TrickMode::None => SeekFlags::NONE,
            TrickMode::Default => SeekFlags::TRICKMODE,
            TrickMode::DefaultNoAudio => SeekFlags::TRICKMODE | SeekFlags::TRICKMODE_NO_AUDIO,
            TrickMode::KeyUnits => SeekFlags::TRICKMODE_KEY_UNITS,
            TrickMode::KeyUnitsNoAudio => {
                SeekFlags::TRICKMODE_KEY_UNITS | SeekFlags::TRICKMODE_NO_AUDIO
            }
        }
    }
}

/// Rounds onto the `1/VOLUME_STEPS` grid and clamps into `[0, MAX_VOLUME]`.
pub fn quantize_volume(volume: f64) -> f64 {
    ((volume * VOLUME_STEPS).round() / VOLUME_STEPS).clamp(0.0, MAX_VOLUME)
}

pub fn format_volume(volume: f64) -> String {
    format!("Volume: {:.0}%", volume * 100.0)
}

/// Adds `step` to the cubic volume and writes back the quantized result.
pub fn set_volume_relative(
    session: &PlaybackSession,
    engine: &mut dyn MediaEngine,
    step: f64,
) -> f64 {
    let volume = quantize_volume(engine.volume() + step);
    engine.set_volume(volume);

    session
        .console()
        .print(&format!("{}                  \n", format_volume(volume)));
    volume
}

/// Flips the mute switch; returns the new state.
pub fn toggle_mute(session: &PlaybackSession, engine: &mut dyn MediaEngine) -> bool {
    let muted = !engine.is_muted();
    engine.set_muted(muted);

    let label = if muted { "Mute: on" } else { "Mute: off" };
    session
        .console()
        .print(&format!("{}                  \n", label));
    muted
}

/// Builds the seek for `position`; negative rates play backwards from it.
pub fn build_seek_request(position: Duration, rate: f64, mode: TrickMode) -> SeekRequest {
    let flags = SeekFlags::FLUSH | mode.seek_flags() | SeekFlags::ACCURATE;
    if rate >= 0.0 {
        SeekRequest {
            rate,
            flags,
            start: position,
            stop: None,
        }
    } else {
        SeekRequest {
            rate,
            flags,
            start: Duration::ZERO,
            stop: Some(position),
        }
    }
}

/// Seeks and, on success, commits `rate` and `mode` into the session.
pub fn seek_absolute(
    session: &mut PlaybackSession,
    engine: &mut dyn MediaEngine,
    position: Duration,
    rate: f64,
    mode: TrickMode,
) -> bool {
    if rate == 0.0 || !rate.is_finite() {
        warn!("Seek: refusing seek with playback rate {}", rate);
        return false;
    }

    let seekable = engine
        .query_seeking()
        .map(|info| info.seekable)
        .unwrap_or(false);
    if !seekable {
        debug!("Seek: media is not seekable");
        return false;
    }

    let request = build_seek_request(position, rate, mode);
    if !engine.send_seek(&request) {
        debug!("Seek: engine refused {:?}", request);
        return false;
    }

    session.commit_seek(rate, mode);
    true
}

/// Where a relative seek lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelativeTarget {
    Seek(Duration),
    /// Beyond the end of the media; skip to the next item instead.
    PastEnd,
}

/// Target of a relative seek by `fraction` of `duration`.
///
/// Steps shorter than [`MIN_RELATIVE_SEEK_STEP`] are stretched to it so small
/// nudges stay perceptible. Targets before zero clamp to zero.
pub fn relative_seek_target(position: Duration, duration: Duration, fraction: f64) -> RelativeTarget {
    let duration_ns = duration.as_nanos() as i128;
    let mut step = (duration_ns as f64 * fraction) as i128;
    let min_step = MIN_RELATIVE_SEEK_STEP.as_nanos() as i128;
    if step.abs() < min_step {
        step = if fraction < 0.0 { -min_step } else { min_step };
    }

    let target = position.as_nanos() as i128 + step;
    if target > duration_ns {
        return RelativeTarget::PastEnd;
    }

    let target = target.max(0);
    let secs = (target / NANOS_PER_SECOND) as u64;
    let nanos = (target % NANOS_PER_SECOND) as u32;
    RelativeTarget::Seek(Duration::new(secs, nanos))
}

/// Result of a relative seek.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOutcome {
    Seeked,
    Failed,
    /// Target was past the end; the next playlist item was loaded.
    Advanced,
    /// Target was past the end of the last item.
    PlaylistExhausted,
}

/// Seeks by `fraction` of the duration, keeping the current rate and mode.
pub fn seek_relative(
    session: &mut PlaybackSession,
    engine: &mut dyn MediaEngine,
    fraction: f64,
) -> SeekOutcome {
    if !(-1.0..=1.0).contains(&fraction) {
        warn!("Seek: relative fraction {} outside [-1, 1]", fraction);
        return SeekOutcome::Failed;
    }

    let target = engine.query_position().and_then(|position| {
        let info = engine.query_seeking()?;
        let duration = info.duration.filter(|duration| !duration.is_zero())?;
        info.seekable
            .then(|| relative_seek_target(position, duration, fraction))
    });

    let outcome = match target {
        None => SeekOutcome::Failed,
        Some(RelativeTarget::PastEnd) => {
            if session.advance(engine) {
                SeekOutcome::Advanced
            } else {
                SeekOutcome::PlaylistExhausted
            }
        }
        Some(RelativeTarget::Seek(position)) => {
            let (rate, mode) = (session.rate(), session.trick_mode());
            if seek_absolute(session, engine, position, rate, mode) {
                SeekOutcome::Seeked
            } else {
                SeekOutcome::Failed
            }
        }
    };

    if outcome == SeekOutcome::Failed {
        session.console().print("\nCould not seek.\n");
    }
    outcome
}

/// Re-seeks at the current position with `rate` and the current trick mode.
pub fn set_playback_rate(
    session: &mut PlaybackSession,
    engine: &mut dyn MediaEngine,
    rate: f64,
) -> bool {
    let mode = session.trick_mode();
    let applied = match engine.query_position() {
        Some(position) => seek_absolute(session, engine, position, rate, mode),
        None => false,
    };

    if applied {
        session.console().print(&format!(
            "Playback rate: {:.2}                               \n",
            rate
        ));
    } else {
        session.console().print(&format!(
            "\nCould not change playback rate to {:.2}.\n",
            rate
        ));
    }
    applied
}

/// `rate + delta`, negated when `reverse_direction` is set.
pub fn change_rate_relative(
    session: &mut PlaybackSession,
    engine: &mut dyn MediaEngine,
    delta: f64,
    reverse_direction: bool,
) -> bool {
    let mut new_rate = session.rate() + delta;
    if reverse_direction {
        new_rate = -new_rate;
    }
    set_playback_rate(session, engine, new_rate)
}

/// A tiered rate adjustment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateStep {
    pub delta: f64,
    pub reverse_direction: bool,
}

impl RateStep {
    fn flip() -> Self {
        Self {
            delta: 0.0,
            reverse_direction: true,
        }
    }

    fn by(delta: f64) -> Self {
        Self {
            delta,
            reverse_direction: false,
        }
    }
}

/// Step for `IncreasePlaybackRate`: slow reverse flips to forward first.
pub fn increase_rate_step(rate: f64) -> RateStep {
    if rate > -0.2 && rate < 0.0 {
        RateStep::flip()
    } else if rate.abs() < 2.0 {
        RateStep::by(0.1)
    } else if rate.abs() < 4.0 {
        RateStep::by(0.5)
    } else {
        RateStep::by(1.0)
    }
}

/// Step for `DecreasePlaybackRate`: slow forward flips to reverse first.
pub fn decrease_rate_step(rate: f64) -> RateStep {
    if rate > 0.0 && rate < 0.2 {
        RateStep::flip()
    } else if rate.abs() <= 2.0 {
        RateStep::by(-0.1)
    } else if rate.abs() <= 4.0 {
        RateStep::by(-0.5)
    } else {
        RateStep::by(-1.0)
    }
}

/// Moves to the next trick mode and re-seeks at the current position.
pub fn cycle_trick_mode(session: &mut PlaybackSession, engine: &mut dyn MediaEngine) -> bool {
    let new_mode = session.trick_mode().next();
    let rate = session.rate();

    let applied = match engine.query_position() {
        Some(position) => seek_absolute(session, engine, position, rate, new_mode),
        None => false,
    };

    if applied {
        session.console().print(&format!(
            "Rate: {:.2} ({})                      \n",
            session.rate(),
            new_mode.description()
        ));
    } else {
        session.console().print(&format!(
            "\nCould not change trick mode to {}.\n",
            new_mode.description()
        ));
    }
    applied
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::FakeEngine;
    use crate::session::SessionOptions;
    use crate::status::Console;

    fn session() -> PlaybackSession {
        PlaybackSession::new(
            vec!["a.mp4".to_string(), "b.mp4".to_string()],
            SessionOptions::default(),
            Console::capturing(),
        )
    }

    #[test]
    fn test_volume_step_down_from_unity_lands_on_grid() {
        let session = session();
        let mut engine = FakeEngine::new();
        let volume = set_volume_relative(&session, &mut engine, -VOLUME_STEP);
        assert_eq!(volume, 0.95);
        assert_eq!(engine.volume, 0.95);
        assert!(session.console().captured().contains("Volume: 95%"));
    }

    #[test]
    fn test_volume_quantization_is_idempotent_and_clamped() {
        for raw in [0.0, 0.33, 0.951, 1.0, 2.024, 9.99] {
            let once = quantize_volume(raw);
            assert_eq!(quantize_volume(once), once);
            assert!((once * VOLUME_STEPS - (once * VOLUME_STEPS).round()).abs() < 1e-9);
        }
        assert_eq!(quantize_volume(-3.0), 0.0);
        assert_eq!(quantize_volume(42.0), MAX_VOLUME);
    }

    #[test]
    fn test_zero_volume_step_keeps_displayed_percentage() {
        let session = session();
        let mut engine = FakeEngine::new();
        engine.volume = 0.35;
        let volume = set_volume_relative(&session, &mut engine, 0.0);
        assert_eq!(format_volume(volume), "Volume: 35%");
    }

    #[test]
    fn test_toggle_mute_flips_engine_state() {
        let session = session();
        let mut engine = FakeEngine::new();
        assert!(toggle_mute(&session, &mut engine));
        assert!(!toggle_mute(&session, &mut engine));
        assert!(session.console().captured().contains("Mute: on"));
        assert!(session.console().captured().contains("Mute: off"));
    }

    #[test]
    fn test_seek_flags_follow_trick_mode_table() {
        let base = SeekFlags::FLUSH | SeekFlags::ACCURATE;
        let flags = |mode| build_seek_request(Duration::ZERO, 1.0, mode).flags;
        assert_eq!(flags(TrickMode::None), base);
        assert_eq!(flags(TrickMode::Default), base | SeekFlags::TRICKMODE);
        assert_eq!(
            flags(TrickMode::DefaultNoAudio),
            base | SeekFlags::TRICKMODE | SeekFlags::TRICKMODE_NO_AUDIO
        );
        assert_eq!(
            flags(TrickMode::KeyUnits),
            base | SeekFlags::TRICKMODE_KEY_UNITS
        );
        assert_eq!(
            flags(TrickMode::KeyUnitsNoAudio),
            base | SeekFlags::TRICKMODE_KEY_UNITS | SeekFlags::TRICKMODE_NO_AUDIO
        );
    }

    #[test]
    fn test_reverse_rate_seeks_from_start_to_position() {
        let position = Duration::from_secs(42);
        let forward = build_seek_request(position, 1.5, TrickMode::None);
        assert_eq!((forward.start, forward.stop), (position, None));

        let reverse = build_seek_request(position, -1.0, TrickMode::None);
        assert_eq!((reverse.start, reverse.stop), (Duration::ZERO, Some(position)));
    }

    #[test]
    fn test_seek_absolute_commits_rate_and_mode_only_on_success() {
        let mut session = session();
        let mut engine = FakeEngine::new();
        assert!(seek_absolute(
            &mut session,
            &mut engine,
            Duration::from_secs(5),
            2.0,
            TrickMode::KeyUnits
        ));
        assert_eq!(session.rate(), 2.0);
        assert_eq!(session.trick_mode(), TrickMode::KeyUnits);

        engine.accept_seeks = false;
        assert!(!seek_absolute(
            &mut session,
            &mut engine,
            Duration::from_secs(5),
            4.0,
            TrickMode::Default
        ));
        assert_eq!(session.rate(), 2.0);
        assert_eq!(session.trick_mode(), TrickMode::KeyUnits);
    }

    #[test]
    fn test_seek_absolute_fails_without_engine_call_when_unseekable() {
        let mut session = session();
        let mut engine = FakeEngine::unseekable();
        assert!(!seek_absolute(
            &mut session,
            &mut engine,
            Duration::ZERO,
            1.0,
            TrickMode::None
        ));
        assert!(engine.seeks().is_empty());
    }

    #[test]
    fn test_relative_target_stretches_tiny_steps_to_one_second() {
        let duration = Duration::from_secs(10);
        assert_eq!(
            relative_seek_target(Duration::from_secs(5), duration, 0.01),
            RelativeTarget::Seek(Duration::from_secs(6))
        );
        assert_eq!(
            relative_seek_target(Duration::from_secs(5), duration, -0.01),
            RelativeTarget::Seek(Duration::from_secs(4))
        );
        assert_eq!(
            relative_seek_target(Duration::from_secs(5), duration, 0.0),
            RelativeTarget::Seek(Duration::from_secs(6))
        );
    }

    #[test]
    fn test_relative_target_stays_within_media_or_reports_past_end() {
        let duration = Duration::from_secs(100);
        for position_secs in [0u64, 1, 50, 99, 100] {
            for step in -10..=10 {
                let fraction = f64::from(step) / 10.0;
                match relative_seek_target(Duration::from_secs(position_secs), duration, fraction)
                {
                    RelativeTarget::Seek(target) => assert!(target <= duration),
                    RelativeTarget::PastEnd => assert!(fraction > 0.0 || position_secs == 100),
                }
            }
        }
        assert_eq!(
            relative_seek_target(Duration::from_secs(3), duration, -1.0),
            RelativeTarget::Seek(Duration::ZERO)
        );
    }

    #[test]
    fn test_seek_relative_on_unseekable_stream_reports_could_not_seek() {
        let mut session = session();
        let mut engine = FakeEngine::unseekable();
        assert_eq!(
            seek_relative(&mut session, &mut engine, -1.0),
            SeekOutcome::Failed
        );
        assert_eq!(session.rate(), 1.0);
        assert_eq!(session.cursor(), -1);
        assert!(engine.seeks().is_empty());
        assert!(session.console().captured().contains("Could not seek."));
    }

    #[test]
    fn test_seek_relative_past_end_advances_then_exhausts() {
        let mut session = session();
        let mut engine = FakeEngine::new();
        engine.position = Some(Duration::from_secs(95));
        session.advance(&mut engine);

        assert_eq!(
            seek_relative(&mut session, &mut engine, SEEK_RIGHT_FRACTION),
            SeekOutcome::Advanced
        );
        assert_eq!(session.cursor(), 1);
        assert_eq!(
            seek_relative(&mut session, &mut engine, SEEK_LEFT_FRACTION),
            SeekOutcome::PlaylistExhausted
        );
        assert_eq!(session.cursor(), 1);
    }

    #[test]
    fn test_seek_relative_keeps_rate_and_trick_mode() {
        let mut session = session();
        let mut engine = FakeEngine::new();
        assert!(seek_absolute(
            &mut session,
            &mut engine,
            Duration::ZERO,
            -2.0,
            TrickMode::Default
        ));
        engine.clear_calls();

        assert_eq!(
            seek_relative(&mut session, &mut engine, -0.05),
            SeekOutcome::Seeked
        );
        let seek = engine.seeks()[0];
        assert_eq!(seek.rate, -2.0);
        assert_eq!(seek.stop, Some(Duration::from_secs(5)));
        assert!(seek.flags.contains(SeekFlags::TRICKMODE));
    }

    #[test]
    fn test_change_rate_relative_requeries_position_and_reverses() {
        let mut session = session();
        let mut engine = FakeEngine::new();
        assert!(change_rate_relative(&mut session, &mut engine, 0.0, true));
        assert_eq!(session.rate(), -1.0);

        engine.position = None;
        assert!(!change_rate_relative(&mut session, &mut engine, 0.5, false));
        assert_eq!(session.rate(), -1.0);
        assert!(session
            .console()
            .captured()
            .contains("Could not change playback rate to -0.50."));
    }

    #[test]
    fn test_rate_change_to_zero_is_rejected() {
        let mut session = session();
        let mut engine = FakeEngine::new();
        assert!(!change_rate_relative(&mut session, &mut engine, -1.0, false));
        assert_eq!(session.rate(), 1.0);
        assert!(engine.seeks().is_empty());
    }

    #[test]
    fn test_rate_step_tiers() {
        assert_eq!(increase_rate_step(-0.1), RateStep::flip());
        assert_eq!(increase_rate_step(1.0), RateStep::by(0.1));
        assert_eq!(increase_rate_step(-3.0), RateStep::by(0.5));
        assert_eq!(increase_rate_step(8.0), RateStep::by(1.0));

        assert_eq!(decrease_rate_step(0.1), RateStep::flip());
        assert_eq!(decrease_rate_step(2.0), RateStep::by(-0.1));
        assert_eq!(decrease_rate_step(4.0), RateStep::by(-0.5));
        assert_eq!(decrease_rate_step(-6.0), RateStep::by(-1.0));
    }

    #[test]
    fn test_trick_mode_cycle_returns_to_normal_after_five_steps() {
        let mut session = session();
        let mut engine = FakeEngine::new();
        let start = session.trick_mode();
        for _ in 0..TrickMode::ALL.len() {
            assert!(cycle_trick_mode(&mut session, &mut engine));
        }
        assert_eq!(session.trick_mode(), start);
        assert_eq!(
            session.trick_mode().description(),
            TrickMode::None.description()
        );
        assert_eq!(engine.seeks().len(), 5);
    }

    #[test]
    fn test_trick_mode_cycle_failure_leaves_mode_unchanged() {
        let mut session = session();
        let mut engine = FakeEngine::unseekable();
        assert!(!cycle_trick_mode(&mut session, &mut engine));
        assert_eq!(session.trick_mode(), TrickMode::None);
        assert!(session
            .console()
            .captured()
            .contains("Could not change trick mode to trick mode: default."));
    }
}
