//! Capability surface of the external media engine.
//!
//! The engine demuxes, decodes, clocks and renders on its own. The controller
//! only drives it through the operations below and learns about progress
//! through [`BusEvent`](crate::protocol::BusEvent)s posted on the bus.

use std::ops::BitOr;
use std::time::Duration;

use crate::protocol::{EngineState, TrackType};

/// Outcome of a state-change request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateChange {
    Success,
    /// The change completes later; a `Prerolled` notification follows.
    Async,
    /// Live source: the engine cannot preroll in the paused state.
    NoPreroll,
    /// The request failed; an error notification is expected on the bus.
    Failure,
}

/// Seek flag bitmask understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SeekFlags(u32);

impl SeekFlags {
    pub const NONE: SeekFlags = SeekFlags(0);
    pub const FLUSH: SeekFlags = SeekFlags(1 << 0);
    pub const ACCURATE: SeekFlags = SeekFlags(1 << 1);
    pub const TRICKMODE: SeekFlags = SeekFlags(1 << 2);
    pub const TRICKMODE_KEY_UNITS: SeekFlags = SeekFlags(1 << 3);
    pub const TRICKMODE_NO_AUDIO: SeekFlags = SeekFlags(1 << 4);

    pub fn contains(self, other: SeekFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for SeekFlags {
    type Output = SeekFlags;

    fn bitor(self, rhs: SeekFlags) -> SeekFlags {
        SeekFlags(self.0 | rhs.0)
    }
}

/// A fully-resolved seek to hand to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeekRequest {
    pub rate: f64,
    pub flags: SeekFlags,
    pub start: Duration,
    /// `None` plays to the end of the media.
    pub stop: Option<Duration>,
}

/// Answer to a seekability query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeekingInfo {
    pub seekable: bool,
    pub duration: Option<Duration>,
}

/// Bit in the engine's `flags` property enabling a track type.
pub fn track_flag(track_type: TrackType) -> u32 {
    match track_type {
        TrackType::Video => 0x1,
        TrackType::Audio => 0x2,
        TrackType::Subtitle => 0x4,
    }
}

/// Operations the controller needs from a playbin-style engine.
///
/// Every method is non-blocking from the caller's point of view: failures are
/// reported through return values or bus notifications, never by waiting.
pub trait MediaEngine {
    fn set_state(&mut self, state: EngineState) -> StateChange;

    /// Current (not pending) state.
    fn current_state(&self) -> EngineState;

    /// Sets the URI the engine plays next.
    fn set_uri(&mut self, uri: &str);

    fn query_position(&self) -> Option<Duration>;

    fn query_duration(&self) -> Option<Duration>;

    /// `None` when the engine could not answer the query at all.
    fn query_seeking(&self) -> Option<SeekingInfo>;

    /// Returns `false` when the engine refused the seek.
    fn send_seek(&mut self, request: &SeekRequest) -> bool;

    /// Volume on the cubic scale (1.0 = unity).
    fn volume(&self) -> f64;

    fn set_volume(&mut self, volume: f64);

    fn is_muted(&self) -> bool;

    fn set_muted(&mut self, muted: bool);

    fn recalculate_latency(&mut self);

    fn current_track(&self, track_type: TrackType) -> i32;

    fn track_count(&self, track_type: TrackType) -> i32;

    fn flags(&self) -> u32;

    fn set_flags(&mut self, flags: u32);

    fn set_current_track(&mut self, track_type: TrackType, index: i32);

    /// Language name from the tags of one track, if tagged.
    fn track_language(&self, track_type: TrackType, index: i32) -> Option<String>;

    /// Best-effort diagnostic graph dump.
    fn dump_graph(&self, _label: &str) {}

    /// Stops delivering bus notifications.
    fn release_bus(&mut self) {}
}
