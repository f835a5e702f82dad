//! Event-bus protocol shared by the control loop and its event sources.
//!
//! This module defines every payload that crosses the loop boundary: status
//! ticks, notifications posted by the media engine, and remote commands.

use std::fmt;
use std::sync::Arc;

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    /// Periodic status timer tick.
    Tick,
    /// Notification posted by the media engine.
    Bus(BusEvent),
    /// Instruction from the remote listener (or a local caller).
    Command(Command),
}

/// Engine pipeline states, ordered by lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EngineState {
    Null,
    Ready,
    Paused,
    Playing,
}

impl EngineState {
    pub fn name(self) -> &'static str {
        match self {
            EngineState::Null => "NULL",
            EngineState::Ready => "READY",
            EngineState::Paused => "PAUSED",
            EngineState::Playing => "PLAYING",
        }
    }
}

/// Selectable track categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    Audio,
    Video,
    Subtitle,
}

impl TrackType {
    pub fn name(self) -> &'static str {
        match self {
            TrackType::Audio => "audio",
            TrackType::Video => "video",
            TrackType::Subtitle => "subtitle",
        }
    }
}

/// Stream type bitmask as announced by the engine.
///
/// A stream may carry more than one bit; classification checks audio, then
/// video, then text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamType(pub u32);

impl StreamType {
    pub const UNKNOWN: StreamType = StreamType(1 << 0);
    pub const AUDIO: StreamType = StreamType(1 << 1);
    pub const VIDEO: StreamType = StreamType(1 << 2);
    pub const CONTAINER: StreamType = StreamType(1 << 3);
    pub const TEXT: StreamType = StreamType(1 << 4);

    pub fn contains(self, other: StreamType) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    /// Maps the bitmask onto a selectable track type, if any.
    pub fn track_type(self) -> Option<TrackType> {
        if self.contains(StreamType::AUDIO) {
            Some(TrackType::Audio)
        } else if self.contains(StreamType::VIDEO) {
            Some(TrackType::Video)
        } else if self.contains(StreamType::TEXT) {
            Some(TrackType::Subtitle)
        } else {
            None
        }
    }
}

/// One selectable elementary stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stream {
    /// Engine-assigned stream identifier.
    pub id: String,
    pub stream_type: StreamType,
}

impl Stream {
    pub fn new(id: impl Into<String>, stream_type: StreamType) -> Self {
        Self {
            id: id.into(),
            stream_type,
        }
    }
}

/// Immutable snapshot of the streams available for the loaded media.
///
/// Replaced wholesale whenever the engine announces a new collection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamCollection {
    pub streams: Vec<Stream>,
}

impl StreamCollection {
    pub fn new(streams: Vec<Stream>) -> Self {
        Self { streams }
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn count_of(&self, track_type: TrackType) -> usize {
        self.streams
            .iter()
            .filter(|stream| stream.stream_type.track_type() == Some(track_type))
            .count()
    }
}

/// Value attached to an engine property-change notification.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Str(String),
    /// Media capabilities, already rendered by the engine.
    Caps(String),
    /// Tag list, already rendered by the engine.
    Tags(String),
    /// Any other value in the engine's generic serialization.
    Other(String),
    None,
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Str(value)
            | PropertyValue::Caps(value)
            | PropertyValue::Tags(value)
            | PropertyValue::Other(value) => f.write_str(value),
            PropertyValue::None => f.write_str("(no value)"),
        }
    }
}

/// Asynchronous notifications from the media engine.
#[derive(Debug, Clone)]
pub enum BusEvent {
    /// Asynchronous state change (preroll) completed.
    Prerolled,
    BufferingProgress(i32),
    ClockLost,
    LatencyChanged,
    /// An element inside the engine asked for a state change.
    StateRequested {
        state: EngineState,
        requester: String,
    },
    EndOfStream,
    Warning {
        message: String,
        debug: Option<String>,
    },
    Error {
        message: String,
        debug: Option<String>,
    },
    PropertyChanged {
        object: String,
        name: String,
        value: PropertyValue,
    },
    CollectionChanged(Arc<StreamCollection>),
    StreamsSelected {
        collection: Arc<StreamCollection>,
        selected: Vec<Stream>,
    },
    /// The current item is about to drain; gapless playback hooks in here.
    AboutToFinish,
}

/// One remote or local instruction. Stateless, consumed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    Quit,
    TogglePaused,
    PlayNext,
    PlayPrevious,
    IncreasePlaybackRate,
    DecreasePlaybackRate,
    ChangeDirection,
    ToggleTrickMode,
    ChangeAudioTrack,
    ChangeVideoTrack,
    ChangeSubtitleTrack,
    SeekToBeginning,
    ToggleMute,
    VolumeUp,
    VolumeDown,
    SeekForward,
    SeekBackward,
}

/// Remote signal names and the command each one maps to.
pub const SIGNAL_TABLE: [(&str, Command); 17] = [
    ("Quit", Command::Quit),
    ("TogglePaused", Command::TogglePaused),
    ("PlayNext", Command::PlayNext),
    ("PlayPrevious", Command::PlayPrevious),
    ("IncreasePlaybackRate", Command::IncreasePlaybackRate),
    ("DecreasePlaybackRate", Command::DecreasePlaybackRate),
    ("ChangePlaybackDirection", Command::ChangeDirection),
    ("ToggleTrickMode", Command::ToggleTrickMode),
    ("ChangeAudioTrack", Command::ChangeAudioTrack),
    ("ChangeVideoTrack", Command::ChangeVideoTrack),
    ("ChangeSubtitleTrack", Command::ChangeSubtitleTrack),
    ("SeekToBeginning", Command::SeekToBeginning),
    ("ToggleAudioMute", Command::ToggleMute),
    ("IncreaseAudioVolume", Command::VolumeUp),
    ("DecreaseAudioVolume", Command::VolumeDown),
    ("SeekRight", Command::SeekForward),
    ("SeekLeft", Command::SeekBackward),
];

impl Command {
    /// Resolves a remote signal member name.
    pub fn from_signal_name(name: &str) -> Option<Command> {
        SIGNAL_TABLE
            .iter()
            .find(|(signal, _)| *signal == name)
            .map(|(_, command)| *command)
    }

    pub fn signal_name(self) -> &'static str {
        SIGNAL_TABLE
            .iter()
            .find(|(_, command)| *command == self)
            .map(|(signal, _)| *signal)
            .unwrap_or("Unknown")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_table_round_trips_every_command() {
        for (signal, command) in SIGNAL_TABLE {
            assert_eq!(Command::from_signal_name(signal), Some(command));
            assert_eq!(command.signal_name(), signal);
        }
    }

    #[test]
    fn test_unknown_signal_name_resolves_to_none() {
        assert_eq!(Command::from_signal_name("Rewind"), None);
        assert_eq!(Command::from_signal_name("quit"), None);
    }

    #[test]
    fn test_stream_type_classification_prefers_audio_then_video_then_text() {
        let muxed = StreamType(StreamType::AUDIO.0 | StreamType::VIDEO.0);
        assert_eq!(muxed.track_type(), Some(TrackType::Audio));
        assert_eq!(StreamType::VIDEO.track_type(), Some(TrackType::Video));
        assert_eq!(StreamType::TEXT.track_type(), Some(TrackType::Subtitle));
        assert_eq!(StreamType::CONTAINER.track_type(), None);
        assert_eq!(StreamType(0).track_type(), None);
    }

    #[test]
    fn test_property_value_renders_missing_value_placeholder() {
        assert_eq!(PropertyValue::None.to_string(), "(no value)");
        assert_eq!(
            PropertyValue::Caps("audio/x-raw".to_string()).to_string(),
            "audio/x-raw"
        );
    }

    #[test]
    fn test_collection_counts_streams_per_type() {
        let collection = StreamCollection::new(vec![
            Stream::new("a0", StreamType::AUDIO),
            Stream::new("a1", StreamType::AUDIO),
            Stream::new("v0", StreamType::VIDEO),
        ]);
        assert_eq!(collection.count_of(TrackType::Audio), 2);
        assert_eq!(collection.count_of(TrackType::Video), 1);
        assert_eq!(collection.count_of(TrackType::Subtitle), 0);
    }
}
