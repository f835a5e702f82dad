//! Cycling through the audio, video and subtitle tracks of the loaded media.

use log::debug;

use crate::engine::{track_flag, MediaEngine};
use crate::protocol::TrackType;
use crate::session::PlaybackSession;

/// What a cycle step ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackCycle {
    /// The media has no track of this type; nothing was written.
    NoTracks,
    /// The type was switched off.
    Disabled,
    Switched {
        index: i32,
        count: i32,
        language: Option<String>,
    },
}

/// Steps to the next track of `track_type`.
///
/// Index `count` acts as the "disabled" slot after the last track. Video never
/// lands there and wraps to the first track instead. A type that is currently
/// disabled always restarts from its first track.
pub fn cycle_track(
    session: &PlaybackSession,
    engine: &mut dyn MediaEngine,
    track_type: TrackType,
) -> TrackCycle {
    let bit = track_flag(track_type);

    let (index, outcome) = {
        let selection = session.lock_selection();

        let current = engine.current_track(track_type);
        let count = engine.track_count(track_type);
        let flags = engine.flags();
        let enabled = flags & bit != 0;

        debug!(
            "TrackSelection: {} current={} count={} enabled={} selected_stream={:?}",
            track_type.name(),
            current,
            count,
            enabled,
            selection.selected_stream_id(track_type)
        );

        if count < 1 {
            session
                .console()
                .print(&format!("No {} tracks.\n", track_type.name()));
            return TrackCycle::NoTracks;
        }

        let mut next = if enabled {
            (current + 1).rem_euclid(count + 1)
        } else {
            0
        };

        if next == count && track_type != TrackType::Video {
            next = -1;
            if enabled {
                engine.set_flags(flags & !bit);
            }
            session
                .console()
                .print(&format!("Disabling {}.\n", track_type.name()));
            (next, TrackCycle::Disabled)
        } else {
            if next == count {
                next = 0;
            }
            if !enabled {
                engine.set_flags(flags | bit);
            }

            let language = engine.track_language(track_type, next);
            let suffix = language
                .as_deref()
                .map(|language| format!(" ({})", language))
                .unwrap_or_default();
            session.console().print(&format!(
                "Switching to {} track {} of {}{}.\n",
                track_type.name(),
                next + 1,
                count,
                suffix
            ));
            (
                next,
                TrackCycle::Switched {
                    index: next,
                    count,
                    language,
                },
            )
        }
    };

    engine.set_current_track(track_type, index);
    outcome
}
