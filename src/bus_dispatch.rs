//! Reaction to engine bus notifications.
//!
//! Engine failures stop here: errors and end-of-stream turn into a playlist
//! advance, warnings into a log line. Nothing propagates to the caller except
//! the decision whether the control loop keeps running.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::engine::MediaEngine;
use crate::protocol::{BusEvent, EngineState, Stream, StreamCollection, TrackType};
use crate::session::{DesiredState, PlaybackSession};
use crate::status::report_position;

pub const END_OF_PLAYLIST: &str = "Reached end of play list.";

/// Whether the control loop keeps running after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Continue,
    Quit,
}

/// Applies bus notifications to the session and engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusDispatcher {
    verbose: bool,
}

impl BusDispatcher {
    /// `verbose` enables property-change logging.
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    pub fn dispatch(
        &self,
        session: &mut PlaybackSession,
        engine: &mut dyn MediaEngine,
        event: BusEvent,
    ) -> DispatchOutcome {
        match event {
            BusEvent::Prerolled => {
                engine.dump_graph("async-done");
                session.console().print("Prerolled.\r");
            }
            BusEvent::BufferingProgress(percent) => {
                Self::on_buffering(session, engine, percent);
            }
            BusEvent::ClockLost => {
                session.console().print("Clock lost, selecting a new one\n");
                engine.set_state(EngineState::Paused);
                engine.set_state(EngineState::Playing);
            }
            BusEvent::LatencyChanged => {
                session.console().print("Redistribute latency...\n");
                engine.recalculate_latency();
            }
            BusEvent::StateRequested { state, requester } => {
                info!(
                    "BusDispatcher: setting state to {} as requested by {}",
                    state.name(),
                    requester
                );
                engine.set_state(state);
            }
            BusEvent::EndOfStream => {
                report_position(
                    session.console(),
                    engine,
                    session.desired_state() == DesiredState::Paused,
                );
                session.console().print("\n");
                return Self::advance_or_quit(session, engine);
            }
            BusEvent::Warning { message, debug } => {
                engine.dump_graph("warning");
                warn!("WARNING {}", message);
                if let Some(debug) = debug {
                    warn!("WARNING debug information: {}", debug);
                }
            }
            BusEvent::Error { message, debug } => {
                engine.dump_graph("error");
                let uri = session.current_uri().unwrap_or("(none)").to_string();
                session
                    .console()
                    .print_error(&format!("ERROR {} for {}\n", message, uri));
                if let Some(debug) = debug {
                    session
                        .console()
                        .print_error(&format!("ERROR debug information: {}\n", debug));
                }

                // Flushes any further error messages for this item.
                engine.set_state(EngineState::Null);
                return Self::advance_or_quit(session, engine);
            }
            BusEvent::PropertyChanged {
                object,
                name,
                value,
            } => {
                if self.verbose {
                    info!("{}: {} = {}", object, name, value);
                }
            }
            BusEvent::CollectionChanged(collection) => {
                Self::on_collection(session, collection, None);
            }
            BusEvent::StreamsSelected {
                collection,
                selected,
            } => {
                Self::on_collection(session, collection, Some(selected.as_slice()));
            }
            BusEvent::AboutToFinish => {
                session.peek_next(engine);
            }
        }
        DispatchOutcome::Continue
    }

    fn on_buffering(session: &mut PlaybackSession, engine: &mut dyn MediaEngine, percent: i32) {
        if !session.is_buffering() {
            session.console().print("\n");
        }
        session
            .console()
            .print(&format!("Buffering... {}%  \r", percent));

        if percent >= 100 {
            if session.is_buffering() {
                session.set_buffering(false);
                if !session.is_live() {
                    engine.set_state(session.desired_state().engine_state());
                }
            }
        } else if !session.is_buffering() {
            if !session.is_live() {
                engine.set_state(EngineState::Paused);
            }
            session.set_buffering(true);
        }
    }

    fn on_collection(
        session: &PlaybackSession,
        collection: Arc<StreamCollection>,
        selected: Option<&[Stream]>,
    ) {
        let mut selection = session.lock_selection();
        debug!(
            "BusDispatcher: stream collection with {} streams ({} audio, {} video, {} subtitle)",
            collection.len(),
            collection.count_of(TrackType::Audio),
            collection.count_of(TrackType::Video),
            collection.count_of(TrackType::Subtitle)
        );
        selection.collection = Some(collection);

        let Some(selected) = selected else {
            return;
        };

        selection.clear_selected_stream_ids();
        for stream in selected {
            match stream.stream_type.track_type() {
                Some(track_type) => {
                    selection.set_selected_stream_id(track_type, stream.id.clone());
                }
                None => warn!(
                    "BusDispatcher: unknown stream type with stream-id {}",
                    stream.id
                ),
            }
        }
    }

    fn advance_or_quit(
        session: &mut PlaybackSession,
        engine: &mut dyn MediaEngine,
    ) -> DispatchOutcome {
        if session.advance(engine) {
            DispatchOutcome::Continue
        } else {
            session.console().print(&format!("{}\n", END_OF_PLAYLIST));
            DispatchOutcome::Quit
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{EngineCall, FakeEngine};
    use crate::protocol::{PropertyValue, StreamType, TrackType};
    use crate::session::SessionOptions;
    use crate::status::Console;

    fn started(items: &[&str], engine: &mut FakeEngine) -> PlaybackSession {
        let mut session = PlaybackSession::new(
            items.iter().map(|item| item.to_string()).collect(),
            SessionOptions::default(),
            Console::capturing(),
        );
        session.advance(engine);
        engine.clear_calls();
        session
    }

    #[test]
    fn test_buffering_pauses_once_then_resumes_desired_state() {
        let mut engine = FakeEngine::new();
        let mut session = started(&["http://radio/a"], &mut engine);
        let dispatcher = BusDispatcher::default();

        for percent in [10, 50, 90] {
            dispatcher.dispatch(
                &mut session,
                &mut engine,
                BusEvent::BufferingProgress(percent),
            );
        }
        assert!(session.is_buffering());
        assert_eq!(engine.state_requests(), vec![EngineState::Paused]);

        dispatcher.dispatch(&mut session, &mut engine, BusEvent::BufferingProgress(100));
        assert!(!session.is_buffering());
        assert_eq!(
            engine.state_requests(),
            vec![EngineState::Paused, EngineState::Playing]
        );
    }

    #[test]
    fn test_buffering_on_live_source_never_touches_engine_state() {
        let mut engine = FakeEngine::new();
        engine.paused_change = crate::engine::StateChange::NoPreroll;
        let mut session = started(&["rtsp://camera"], &mut engine);
        let dispatcher = BusDispatcher::default();

        dispatcher.dispatch(&mut session, &mut engine, BusEvent::BufferingProgress(20));
        dispatcher.dispatch(&mut session, &mut engine, BusEvent::BufferingProgress(100));

        assert!(engine.state_requests().is_empty());
        assert!(!session.is_buffering());
    }

    #[test]
    fn test_clock_lost_pauses_then_plays() {
        let mut engine = FakeEngine::new();
        let mut session = started(&["a"], &mut engine);
        BusDispatcher::default().dispatch(&mut session, &mut engine, BusEvent::ClockLost);
        assert_eq!(
            engine.state_requests(),
            vec![EngineState::Paused, EngineState::Playing]
        );
    }

    #[test]
    fn test_latency_and_state_requests_reach_engine() {
        let mut engine = FakeEngine::new();
        let mut session = started(&["a"], &mut engine);
        let dispatcher = BusDispatcher::default();

        dispatcher.dispatch(&mut session, &mut engine, BusEvent::LatencyChanged);
        dispatcher.dispatch(
            &mut session,
            &mut engine,
            BusEvent::StateRequested {
                state: EngineState::Paused,
                requester: "/playbin/videosink".to_string(),
            },
        );

        assert_eq!(
            engine.calls,
            vec![
                EngineCall::RecalculateLatency,
                EngineCall::SetState(EngineState::Paused)
            ]
        );
    }

    #[test]
    fn test_end_of_stream_advances_then_quits_at_end() {
        let mut engine = FakeEngine::new();
        let mut session = started(&["a", "b"], &mut engine);
        let dispatcher = BusDispatcher::default();

        assert_eq!(
            dispatcher.dispatch(&mut session, &mut engine, BusEvent::EndOfStream),
            DispatchOutcome::Continue
        );
        assert_eq!(session.cursor(), 1);
        assert_eq!(
            dispatcher.dispatch(&mut session, &mut engine, BusEvent::EndOfStream),
            DispatchOutcome::Quit
        );
        let output = session.console().captured();
        assert!(output.contains("0:00:10.0 / 0:01:40.0"));
        assert!(output.contains(END_OF_PLAYLIST));
    }

    #[test]
    fn test_error_stops_engine_reports_uri_and_skips() {
        let mut engine = FakeEngine::new();
        let mut session = started(&["broken.mp4", "ok.mp4"], &mut engine);

        let outcome = BusDispatcher::default().dispatch(
            &mut session,
            &mut engine,
            BusEvent::Error {
                message: "Could not demux".to_string(),
                debug: Some("qtdemux.c:42".to_string()),
            },
        );

        assert_eq!(outcome, DispatchOutcome::Continue);
        assert_eq!(engine.state_requests()[0], EngineState::Null);
        assert_eq!(engine.uris(), vec!["ok.mp4"]);
        let output = session.console().captured();
        assert!(output.contains("ERROR Could not demux for broken.mp4"));
        assert!(output.contains("ERROR debug information: qtdemux.c:42"));
    }

    #[test]
    fn test_warning_and_property_change_leave_session_alone() {
        let mut engine = FakeEngine::new();
        let mut session = started(&["a"], &mut engine);
        let dispatcher = BusDispatcher::new(true);

        dispatcher.dispatch(
            &mut session,
            &mut engine,
            BusEvent::Warning {
                message: "late buffer".to_string(),
                debug: None,
            },
        );
        dispatcher.dispatch(
            &mut session,
            &mut engine,
            BusEvent::PropertyChanged {
                object: "/playbin".to_string(),
                name: "volume".to_string(),
                value: PropertyValue::None,
            },
        );

        assert!(engine.calls.is_empty());
        assert_eq!(session.cursor(), 0);
    }

    #[test]
    fn test_streams_selected_repopulates_selection_by_type() {
        let mut engine = FakeEngine::new();
        let mut session = started(&["a"], &mut engine);
        let dispatcher = BusDispatcher::default();
        let collection = Arc::new(StreamCollection::new(vec![
            Stream::new("audio-0", StreamType::AUDIO),
            Stream::new("video-0", StreamType::VIDEO),
            Stream::new("text-0", StreamType::TEXT),
        ]));

        session.lock_selection().subtitle_stream_id = Some("stale".to_string());
        dispatcher.dispatch(
            &mut session,
            &mut engine,
            BusEvent::StreamsSelected {
                collection: Arc::clone(&collection),
                selected: vec![
                    Stream::new("audio-0", StreamType::AUDIO),
                    Stream::new("video-0", StreamType::VIDEO),
                    Stream::new("blob", StreamType::CONTAINER),
                ],
            },
        );

        let selection = session.lock_selection();
        assert_eq!(selection.collection.as_deref(), Some(collection.as_ref()));
        assert_eq!(selection.selected_stream_id(TrackType::Audio), Some("audio-0"));
        assert_eq!(selection.selected_stream_id(TrackType::Video), Some("video-0"));
        assert_eq!(selection.selected_stream_id(TrackType::Subtitle), None);
    }

    #[test]
    fn test_collection_changed_keeps_selected_ids() {
        let mut engine = FakeEngine::new();
        let mut session = started(&["a"], &mut engine);
        session.lock_selection().audio_stream_id = Some("audio-1".to_string());

        BusDispatcher::default().dispatch(
            &mut session,
            &mut engine,
            BusEvent::CollectionChanged(Arc::new(StreamCollection::default())),
        );

        let selection = session.lock_selection();
        assert!(selection.collection.is_some());
        assert_eq!(selection.selected_stream_id(TrackType::Audio), Some("audio-1"));
    }

    #[test]
    fn test_about_to_finish_arms_next_uri_when_gapless() {
        let mut engine = FakeEngine::new();
        let mut session = PlaybackSession::new(
            vec!["a".to_string(), "b".to_string()],
            SessionOptions {
                gapless: true,
                ..SessionOptions::default()
            },
            Console::capturing(),
        );
        session.advance(&mut engine);
        engine.clear_calls();

        BusDispatcher::default().dispatch(&mut session, &mut engine, BusEvent::AboutToFinish);

        assert_eq!(engine.uris(), vec!["b"]);
        assert_eq!(session.cursor(), 1);
    }
}
