//! Mutable playback session: playlist cursor, rate, trick mode, transient
//! buffering/live flags and the per-type stream selection.
//!
//! The control loop owns the single session; every component receives it by
//! reference together with the engine it drives. Selection writers all run on
//! the loop thread and go through [`PlaybackSession::lock_selection`]; readers
//! hold that guard for the whole read-decide step.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};

use crate::engine::{MediaEngine, StateChange};
use crate::protocol::{EngineState, StreamCollection, TrackType};
use crate::seek::{self, TrickMode};
use crate::status::{uri_display_name, Console};

/// What the user wants, independent of transient buffering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesiredState {
    Playing,
    Paused,
}

impl DesiredState {
    pub fn engine_state(self) -> EngineState {
        match self {
            DesiredState::Playing => EngineState::Playing,
            DesiredState::Paused => EngineState::Paused,
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            DesiredState::Playing => DesiredState::Paused,
            DesiredState::Paused => DesiredState::Playing,
        }
    }
}

/// Currently applied stream per track type plus the last-seen collection.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub collection: Option<Arc<StreamCollection>>,
    pub audio_stream_id: Option<String>,
    pub video_stream_id: Option<String>,
    pub subtitle_stream_id: Option<String>,
}

impl Selection {
    pub fn selected_stream_id(&self, track_type: TrackType) -> Option<&str> {
        match track_type {
            TrackType::Audio => self.audio_stream_id.as_deref(),
            TrackType::Video => self.video_stream_id.as_deref(),
            TrackType::Subtitle => self.subtitle_stream_id.as_deref(),
        }
    }

    pub fn set_selected_stream_id(&mut self, track_type: TrackType, stream_id: String) {
        let slot = match track_type {
            TrackType::Audio => &mut self.audio_stream_id,
            TrackType::Video => &mut self.video_stream_id,
            TrackType::Subtitle => &mut self.subtitle_stream_id,
        };
        *slot = Some(stream_id);
    }

    pub fn clear_selected_stream_ids(&mut self) {
        self.audio_stream_id = None;
        self.video_stream_id = None;
        self.subtitle_stream_id = None;
    }
}

/// Selection record behind the selection guard.
pub type SharedSelection = Arc<Mutex<Selection>>;

/// Bounded wait for a freshly loaded item to leave `Null`/`Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrerollWait {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PrerollWait {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(10),
            max_attempts: 500,
        }
    }
}

/// Construction options for a session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub gapless: bool,
    pub initial_rate: f64,
    pub preroll_wait: PrerollWait,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            gapless: false,
            initial_rate: 1.0,
            preroll_wait: PrerollWait::default(),
        }
    }
}

pub struct PlaybackSession {
    playlist: Vec<String>,
    cursor: Option<usize>,
    desired_state: DesiredState,
    rate: f64,
    trick_mode: TrickMode,
    buffering: bool,
    is_live: bool,
    gapless: bool,
    preroll_wait: PrerollWait,
    selection: SharedSelection,
    console: Console,
}

impl PlaybackSession {
    pub fn new(playlist: Vec<String>, options: SessionOptions, console: Console) -> Self {
        let rate = if options.initial_rate.is_finite() && options.initial_rate != 0.0 {
            options.initial_rate
        } else {
            warn!(
                "PlaybackSession: ignoring invalid initial rate {}, using 1.0",
                options.initial_rate
            );
            1.0
        };

        Self {
            playlist,
            cursor: None,
            desired_state: DesiredState::Playing,
            rate,
            trick_mode: TrickMode::None,
            buffering: false,
            is_live: false,
            gapless: options.gapless,
            preroll_wait: options.preroll_wait,
            selection: Arc::new(Mutex::new(Selection::default())),
            console,
        }
    }

    pub fn playlist(&self) -> &[String] {
        &self.playlist
    }

    /// Playlist cursor; `-1` until the first item is loaded.
    pub fn cursor(&self) -> isize {
        self.cursor
            .and_then(|index| isize::try_from(index).ok())
            .unwrap_or(-1)
    }

    pub fn current_uri(&self) -> Option<&str> {
        self.cursor
            .and_then(|index| self.playlist.get(index))
            .map(String::as_str)
    }

    pub fn desired_state(&self) -> DesiredState {
        self.desired_state
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn trick_mode(&self) -> TrickMode {
        self.trick_mode
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    pub fn set_buffering(&mut self, buffering: bool) {
        self.buffering = buffering;
    }

    pub fn is_live(&self) -> bool {
        self.is_live
    }

    pub fn console(&self) -> &Console {
        &self.console
    }

    /// Takes the selection guard, recovering the record if a holder panicked.
    pub fn lock_selection(&self) -> MutexGuard<'_, Selection> {
        match self.selection.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Commits the rate and trick mode of a seek the engine accepted.
    pub(crate) fn commit_seek(&mut self, rate: f64, trick_mode: TrickMode) {
        debug_assert!(rate != 0.0, "playback rate must never be zero");
        self.rate = rate;
        self.trick_mode = trick_mode;
    }

    /// Flips the desired state and applies it unless buffering holds playback.
    pub fn toggle_paused(&mut self, engine: &mut dyn MediaEngine) {
        self.desired_state = self.desired_state.toggled();

        if !self.buffering {
            engine.set_state(self.desired_state.engine_state());
        } else if self.desired_state == DesiredState::Playing {
            self.console
                .print("\nWill play as soon as buffering finishes\n");
        }
    }

    /// Moves to the next playlist item. Returns `false` at the end of the list.
    pub fn advance(&mut self, engine: &mut dyn MediaEngine) -> bool {
        let next = self.cursor.map_or(0, |index| index + 1);
        if next >= self.playlist.len() {
            return false;
        }

        self.cursor = Some(next);
        let uri = self.playlist[next].clone();
        self.load(engine, &uri);
        true
    }

    /// Moves to the previous playlist item. Returns `false` at the start.
    pub fn retreat(&mut self, engine: &mut dyn MediaEngine) -> bool {
        if self.playlist.len() <= 1 {
            return false;
        }
        let Some(current) = self.cursor else {
            return false;
        };
        if current == 0 {
            return false;
        }

        let previous = current - 1;
        self.cursor = Some(previous);
        let uri = self.playlist[previous].clone();
        self.load(engine, &uri);
        true
    }

    /// Gapless hand-off: arms the engine with the next URI without reloading.
    pub fn peek_next(&mut self, engine: &mut dyn MediaEngine) -> bool {
        if !self.gapless {
            return false;
        }

        let next = self.cursor.map_or(0, |index| index + 1);
        let Some(next_uri) = self.playlist.get(next).cloned() else {
            return false;
        };

        self.console.print(&format!(
            "About to finish, preparing next title: {}\n",
            uri_display_name(&next_uri)
        ));
        engine.set_uri(&next_uri);
        self.cursor = Some(next);
        true
    }

    fn reset_transient_flags(&mut self) {
        self.buffering = false;
        self.is_live = false;
    }

    fn load(&mut self, engine: &mut dyn MediaEngine, uri: &str) {
        engine.set_state(EngineState::Ready);
        self.reset_transient_flags();

        self.console
            .print(&format!("Now playing {}\n", uri_display_name(uri)));
        info!("PlaybackSession: loading {}", uri);

        engine.set_uri(uri);

        match engine.set_state(EngineState::Paused) {
            StateChange::Failure => {
                // An error notification follows on the bus.
                debug!("PlaybackSession: preroll request failed for {}", uri);
            }
            StateChange::NoPreroll => {
                self.console.print("Pipeline is live.\n");
                self.is_live = true;
            }
            StateChange::Async => self.console.print("Prerolling...\r"),
            StateChange::Success => {}
        }

        engine.set_state(self.desired_state.engine_state());

        self.wait_for_preroll(engine);

        debug!("PlaybackSession: re-applying playback rate {}", self.rate);
        seek::set_playback_rate(self, engine, self.rate);
    }

    fn wait_for_preroll(&self, engine: &dyn MediaEngine) {
        for _ in 0..self.preroll_wait.max_attempts {
            if engine.current_state() > EngineState::Ready {
                return;
            }
            thread::sleep(self.preroll_wait.interval);
        }
        warn!(
            "PlaybackSession: engine still in {} after {} state checks",
            engine.current_state().name(),
            self.preroll_wait.max_attempts
        );
    }
}
