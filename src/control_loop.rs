//! The control loop: sole owner of the playback session.
//!
//! Status ticks, engine notifications and remote commands all arrive as
//! [`Message`]s on one broadcast bus and are handled one at a time on the
//! loop's thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::{Receiver, Sender};

use crate::bus_dispatch::{BusDispatcher, DispatchOutcome, END_OF_PLAYLIST};
use crate::engine::MediaEngine;
use crate::protocol::{BusEvent, Command, EngineState, Message, TrackType};
use crate::remote::RemoteServer;
use crate::seek::{self, SEEK_LEFT_FRACTION, SEEK_RIGHT_FRACTION, VOLUME_STEP};
use crate::session::{DesiredState, PlaybackSession};
use crate::status::report_position;
use crate::track_selection;

/// Periodic `Message::Tick` source.
pub struct StatusTicker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl StatusTicker {
    pub fn spawn(bus_producer: Sender<Message>, interval: Duration) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name("status-ticker".to_string())
            .spawn(move || {
                while !thread_stop.load(Ordering::Acquire) {
                    thread::sleep(interval);
                    if thread_stop.load(Ordering::Acquire) {
                        break;
                    }
                    if bus_producer.send(Message::Tick).is_err() {
                        break;
                    }
                }
            })?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Owns the session and engine and pumps the message bus until quit.
pub struct ControlLoop<E: MediaEngine> {
    session: PlaybackSession,
    engine: E,
    dispatcher: BusDispatcher,
    bus_consumer: Receiver<Message>,
    ticker: Option<StatusTicker>,
    remote: Option<RemoteServer>,
}

impl<E: MediaEngine> ControlLoop<E> {
    pub fn new(
        session: PlaybackSession,
        engine: E,
        dispatcher: BusDispatcher,
        bus_consumer: Receiver<Message>,
    ) -> Self {
        Self {
            session,
            engine,
            dispatcher,
            bus_consumer,
            ticker: None,
            remote: None,
        }
    }

    pub fn set_ticker(&mut self, ticker: StatusTicker) {
        self.ticker = Some(ticker);
    }

    pub fn set_remote(&mut self, remote: RemoteServer) {
        self.remote = Some(remote);
    }

    pub fn session(&self) -> &PlaybackSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut PlaybackSession {
        &mut self.session
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Starts the first playlist item and handles messages until the
    /// playlist runs out, a quit command arrives, or the bus closes. Tears
    /// everything down before returning.
    pub fn run(&mut self) {
        info!("ControlLoop: started");
        if !self.session.advance(&mut self.engine) {
            warn!("ControlLoop: playlist is empty");
            self.teardown();
            return;
        }

        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(message) => {
                    if self.handle_message(message) == DispatchOutcome::Quit {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    error!("ControlLoop: bus lagged, {} messages lost", skipped);
                    if self.resync_after_lag() == DispatchOutcome::Quit {
                        break;
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }

        self.teardown();
    }

    pub fn handle_message(&mut self, message: Message) -> DispatchOutcome {
        match message {
            Message::Tick => {
                self.on_tick();
                DispatchOutcome::Continue
            }
            Message::Bus(event) => {
                self.dispatcher
                    .dispatch(&mut self.session, &mut self.engine, event)
            }
            Message::Command(command) => self.apply_command(command),
        }
    }

    /// Rebuilds what the dropped messages would have told us from the
    /// engine's own answers: a finished item advances, and the engine is put
    /// back into the desired state.
    fn resync_after_lag(&mut self) -> DispatchOutcome {
        let finished = match (self.engine.query_position(), self.engine.query_duration()) {
            (Some(position), Some(duration)) => !duration.is_zero() && position >= duration,
            _ => false,
        };
        if finished {
            warn!("ControlLoop: item ended while messages were lost");
            return self
                .dispatcher
                .dispatch(&mut self.session, &mut self.engine, BusEvent::EndOfStream);
        }

        if !self.session.is_buffering() {
            let desired = self.session.desired_state().engine_state();
            if self.engine.current_state() != desired {
                debug!("ControlLoop: re-requesting {} after lag", desired.name());
                self.engine.set_state(desired);
            }
        }
        DispatchOutcome::Continue
    }

    fn on_tick(&mut self) {
        if self.session.is_buffering() {
            return;
        }
        report_position(
            self.session.console(),
            &self.engine,
            self.session.desired_state() == DesiredState::Paused,
        );
    }

    pub fn apply_command(&mut self, command: Command) -> DispatchOutcome {
        debug!("ControlLoop: applying {}", command.signal_name());
        let session = &mut self.session;
        let engine = &mut self.engine;

        match command {
            Command::Quit => {
                session.console().print_error("Server exiting...\n");
                return DispatchOutcome::Quit;
            }
            Command::TogglePaused => session.toggle_paused(engine),
            Command::PlayNext => {
                if !session.advance(engine) {
                    session
                        .console()
                        .print(&format!("\n{}\n", END_OF_PLAYLIST));
                    return DispatchOutcome::Quit;
                }
            }
            Command::PlayPrevious => {
                session.retreat(engine);
            }
            Command::IncreasePlaybackRate => {
                let step = seek::increase_rate_step(session.rate());
                seek::change_rate_relative(session, engine, step.delta, step.reverse_direction);
            }
            Command::DecreasePlaybackRate => {
                let step = seek::decrease_rate_step(session.rate());
                seek::change_rate_relative(session, engine, step.delta, step.reverse_direction);
            }
            Command::ChangeDirection => {
                seek::change_rate_relative(session, engine, 0.0, true);
            }
            Command::ToggleTrickMode => {
                seek::cycle_trick_mode(session, engine);
            }
            Command::ChangeAudioTrack => {
                track_selection::cycle_track(session, engine, TrackType::Audio);
            }
            Command::ChangeVideoTrack => {
                track_selection::cycle_track(session, engine, TrackType::Video);
            }
            Command::ChangeSubtitleTrack => {
                track_selection::cycle_track(session, engine, TrackType::Subtitle);
            }
            Command::SeekToBeginning => {
                let (rate, mode) = (session.rate(), session.trick_mode());
                seek::seek_absolute(session, engine, Duration::ZERO, rate, mode);
            }
            Command::ToggleMute => {
                seek::toggle_mute(session, engine);
            }
            Command::VolumeUp => {
                seek::set_volume_relative(session, engine, VOLUME_STEP);
            }
            Command::VolumeDown => {
                seek::set_volume_relative(session, engine, -VOLUME_STEP);
            }
            Command::SeekForward => {
                if seek::seek_relative(session, engine, SEEK_RIGHT_FRACTION)
                    == seek::SeekOutcome::PlaylistExhausted
                {
                    session
                        .console()
                        .print(&format!("{}\n", END_OF_PLAYLIST));
                    return DispatchOutcome::Quit;
                }
            }
            Command::SeekBackward => {
                if seek::seek_relative(session, engine, SEEK_LEFT_FRACTION)
                    == seek::SeekOutcome::PlaylistExhausted
                {
                    session
                        .console()
                        .print(&format!("{}\n", END_OF_PLAYLIST));
                    return DispatchOutcome::Quit;
                }
            }
        }
        DispatchOutcome::Continue
    }

    /// Stops the engine, then the ticker and bus subscription, then the
    /// remote listener.
    fn teardown(&mut self) {
        self.engine.set_state(EngineState::Null);
        if let Some(ticker) = self.ticker.take() {
            ticker.stop();
        }
        self.engine.release_bus();
        if let Some(remote) = self.remote.take() {
            remote.shutdown();
        }
        info!("ControlLoop: stopped");
    }
}
