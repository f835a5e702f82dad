//! GStreamer `playbin` backend.
//!
//! Bus messages are drained on a dedicated thread and forwarded to the control
//! loop as [`BusEvent`]s. The `about-to-finish` signal fires on a streaming
//! thread; it posts [`BusEvent::AboutToFinish`] and waits (bounded) for the
//! loop to set the next URI.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver as AckReceiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use gstreamer as gst;
use gstreamer::glib;
use gstreamer::prelude::*;
use log::{debug, warn};
use tokio::sync::broadcast::Sender;

use crate::engine::{MediaEngine, SeekFlags, SeekRequest, SeekingInfo, StateChange};
use crate::error::{PlayerError, Result};
use crate::protocol::{
    BusEvent, EngineState, Message, PropertyValue, Stream, StreamCollection, StreamType,
    TrackType,
};

const BUS_POLL_INTERVAL_MS: u64 = 100;
const ABOUT_TO_FINISH_TIMEOUT: Duration = Duration::from_millis(500);

/// Construction options for [`GstEngine`].
#[derive(Debug, Clone, Default)]
pub struct GstEngineOptions {
    pub audio_sink: String,
    pub video_sink: String,
    pub flags: String,
    pub gapless: bool,
    pub verbose: bool,
}

/// `"GStreamer 1.x.y"`, for `--version`.
pub fn engine_version() -> String {
    gst::version_string().to_string()
}

pub struct GstEngine {
    pipeline: gst::Pipeline,
    bus_stop: Arc<AtomicBool>,
    bus_thread: Option<JoinHandle<()>>,
    about_to_finish_pending: Arc<AtomicBool>,
    about_to_finish_ack: SyncSender<()>,
    _deep_notify: Option<gst::NotifyWatchId>,
}

impl GstEngine {
    pub fn new(options: &GstEngineOptions, bus_producer: Sender<Message>) -> Result<Self> {
        gst::init().map_err(|err| PlayerError::Engine(err.to_string()))?;

        let playbin = gst::ElementFactory::make("playbin")
            .build()
            .map_err(|_| {
                PlayerError::Engine(
                    "Failed to create 'playbin' element. Check your GStreamer installation."
                        .to_string(),
                )
            })?;

        if !options.audio_sink.is_empty() {
            let sink = make_sink(&options.audio_sink)?;
            playbin.set_property("audio-sink", &sink);
        }
        if !options.video_sink.is_empty() {
            let sink = make_sink(&options.video_sink)?;
            playbin.set_property("video-sink", &sink);
        }
        if !options.flags.is_empty() {
            playbin.set_property_from_str("flags", &options.flags);
        }

        let deep_notify = options
            .verbose
            .then(|| playbin.add_property_deep_notify_watch(None, true));

        let pipeline = playbin
            .downcast::<gst::Pipeline>()
            .map_err(|_| PlayerError::Engine("playbin is not a pipeline".to_string()))?;

        let (ack_sender, ack_receiver) = mpsc::sync_channel(1);
        let about_to_finish_pending = Arc::new(AtomicBool::new(false));
        if options.gapless {
            Self::connect_about_to_finish(
                &pipeline,
                bus_producer.clone(),
                Arc::clone(&about_to_finish_pending),
                ack_receiver,
            );
        }

        let bus = pipeline
            .bus()
            .ok_or_else(|| PlayerError::Engine("playbin has no bus".to_string()))?;
        let bus_stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&bus_stop);
        let bus_thread = thread::Builder::new()
            .name("gst-bus".to_string())
            .spawn(move || Self::pump_bus(bus, &thread_stop, &bus_producer))?;

        Ok(Self {
            pipeline,
            bus_stop,
            bus_thread: Some(bus_thread),
            about_to_finish_pending,
            about_to_finish_ack: ack_sender,
            _deep_notify: deep_notify,
        })
    }

    fn connect_about_to_finish(
        pipeline: &gst::Pipeline,
        bus_producer: Sender<Message>,
        pending: Arc<AtomicBool>,
        ack_receiver: AckReceiver<()>,
    ) {
        let ack_receiver = Mutex::new(ack_receiver);
        pipeline.connect("about-to-finish", false, move |_| {
            let receiver = match ack_receiver.lock() {
                Ok(receiver) => receiver,
                Err(poisoned) => poisoned.into_inner(),
            };
            while receiver.try_recv().is_ok() {}

            pending.store(true, Ordering::Release);
            if bus_producer
                .send(Message::Bus(BusEvent::AboutToFinish))
                .is_ok()
                && receiver.recv_timeout(ABOUT_TO_FINISH_TIMEOUT).is_err()
            {
                debug!("GstEngine: no next URI armed before the current one drained");
            }
            pending.store(false, Ordering::Release);
            None
        });
    }

    fn pump_bus(bus: gst::Bus, stop: &AtomicBool, bus_producer: &Sender<Message>) {
        while !stop.load(Ordering::Acquire) {
            let Some(message) = bus.timed_pop(gst::ClockTime::from_mseconds(BUS_POLL_INTERVAL_MS))
            else {
                continue;
            };
            if let Some(event) = map_bus_message(&message) {
                if bus_producer.send(Message::Bus(event)).is_err() {
                    break;
                }
            }
        }
        debug!("GstEngine: bus thread stopped");
    }

    fn track_properties(track_type: TrackType) -> (&'static str, &'static str, &'static str) {
        match track_type {
            TrackType::Audio => ("current-audio", "n-audio", "get-audio-tags"),
            TrackType::Video => ("current-video", "n-video", "get-video-tags"),
            TrackType::Subtitle => ("current-text", "n-text", "get-text-tags"),
        }
    }

    fn stop_bus_thread(&mut self) {
        self.bus_stop.store(true, Ordering::Release);
        if let Some(handle) = self.bus_thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for GstEngine {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
        self.stop_bus_thread();
    }
}

fn make_sink(description: &str) -> Result<gst::Element> {
    let sink_error = |err: &dyn std::fmt::Display| {
        PlayerError::Engine(format!("Could not create sink '{}': {}", description, err))
    };
    if description.contains(' ') {
        gst::parse::bin_from_description(description, true)
            .map(|bin| bin.upcast::<gst::Element>())
            .map_err(|err| sink_error(&err))
    } else {
        gst::ElementFactory::make(description)
            .build()
            .map_err(|err| sink_error(&err))
    }
}

fn to_gst_state(state: EngineState) -> gst::State {
    match state {
        EngineState::Null => gst::State::Null,
        EngineState::Ready => gst::State::Ready,
        EngineState::Paused => gst::State::Paused,
        EngineState::Playing => gst::State::Playing,
    }
}

fn from_gst_state(state: gst::State) -> EngineState {
    match state {
        gst::State::Ready => EngineState::Ready,
        gst::State::Paused => EngineState::Paused,
        gst::State::Playing => EngineState::Playing,
        _ => EngineState::Null,
    }
}

fn to_gst_seek_flags(flags: SeekFlags) -> gst::SeekFlags {
    let mut gst_flags = gst::SeekFlags::empty();
    for (flag, gst_flag) in [
        (SeekFlags::FLUSH, gst::SeekFlags::FLUSH),
        (SeekFlags::ACCURATE, gst::SeekFlags::ACCURATE),
        (SeekFlags::TRICKMODE, gst::SeekFlags::TRICKMODE),
        (SeekFlags::TRICKMODE_KEY_UNITS, gst::SeekFlags::TRICKMODE_KEY_UNITS),
        (SeekFlags::TRICKMODE_NO_AUDIO, gst::SeekFlags::TRICKMODE_NO_AUDIO),
    ] {
        if flags.contains(flag) {
            gst_flags |= gst_flag;
        }
    }
    gst_flags
}

fn clock_time(duration: Duration) -> gst::ClockTime {
    gst::ClockTime::from_nseconds(duration.as_nanos() as u64)
}

fn duration_of(time: gst::ClockTime) -> Duration {
    Duration::from_nanos(time.nseconds())
}

fn convert_collection(collection: &gst::StreamCollection) -> StreamCollection {
    StreamCollection::new(collection.iter().map(|stream| convert_stream(&stream)).collect())
}

fn convert_stream(stream: &gst::Stream) -> Stream {
    Stream::new(
        stream
            .stream_id()
            .map(|id| id.to_string())
            .unwrap_or_default(),
        StreamType(stream.stream_type().bits()),
    )
}

fn property_value(value: Option<&glib::Value>) -> PropertyValue {
    let Some(value) = value else {
        return PropertyValue::None;
    };
    if let Ok(text) = value.get::<String>() {
        return PropertyValue::Str(text);
    }
    if let Ok(caps) = value.get::<gst::Caps>() {
        return PropertyValue::Caps(caps.to_string());
    }
    if let Ok(tags) = value.get::<gst::TagList>() {
        return PropertyValue::Tags(tags.to_string());
    }
    match value.serialize() {
        Ok(serialized) => PropertyValue::Other(serialized.to_string()),
        Err(_) => PropertyValue::None,
    }
}

fn map_bus_message(message: &gst::Message) -> Option<BusEvent> {
    use gst::MessageView;

    let event = match message.view() {
        MessageView::AsyncDone(_) => BusEvent::Prerolled,
        MessageView::Buffering(buffering) => BusEvent::BufferingProgress(buffering.percent()),
        MessageView::ClockLost(_) => BusEvent::ClockLost,
        MessageView::Latency(_) => BusEvent::LatencyChanged,
        MessageView::RequestState(request) => BusEvent::StateRequested {
            state: from_gst_state(request.requested_state()),
            requester: message
                .src()
                .map(|src| src.path_string().to_string())
                .unwrap_or_default(),
        },
        MessageView::Eos(_) => BusEvent::EndOfStream,
        MessageView::Warning(warning) => BusEvent::Warning {
            message: warning.error().to_string(),
            debug: warning.debug().map(|debug| debug.to_string()),
        },
        MessageView::Error(error) => BusEvent::Error {
            message: error.error().to_string(),
            debug: error.debug().map(|debug| debug.to_string()),
        },
        MessageView::PropertyNotify(notify) => {
            let (object, name, value) = notify.get();
            BusEvent::PropertyChanged {
                object: object.path_string().to_string(),
                name: name.to_string(),
                value: property_value(value),
            }
        }
        MessageView::StreamCollection(collection) => BusEvent::CollectionChanged(Arc::new(
            convert_collection(&collection.stream_collection()),
        )),
        MessageView::StreamsSelected(selected) => BusEvent::StreamsSelected {
            collection: Arc::new(convert_collection(&selected.stream_collection())),
            selected: selected.streams().iter().map(convert_stream).collect(),
        },
        _ => return None,
    };
    Some(event)
}

impl MediaEngine for GstEngine {
    fn set_state(&mut self, state: EngineState) -> StateChange {
        match self.pipeline.set_state(to_gst_state(state)) {
            Ok(gst::StateChangeSuccess::Success) => StateChange::Success,
            Ok(gst::StateChangeSuccess::Async) => StateChange::Async,
            Ok(gst::StateChangeSuccess::NoPreroll) => StateChange::NoPreroll,
            Err(_) => StateChange::Failure,
        }
    }

    fn current_state(&self) -> EngineState {
        from_gst_state(self.pipeline.current_state())
    }

    fn set_uri(&mut self, uri: &str) {
        self.pipeline.set_property("uri", uri);
        if self.about_to_finish_pending.swap(false, Ordering::AcqRel) {
            let _ = self.about_to_finish_ack.try_send(());
        }
    }

    fn query_position(&self) -> Option<Duration> {
        self.pipeline
            .query_position::<gst::ClockTime>()
            .map(duration_of)
    }

    fn query_duration(&self) -> Option<Duration> {
        self.pipeline
            .query_duration::<gst::ClockTime>()
            .map(duration_of)
    }

    fn query_seeking(&self) -> Option<SeekingInfo> {
        let mut query = gst::query::Seeking::new(gst::Format::Time);
        if !self.pipeline.query(&mut query) {
            return None;
        }
        let (seekable, _, _) = query.result();
        Some(SeekingInfo {
            seekable,
            duration: self.query_duration(),
        })
    }

    fn send_seek(&mut self, request: &SeekRequest) -> bool {
        let result = self.pipeline.seek(
            request.rate,
            to_gst_seek_flags(request.flags),
            gst::SeekType::Set,
            Some(clock_time(request.start)),
            gst::SeekType::Set,
            request.stop.map(clock_time),
        );
        if let Err(err) = &result {
            debug!("GstEngine: seek rejected: {}", err);
        }
        result.is_ok()
    }

    fn volume(&self) -> f64 {
        // playbin's volume property is linear; the controller works on the
        // cubic scale.
        self.pipeline.property::<f64>("volume").cbrt()
    }

    fn set_volume(&mut self, volume: f64) {
        self.pipeline.set_property("volume", volume.powi(3));
    }

    fn is_muted(&self) -> bool {
        self.pipeline.property::<bool>("mute")
    }

    fn set_muted(&mut self, muted: bool) {
        self.pipeline.set_property("mute", muted);
    }

    fn recalculate_latency(&mut self) {
        if let Err(err) = self.pipeline.recalculate_latency() {
            warn!("GstEngine: failed to recalculate latency: {}", err);
        }
    }

    fn current_track(&self, track_type: TrackType) -> i32 {
        let (current, _, _) = Self::track_properties(track_type);
        self.pipeline.property::<i32>(current)
    }

    fn track_count(&self, track_type: TrackType) -> i32 {
        let (_, count, _) = Self::track_properties(track_type);
        self.pipeline.property::<i32>(count)
    }

    fn flags(&self) -> u32 {
        self.pipeline
            .property_value("flags")
            .transform::<u32>()
            .ok()
            .and_then(|value| value.get::<u32>().ok())
            .unwrap_or(0)
    }

    fn set_flags(&mut self, flags: u32) {
        let flags_type = self.pipeline.property_value("flags").type_();
        let value = glib::FlagsClass::with_type(flags_type).and_then(|class| class.to_value(flags));
        match value {
            Some(value) => self.pipeline.set_property_from_value("flags", &value),
            None => warn!("GstEngine: could not build flags value {:#x}", flags),
        }
    }

    fn set_current_track(&mut self, track_type: TrackType, index: i32) {
        let (current, _, _) = Self::track_properties(track_type);
        self.pipeline.set_property(current, index);
    }

    fn track_language(&self, track_type: TrackType, index: i32) -> Option<String> {
        let (_, _, tags_signal) = Self::track_properties(track_type);
        let tags = self
            .pipeline
            .emit_by_name::<Option<gst::TagList>>(tags_signal, &[&index])?;
        if let Some(name) = tags.get::<gst::tags::LanguageName>() {
            return Some(name.get().to_string());
        }
        tags.get::<gst::tags::LanguageCode>()
            .map(|code| code.get().to_string())
    }

    fn dump_graph(&self, label: &str) {
        self.pipeline
            .debug_to_dot_file_with_ts(gst::DebugGraphDetails::all(), format!("playctl.{}", label));
    }

    fn release_bus(&mut self) {
        self.stop_bus_thread();
    }
}
