pub mod bus_dispatch;
pub mod cli;
pub mod config;
pub mod control_loop;
pub mod engine;
pub mod error;
#[cfg(feature = "gstreamer")]
pub mod gst_engine;
pub mod media_file_discovery;
pub mod playlist;
pub mod protocol;
pub mod remote;
pub mod seek;
pub mod session;
pub mod status;
pub mod track_selection;
