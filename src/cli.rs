use clap::Parser;
use std::path::PathBuf;

use crate::config::{sanitize_config, Config};

pub const NO_INPUT_MESSAGE: &str = "You must provide at least one filename or URI to play.";

/// Playlist player with a D-Bus remote
#[derive(Parser, Debug)]
#[command(author, about, long_about = None, disable_version_flag = true)]
pub struct Args {
    /// Files, directories or URIs to play
    #[arg(value_name = "FILE|URI")]
    pub inputs: Vec<String>,

    /// Output status information and property notifications
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Do not print any output (apart from errors)
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Print version information and exit
    #[arg(long = "version")]
    pub version: bool,

    /// Playbin flags to set, e.g. "video+audio"
    #[arg(long = "flags", value_name = "FLAGS")]
    pub flags: Option<String>,

    /// Video sink to use (default is autovideosink)
    #[arg(long = "videosink", value_name = "SINK")]
    pub video_sink: Option<String>,

    /// Audio sink to use (default is autoaudiosink)
    #[arg(long = "audiosink", value_name = "SINK")]
    pub audio_sink: Option<String>,

    /// Enable gapless playback
    #[arg(long = "gapless")]
    pub gapless: bool,

    /// Shuffle playlist
    #[arg(long = "shuffle")]
    pub shuffle: bool,

    /// Volume
    #[arg(long = "volume", value_name = "VOLUME")]
    pub volume: Option<f64>,

    /// Playback rate
    #[arg(long = "rate", value_name = "RATE", allow_negative_numbers = true)]
    pub rate: Option<f64>,

    /// Playlist file containing input media files
    #[arg(long = "playlist", value_name = "FILE")]
    pub playlist: Option<PathBuf>,

    /// Send one remote command signal and exit
    #[arg(long = "emit", value_name = "SIGNAL")]
    pub emit: Option<String>,

    /// Use an alternate config file
    #[arg(long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Args {
    /// `true` when neither a playlist file nor positional inputs were given.
    pub fn has_no_input(&self) -> bool {
        self.playlist.is_none() && self.inputs.is_empty()
    }
}

/// Layers command-line flags over the loaded config.
pub fn apply_overrides(args: &Args, config: Config) -> Config {
    let mut config = config;
    if args.gapless {
        config.playback.gapless = true;
    }
    if args.shuffle {
        config.playback.shuffle = true;
    }
    if let Some(volume) = args.volume {
        config.playback.volume = volume;
    }
    if let Some(rate) = args.rate {
        config.playback.rate = rate;
    }
    if let Some(flags) = &args.flags {
        config.output.flags = flags.clone();
    }
    if let Some(video_sink) = &args.video_sink {
        config.output.video_sink = video_sink.clone();
    }
    if let Some(audio_sink) = &args.audio_sink {
        config.output.audio_sink = audio_sink.clone();
    }
    sanitize_config(config)
}

/// Usage banner printed when there is nothing to play.
pub fn usage_text(program: &str) -> String {
    format!(
        "Usage: {} FILE1|URI1 [FILE2|URI2] [FILE3|URI3] ...\n\n{}\n\n",
        program, NO_INPUT_MESSAGE
    )
}
