use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{debug, error, info};
use tokio::sync::broadcast;

use playctl::bus_dispatch::BusDispatcher;
use playctl::cli::{apply_overrides, usage_text, Args};
use playctl::config::{default_config_path, load_config, Config};
use playctl::control_loop::{ControlLoop, StatusTicker};
use playctl::engine::MediaEngine;
use playctl::error::PlayerError;
use playctl::gst_engine::{engine_version, GstEngine, GstEngineOptions};
use playctl::playlist::Playlist;
use playctl::remote::{send_remote_command, RemoteServer};
use playctl::seek::quantize_volume;
use playctl::session::{PlaybackSession, PrerollWait, SessionOptions};
use playctl::status::Console;

const BUS_CAPACITY: usize = 1024;

fn init_logging(args: &Args) {
    let level = if args.verbose {
        log::LevelFilter::Debug
    } else if args.quiet {
        log::LevelFilter::Warn
    } else {
        log::LevelFilter::Info
    };
    let mut clog = colog::default_builder();
    clog.filter(None, level);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));
}

fn load_effective_config(args: &Args) -> Config {
    let config = match args.config.clone().or_else(default_config_path) {
        Some(path) => {
            debug!("Loading config from {}", path.display());
            load_config(&path)
        }
        None => {
            info!("No config directory available. Using defaults");
            Config::default()
        }
    };
    apply_overrides(args, config)
}

fn build_playlist(args: &Args, config: &Config, console: &Console) -> Option<Vec<String>> {
    let mut playlist = match Playlist::new() {
        Ok(playlist) => playlist,
        Err(err) => {
            console.print_error(&format!("Could not seed the shuffle: {}\n", err));
            return None;
        }
    };

    if let Some(path) = &args.playlist {
        if let Err(err) = playlist.add_playlist_file(path) {
            console.print_error(&format!(
                "Could not read playlist {}: {}\n",
                path.display(),
                err
            ));
        }
    }
    for input in &args.inputs {
        playlist.add_entry(input);
    }

    if playlist.is_empty() {
        console.print_error("Playlist is empty.\n");
        return None;
    }
    if config.playback.shuffle {
        playlist.shuffle();
    }
    playlist.dump();
    Some(playlist.into_uris())
}

fn emit_signal(config: &Config, signal_name: &str, console: &Console) -> ExitCode {
    match send_remote_command(&config.remote, signal_name) {
        Ok(()) => {
            console.print(&format!(" Signal sent: {}\n", signal_name));
            ExitCode::SUCCESS
        }
        Err(PlayerError::UnknownSignal(name)) => {
            console.print_error(&format!("Unknown signal name: {}\n", name));
            ExitCode::FAILURE
        }
        Err(err) => {
            console.print_error(&format!("Could not send signal {}: {}\n", signal_name, err));
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);
    let console = Console::new(args.quiet);

    if args.version {
        console.print(&format!(
            "{} version {}\n{}\n",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            engine_version()
        ));
        return ExitCode::SUCCESS;
    }

    let config = load_effective_config(&args);

    if let Some(signal_name) = &args.emit {
        return emit_signal(&config, signal_name, &console);
    }

    if args.has_no_input() {
        let program = std::env::args()
            .next()
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());
        console.print_error(&usage_text(&program));
        return ExitCode::FAILURE;
    }

    let Some(uris) = build_playlist(&args, &config, &console) else {
        return ExitCode::FAILURE;
    };

    let (bus_producer, bus_consumer) = broadcast::channel(BUS_CAPACITY);

    let engine_options = GstEngineOptions {
        audio_sink: config.output.audio_sink.clone(),
        video_sink: config.output.video_sink.clone(),
        flags: config.output.flags.clone(),
        gapless: config.playback.gapless,
        verbose: args.verbose,
    };
    let mut engine = match GstEngine::new(&engine_options, bus_producer.clone()) {
        Ok(engine) => engine,
        Err(err) => {
            console.print_error(&format!("{}\n", err));
            return ExitCode::FAILURE;
        }
    };
    engine.set_volume(quantize_volume(config.playback.volume));

    let session = PlaybackSession::new(
        uris,
        SessionOptions {
            gapless: config.playback.gapless,
            initial_rate: config.playback.rate,
            preroll_wait: PrerollWait {
                interval: Duration::from_millis(config.playback.preroll_poll_interval_ms),
                max_attempts: config.playback.preroll_poll_max_attempts,
            },
        },
        console.clone(),
    );

    let mut control = ControlLoop::new(
        session,
        engine,
        BusDispatcher::new(args.verbose),
        bus_consumer,
    );

    if config.remote.enabled {
        match RemoteServer::start(&config.remote, bus_producer.clone()) {
            Ok(remote) => control.set_remote(remote),
            Err(err) => {
                error!("Remote server failed to start: {}", err);
                console.print_error("Failed to set up the DBus server.\n");
                return ExitCode::FAILURE;
            }
        }
    }

    match StatusTicker::spawn(
        bus_producer.clone(),
        Duration::from_millis(config.playback.status_interval_ms),
    ) {
        Ok(ticker) => control.set_ticker(ticker),
        Err(err) => error!("Status ticker failed to start: {}", err),
    }
    drop(bus_producer);

    control.run();
    console.print("\n");
    ExitCode::SUCCESS
}
