//! User-facing console output.
//!
//! Status lines bypass the logger and honour the quiet switch instead of the
//! log level.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use url::Url;

use crate::engine::MediaEngine;

/// Status suffix; its width is padded with spaces while playing.
const STATUS_PAUSED: &str = "Paused";

#[derive(Debug, Clone, Default)]
pub struct Console {
    quiet: bool,
    captured: Option<Arc<Mutex<String>>>,
}

impl Console {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            captured: None,
        }
    }

    /// Console that records output instead of writing to stdout/stderr.
    pub fn capturing() -> Self {
        Self {
            quiet: false,
            captured: Some(Arc::new(Mutex::new(String::new()))),
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet
    }

    /// Prints a status fragment verbatim; the caller supplies `\n` or `\r`.
    pub fn print(&self, text: &str) {
        if self.quiet {
            return;
        }
        if self.capture(text) {
            return;
        }
        let mut stdout = std::io::stdout().lock();
        let _ = stdout.write_all(text.as_bytes());
        let _ = stdout.flush();
    }

    /// Error output is never silenced.
    pub fn print_error(&self, text: &str) {
        if self.capture(text) {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = stderr.write_all(text.as_bytes());
        let _ = stderr.flush();
    }

    /// Everything captured so far (empty for a real console).
    pub fn captured(&self) -> String {
        match &self.captured {
            Some(buffer) => match buffer.lock() {
                Ok(text) => text.clone(),
                Err(poisoned) => poisoned.into_inner().clone(),
            },
            None => String::new(),
        }
    }

    fn capture(&self, text: &str) -> bool {
        let Some(buffer) = &self.captured else {
            return false;
        };
        match buffer.lock() {
            Ok(mut captured) => captured.push_str(text),
            Err(poisoned) => poisoned.into_inner().push_str(text),
        }
        true
    }
}

/// Formats a clock time as `H:MM:SS.s`.
pub fn format_clock_time(time: Duration) -> String {
    let total_secs = time.as_secs();
    let tenths = time.subsec_millis() / 100;
    format!(
        "{}:{:02}:{:02}.{}",
        total_secs / 3600,
        (total_secs / 60) % 60,
        total_secs % 60,
        tenths
    )
}

/// Position/duration status line, or `None` while either is unknown.
pub fn format_status_line(
    position: Option<Duration>,
    duration: Option<Duration>,
    paused: bool,
) -> Option<String> {
    let position = position?;
    let duration = duration.filter(|duration| !duration.is_zero())?;
    let suffix = if paused {
        STATUS_PAUSED.to_string()
    } else {
        " ".repeat(STATUS_PAUSED.len())
    };
    Some(format!(
        "{} / {} {}\r",
        format_clock_time(position),
        format_clock_time(duration),
        suffix
    ))
}

/// Prints the current position line. Returns `false` when the engine could
/// not report position and duration yet.
pub fn report_position(console: &Console, engine: &dyn MediaEngine, paused: bool) -> bool {
    match format_status_line(engine.query_position(), engine.query_duration(), paused) {
        Some(line) => {
            console.print(&line);
            true
        }
        None => false,
    }
}

/// Human-readable form of a playlist URI.
///
/// `file://` URIs become local paths; `pushfile://` URIs are treated as the
/// `file://` URI behind the custom scheme. Anything else is shown unchanged.
pub fn uri_display_name(uri: &str) -> String {
    let file_uri = if let Some(rest) = uri.strip_prefix("pushfile://") {
        format!("file://{}", rest)
    } else if uri.starts_with("file://") {
        uri.to_string()
    } else {
        return uri.to_string();
    };

    Url::parse(&file_uri)
        .ok()
        .and_then(|url| url.to_file_path().ok())
        .map(|path| path.display().to_string())
        .unwrap_or_else(|| uri.to_string())
}
