use std::{
    cmp::Ordering,
    path::{Path, PathBuf},
};

use log::{debug, warn};
use url::Url;

/// Shortest scheme accepted as a URI; rules out `C:\` style drive letters.
const MIN_SCHEME_LEN: usize = 2;

/// `true` when `entry` looks like `scheme://...`.
pub fn is_uri(entry: &str) -> bool {
    let Some((scheme, _)) = entry.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    let starts_alpha = chars
        .next()
        .map(|first| first.is_ascii_alphabetic())
        .unwrap_or(false);
    starts_alpha
        && scheme.len() >= MIN_SCHEME_LEN
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum CollationPart {
    /// Digit run without leading zeros, ordered by length then digits.
    Number(usize, String),
    Text(String),
}

fn collation_key(name: &str) -> Vec<CollationPart> {
    let mut parts = Vec::new();
    let mut chars = name.chars().peekable();

    while let Some(&c) = chars.peek() {
        let is_digit = c.is_ascii_digit();
        let mut run = String::new();
        while let Some(&next) = chars.peek() {
            if next.is_ascii_digit() != is_digit {
                break;
            }
            run.push(next);
            chars.next();
        }

        if is_digit {
            let trimmed = run.trim_start_matches('0');
            let digits = if trimmed.is_empty() { "0" } else { trimmed };
            parts.push(CollationPart::Number(digits.len(), digits.to_string()));
        } else {
            parts.push(CollationPart::Text(run.to_lowercase()));
        }
    }
    parts
}

/// Filename ordering: case-insensitive, digit runs compared numerically.
pub fn compare_filenames(a: &str, b: &str) -> Ordering {
    collation_key(a)
        .cmp(&collation_key(b))
        .then_with(|| a.cmp(b))
}

/// Entries of `directory` sorted by [`compare_filenames`].
pub fn sorted_directory_entries(directory: &Path) -> Vec<PathBuf> {
    let entries = match std::fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(err) => {
            debug!("Failed to read directory {}: {}", directory.display(), err);
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry.path()),
            Err(err) => {
                debug!(
                    "Failed to read a directory entry in {}: {}",
                    directory.display(),
                    err
                );
                None
            }
        })
        .collect();
    paths.sort_by(|a, b| compare_filenames(&a.to_string_lossy(), &b.to_string_lossy()));
    paths
}

/// `file://` URI for a local path, resolved against the working directory.
pub fn file_path_to_uri(path: &Path) -> Option<String> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        match std::env::current_dir() {
            Ok(cwd) => cwd.join(path),
            Err(err) => {
                warn!("Could not resolve working directory: {}", err);
                return None;
            }
        }
    };
    Url::from_file_path(&absolute)
        .ok()
        .map(|url| url.to_string())
}

/// Expands one playlist entry into URIs, appending them to `uris`.
///
/// URIs pass through untouched; directories expand recursively in filename
/// order; anything else is treated as a local file.
pub fn expand_entry(entry: &str, uris: &mut Vec<String>) {
    if is_uri(entry) {
        uris.push(entry.to_string());
        return;
    }

    let path = Path::new(entry);
    if path.is_dir() {
        for child in sorted_directory_entries(path) {
            expand_entry(&child.to_string_lossy(), uris);
        }
        return;
    }

    match file_path_to_uri(path) {
        Some(uri) => uris.push(uri),
        None => warn!("Could not make URI out of filename '{}'", entry),
    }
}
