use rand::{rngs::StdRng, Rng, SeedableRng};
use std::path::Path;

use log::{debug, info};

use crate::error::Result;
use crate::media_file_discovery::expand_entry;

/// Ordered list of URIs handed to the playback session.
pub struct Playlist {
    uris: Vec<String>,
    // StdRng instead of ThreadRng so the playlist stays Send
    rng_seed: [u8; 32],
}

impl Playlist {
    pub fn new() -> Result<Playlist> {
        let mut seed = [0u8; 32];
        getrandom::getrandom(&mut seed)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err.to_string()))?;
        Ok(Self::with_seed(seed))
    }

    pub fn with_seed(rng_seed: [u8; 32]) -> Playlist {
        Playlist {
            uris: Vec::new(),
            rng_seed,
        }
    }

    /// Adds one file, directory or URI.
    pub fn add_entry(&mut self, entry: &str) {
        debug!("Playlist: adding {}", entry);
        expand_entry(entry, &mut self.uris);
    }

    /// Adds every non-empty line of a playlist file.
    pub fn add_playlist_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path)?;
        for (line_number, line) in contents.lines().enumerate() {
            if line.is_empty() {
                continue;
            }
            debug!("Playlist[{}]: {}", line_number + 1, line);
            self.add_entry(line);
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.uris.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uris.is_empty()
    }

    pub fn uris(&self) -> &[String] {
        &self.uris
    }

    /// Fisher-Yates shuffle of the whole list.
    pub fn shuffle(&mut self) {
        let count = self.uris.len();
        if count < 2 {
            return;
        }

        let mut rng = StdRng::from_seed(self.rng_seed);
        for i in (1..count).rev() {
            let j = rng.gen_range(0..=i);
            self.uris.swap(i, j);
        }

        // Advance the seed so a second shuffle gives a different order
        for value in self.rng_seed.iter_mut() {
            *value = value.wrapping_add(1);
        }
    }

    /// Logs the final list, one `index : uri` line per entry.
    pub fn dump(&self) {
        info!("Playlist: {} entries", self.uris.len());
        for (index, uri) in self.uris.iter().enumerate() {
            info!("{:4} : {}", index, uri);
        }
    }

    pub fn into_uris(self) -> Vec<String> {
        self.uris
    }
}
