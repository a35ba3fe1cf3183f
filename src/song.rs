use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

use crate::extractor::InfoDict;

/// Whether a song was asked for directly or came out of a playlist/album.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Origin {
    Default,
    Playlist,
}

/// Which resolution path produced a song.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Host {
    Spotify,
    /// Produced by the extractor with this id.
    Extractor(String),
    Custom,
    Unknown,
}

/// A resolved or partially resolved playable item.
///
/// Identity is the canonical `webpage_url`; two songs with the same
/// canonical reference compare equal whatever their other fields hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Song {
    pub origin: Origin,
    pub host: Host,
    webpage_url: String,
    pub url: Option<String>,
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub duration_seconds: Option<u64>,
    pub thumbnail_url: Option<String>,
}

impl Song {
    pub fn new(origin: Origin, host: Host, webpage_url: impl Into<String>) -> Self {
        Self {
            origin,
            host,
            webpage_url: webpage_url.into(),
            url: None,
            title: None,
            uploader: None,
            duration_seconds: None,
            thumbnail_url: None,
        }
    }

    pub fn webpage_url(&self) -> &str {
        &self.webpage_url
    }

    /// Merges a freshly extracted record. Non-empty values replace what is
    /// there, empty values never clear anything. When a thumbnail set is
    /// present its last entry (the largest) wins over the single thumbnail.
    pub fn merge_info(&mut self, info: &InfoDict) {
        let thumbnail = info
            .thumbnails
            .as_ref()
            .and_then(|thumbnails| thumbnails.last())
            .map(|thumbnail| thumbnail.url.as_str())
            .or(info.thumbnail.as_deref());

        assign(&mut self.url, info.url.as_deref());
        assign(&mut self.title, info.title.as_deref());
        assign(&mut self.uploader, info.uploader.as_deref());
        assign(&mut self.thumbnail_url, thumbnail);

        if let Some(duration) = info.duration {
            let seconds = duration.round();
            if seconds >= 1.0 {
                self.duration_seconds = Some(seconds as u64);
            }
        }
    }

    /// Merges the fields of another resolution of the same reference.
    /// Origin, host and the canonical reference are left as they are.
    pub fn merge_song(&mut self, other: &Song) {
        assign(&mut self.url, other.url.as_deref());
        assign(&mut self.title, other.title.as_deref());
        assign(&mut self.uploader, other.uploader.as_deref());
        assign(&mut self.thumbnail_url, other.thumbnail_url.as_deref());
        if let Some(duration) = other.duration_seconds.filter(|seconds| *seconds > 0) {
            self.duration_seconds = Some(duration);
        }
    }
}

fn assign(slot: &mut Option<String>, value: Option<&str>) {
    if let Some(value) = value.filter(|value| !value.is_empty()) {
        *slot = Some(value.to_string());
    }
}

impl PartialEq for Song {
    fn eq(&self, other: &Self) -> bool {
        self.webpage_url == other.webpage_url
    }
}

impl Eq for Song {}

impl Hash for Song {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.webpage_url.hash(state);
    }
}
