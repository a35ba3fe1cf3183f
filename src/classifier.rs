//! Decides which resolution path a raw reference takes. Pure and offline.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::extractor::ExtractorRegistry;

// Permissive URL grammar: scheme, then anything that is not whitespace,
// allowing balanced parentheses and refusing trailing punctuation.
const URL_PATTERN: &str = concat!(
    r"(?i)\b((?:[a-z][\w.+-]+:(?:/{1,3}|[?+]?[a-z0-9%]))",
    r"(?:[^\s()<>]|\((?:[^\s()<>]|(?:\([^\s()<>]+\)))*\))+",
    r"(?:\((?:[^\s()<>]|(?:\([^\s()<>]+\)))*\)|[^\s`!()\[\]{};:'",
    "\"",
    r".,<>?«»“”‘’]))",
);

static URL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(URL_PATTERN).expect("url pattern"));
static URL_FULL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^(?:{})$", URL_PATTERN)).expect("anchored url pattern"));
static SPOTIFY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"^https?://open\.spotify\.com/(?:[^/]+/)?",
        r"(?P<type>track|playlist|album)/(?P<code>\w+)"
    ))
    .expect("spotify pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpotifyKind {
    Track,
    Playlist,
    Album,
}

impl fmt::Display for SpotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpotifyKind::Track => "track",
            SpotifyKind::Playlist => "playlist",
            SpotifyKind::Album => "album",
        };
        f.write_str(name)
    }
}

/// A parsed `open.spotify.com` link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpotifyLink {
    pub kind: SpotifyKind,
    pub code: String,
    /// The matched part of the link, without locale-free extras such as `?si=`.
    pub url: String,
}

impl SpotifyLink {
    pub fn parse(reference: &str) -> Option<Self> {
        let captures = SPOTIFY_RE.captures(reference)?;
        let kind = match captures.name("type")?.as_str() {
            "track" => SpotifyKind::Track,
            "playlist" => SpotifyKind::Playlist,
            "album" => SpotifyKind::Album,
            _ => return None,
        };

        Some(Self {
            kind,
            code: captures.name("code")?.as_str().to_string(),
            url: captures.get(0)?.as_str().to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    /// Free text; callers search for it.
    NotUrl,
    UnknownSite,
    Spotify(SpotifyLink),
    /// Direct link to a raw media file.
    CustomFile,
    /// Handled by the extractor with this id.
    MatchedExtractor(String),
}

pub fn is_url(reference: &str) -> bool {
    URL_FULL_RE.is_match(reference)
}

/// Every URL embedded in a piece of free text, in order.
pub fn find_urls(content: &str) -> Vec<String> {
    URL_RE
        .captures_iter(content)
        .filter_map(|captures| captures.get(1))
        .map(|url| url.as_str().to_string())
        .collect()
}

pub fn classify(
    reference: &str,
    registry: &ExtractorRegistry,
    supported_extensions: &[String],
) -> Classification {
    if !is_url(reference) {
        return Classification::NotUrl;
    }

    if let Some(link) = SpotifyLink::parse(reference) {
        return Classification::Spotify(link);
    }

    if let Some(extractor) = registry.find_extractor(reference) {
        return Classification::MatchedExtractor(extractor.id().to_string());
    }

    if has_supported_extension(reference, supported_extensions) {
        return Classification::CustomFile;
    }

    Classification::UnknownSite
}

fn has_supported_extension(reference: &str, supported_extensions: &[String]) -> bool {
    let Ok(url) = url::Url::parse(reference) else {
        return false;
    };
    let path = url.path().to_lowercase();
    supported_extensions
        .iter()
        .any(|extension| !extension.is_empty() && path.ends_with(&extension.to_lowercase()))
}
