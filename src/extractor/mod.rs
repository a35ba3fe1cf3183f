pub mod registry;
pub mod suno;
pub mod ytdlp;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

use crate::config::AppConfig;
use crate::errors::ExtractError;

pub use registry::ExtractorRegistry;

/// What an extractor is asked to look up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Query {
    Url(String),
    Search { phrase: String, limit: usize },
}

impl Query {
    pub fn url(url: impl Into<String>) -> Self {
        Query::Url(url.into())
    }

    pub fn search(phrase: impl Into<String>, limit: usize) -> Self {
        Query::Search {
            phrase: phrase.into(),
            limit,
        }
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::Url(url) => write!(f, "{}", url),
            Query::Search { phrase, limit } => write!(f, "search{}:{}", limit, phrase),
        }
    }
}

/// Raw record returned by an extractor, shaped after yt-dlp's info dict.
/// A record carrying `entries` describes a playlist.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InfoDict {
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ie_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webpage_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnails: Option<Vec<ThumbnailInfo>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<InfoDict>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThumbnailInfo {
    pub url: String,
    #[serde(default)]
    pub height: Option<u64>,
    #[serde(default)]
    pub width: Option<u64>,
}

impl InfoDict {
    /// Record for a direct link to a media file: the link is both the
    /// stream and the page, and the title is the last path segment.
    pub fn direct(url: &str) -> Self {
        let title = url::Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.path().rsplit('/').next().map(str::to_string))
            .filter(|segment| !segment.is_empty());

        Self {
            url: Some(url.to_string()),
            webpage_url: Some(url.to_string()),
            title,
            ..Self::default()
        }
    }

    pub fn is_playlist(&self) -> bool {
        self.entries.is_some()
    }
}

/// Settings applied to every extraction call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    pub format: String,
    /// Return lightweight playlist entries instead of resolving each one.
    pub flat_playlist: bool,
    pub no_playlist: bool,
    /// What the back-end does with input that is not a URL. `error` keeps it
    /// from searching on its own.
    pub default_search: String,
    pub cookie_path: Option<PathBuf>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            format: "bestaudio/best".to_string(),
            flat_playlist: true,
            no_playlist: true,
            default_search: "error".to_string(),
            cookie_path: None,
        }
    }
}

impl ExtractOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            cookie_path: config.cookie_path.clone(),
            ..Self::default()
        }
    }
}

/// A site handler able to recognise and extract a class of URLs.
///
/// `extract` may block or take arbitrarily long; it is only ever called
/// from the extraction worker.
#[async_trait]
pub trait Extractor: Send + Sync {
    fn id(&self) -> &str;

    /// Identity of the back-end module. Calls into the same back-end are
    /// serialised by the worker, so handlers sharing state must share this.
    fn backend(&self) -> &str {
        self.id()
    }

    fn suitable(&self, url: &str) -> bool;

    /// Catch-all handlers are skipped by registry lookups.
    fn is_generic(&self) -> bool {
        false
    }

    async fn extract(
        &self,
        query: &Query,
        options: &ExtractOptions,
    ) -> Result<InfoDict, ExtractError>;
}

type ExtractorFactory = Box<dyn Fn() -> Result<Arc<dyn Extractor>, ExtractError> + Send + Sync>;

/// Defers building an extractor until its first extraction. URL matching
/// uses the pattern given up front, and the back-end identity is declared
/// up front too so the lazy and eager forms share one worker lock.
///
/// A failed build is reported by that extraction and retried on the next.
pub struct LazyExtractor {
    id: String,
    backend: String,
    pattern: regex::Regex,
    factory: ExtractorFactory,
    loaded: OnceLock<Arc<dyn Extractor>>,
}

impl LazyExtractor {
    pub fn new<F>(id: &str, backend: &str, pattern: regex::Regex, factory: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Extractor>, ExtractError> + Send + Sync + 'static,
    {
        Self {
            id: id.to_string(),
            backend: backend.to_string(),
            pattern,
            factory: Box::new(factory),
            loaded: OnceLock::new(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.get().is_some()
    }

    fn real(&self) -> Result<&Arc<dyn Extractor>, ExtractError> {
        if let Some(extractor) = self.loaded.get() {
            return Ok(extractor);
        }

        log::debug!("[EXTRACTOR] Loading lazy extractor {}", self.id);
        let extractor = (self.factory)()?;
        Ok(self.loaded.get_or_init(|| extractor))
    }
}

#[async_trait]
impl Extractor for LazyExtractor {
    fn id(&self) -> &str {
        &self.id
    }

    fn backend(&self) -> &str {
        &self.backend
    }

    fn suitable(&self, url: &str) -> bool {
        self.pattern.is_match(url)
    }

    async fn extract(
        &self,
        query: &Query,
        options: &ExtractOptions,
    ) -> Result<InfoDict, ExtractError> {
        self.real()?.extract(query, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl Extractor for Fixed {
        fn id(&self) -> &str {
            "fixed"
        }

        fn backend(&self) -> &str {
            "fixed-module"
        }

        fn suitable(&self, url: &str) -> bool {
            url.starts_with("https://fixed.test/")
        }

        async fn extract(
            &self,
            _query: &Query,
            _options: &ExtractOptions,
        ) -> Result<InfoDict, ExtractError> {
            Ok(InfoDict {
                title: Some("fixed".to_string()),
                ..InfoDict::default()
            })
        }
    }

    #[tokio::test]
    async fn lazy_extractor_loads_on_first_extraction() {
        let lazy = LazyExtractor::new(
            "fixed",
            "fixed-module",
            regex::Regex::new(r"^https://fixed\.test/").expect("pattern"),
            || Ok(Arc::new(Fixed) as Arc<dyn Extractor>),
        );

        assert!(lazy.suitable("https://fixed.test/song"));
        assert!(!lazy.is_loaded());
        assert_eq!(lazy.backend(), Fixed.backend());

        let info = lazy
            .extract(&Query::url("https://fixed.test/song"), &ExtractOptions::default())
            .await
            .expect("extract");
        assert_eq!(info.title.as_deref(), Some("fixed"));
        assert!(lazy.is_loaded());
    }

    #[tokio::test]
    async fn failed_build_surfaces_and_is_retried() {
        let attempts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = attempts.clone();
        let lazy = LazyExtractor::new(
            "fixed",
            "fixed-module",
            regex::Regex::new(r"^https://fixed\.test/").expect("pattern"),
            move || {
                if counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0 {
                    Err(ExtractError::Unavailable("bad proxy".to_string()))
                } else {
                    Ok(Arc::new(Fixed) as Arc<dyn Extractor>)
                }
            },
        );
        let query = Query::url("https://fixed.test/song");

        let first = lazy.extract(&query, &ExtractOptions::default()).await;
        assert!(matches!(first, Err(ExtractError::Unavailable(_))));
        assert!(!lazy.is_loaded());

        let second = lazy.extract(&query, &ExtractOptions::default()).await.expect("extract");
        assert_eq!(second.title.as_deref(), Some("fixed"));
        assert!(lazy.is_loaded());
        assert_eq!(attempts.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn direct_record_uses_last_path_segment() {
        let info = InfoDict::direct("https://files.example.com/music/My%20Song.mp3?dl=1");
        assert_eq!(info.url.as_deref(), Some("https://files.example.com/music/My%20Song.mp3?dl=1"));
        assert_eq!(info.webpage_url, info.url);
        assert_eq!(info.title.as_deref(), Some("My%20Song.mp3"));
        assert!(!info.is_playlist());
    }

    #[test]
    fn info_dict_parses_flat_playlist() {
        let json = r#"{
            "_type": "playlist",
            "id": "PL1",
            "title": "Mix",
            "webpage_url": "https://www.youtube.com/playlist?list=PL1",
            "entries": [
                {"_type": "url", "ie_key": "Youtube",
                 "url": "https://www.youtube.com/watch?v=aaaaaaaaaaa",
                 "title": "One", "duration": 61},
                {"_type": "url", "url": "https://www.youtube.com/watch?v=bbbbbbbbbbb",
                 "title": "Two", "view_count": 5}
            ]
        }"#;
        let info: InfoDict = serde_json::from_str(json).expect("parse");
        assert!(info.is_playlist());
        let entries = info.entries.expect("entries");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].duration, Some(61.0));
        assert_eq!(entries[1].title.as_deref(), Some("Two"));
    }
}
