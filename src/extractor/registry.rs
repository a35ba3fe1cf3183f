use std::sync::Arc;

use crate::config::AppConfig;
use crate::errors::Result;
use super::suno::SunoExtractor;
use super::ytdlp::YtDlpExtractor;
use super::Extractor;

/// The set of site handlers, populated once at startup and read-only after.
///
/// Two handlers are designated: the one used for text searches and the
/// canonical video handler used when an extraction hands back a reference
/// to a video rather than a playable stream.
pub struct ExtractorRegistry {
    extractors: Vec<Arc<dyn Extractor>>,
    search: Arc<dyn Extractor>,
    video: Arc<dyn Extractor>,
}

impl ExtractorRegistry {
    /// Both designated handlers are registered as well, searched in the
    /// order given here.
    pub fn new(search: Arc<dyn Extractor>, video: Arc<dyn Extractor>) -> Self {
        Self {
            extractors: vec![video.clone(), search.clone()],
            search,
            video,
        }
    }

    /// The stock handler set: yt-dlp site handlers, the Suno page reader
    /// and the yt-dlp catch-all.
    pub fn standard(config: &AppConfig) -> Result<Self> {
        let ytdlp = |extractor: YtDlpExtractor| -> Arc<dyn Extractor> {
            Arc::new(extractor.with_ytdlp_path(config.ytdlp_path.clone()))
        };

        let mut registry = Self::new(
            ytdlp(YtDlpExtractor::youtube_search()?),
            ytdlp(YtDlpExtractor::youtube()?),
        )
        .register(ytdlp(YtDlpExtractor::youtube_tab()?));
        for handler in YtDlpExtractor::site_handlers()? {
            registry = registry.register(ytdlp(handler));
        }
        registry = registry
            .register(Arc::new(SunoExtractor::lazy(config.http.clone())))
            .register(ytdlp(YtDlpExtractor::generic()?));

        log::info!("✅ [REGISTRY] {} extractors registered", registry.len());
        Ok(registry)
    }

    pub fn register(mut self, extractor: Arc<dyn Extractor>) -> Self {
        log::debug!(
            "[REGISTRY] Registered extractor {} (backend {})",
            extractor.id(),
            extractor.backend()
        );
        self.extractors.push(extractor);
        self
    }

    /// First handler claiming the URL, ignoring catch-all handlers.
    pub fn find_extractor(&self, url: &str) -> Option<Arc<dyn Extractor>> {
        self.extractors
            .iter()
            .find(|extractor| !extractor.is_generic() && extractor.suitable(url))
            .cloned()
    }

    pub fn get(&self, id: &str) -> Option<Arc<dyn Extractor>> {
        self.extractors.iter().find(|extractor| extractor.id() == id).cloned()
    }

    pub fn search_extractor(&self) -> &Arc<dyn Extractor> {
        &self.search
    }

    pub fn video_extractor(&self) -> &Arc<dyn Extractor> {
        &self.video
    }

    pub fn ids(&self) -> Vec<&str> {
        self.extractors.iter().map(|extractor| extractor.id()).collect()
    }

    pub fn len(&self) -> usize {
        self.extractors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extractors.is_empty()
    }
}
