use async_trait::async_trait;
use regex::Regex;
use std::sync::{Arc, LazyLock};

use crate::config::HttpConfig;
use crate::errors::{AppError, ExtractError};
use crate::html;
use crate::http_pool::{HttpPool, PageFetcher};
use super::{ExtractOptions, Extractor, InfoDict, LazyExtractor, Query};

pub const SUNO_PATTERN: &str = r"^https?://(?:app\.suno\.ai|suno\.com)/song/(?P<code>[\w-]+)";

static SUNO_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(SUNO_PATTERN).expect("suno pattern"));
static TITLE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" \| Suno$").expect("suffix pattern"));

/// Reads a Suno song page: the audio link comes from `og:audio`.
pub struct SunoExtractor {
    pages: Arc<dyn PageFetcher>,
}

impl SunoExtractor {
    pub fn new(pages: Arc<dyn PageFetcher>) -> Self {
        Self { pages }
    }

    /// Registered form: the HTTP client is only built on first use, and a
    /// client that cannot be built fails that extraction.
    pub fn lazy(http: HttpConfig) -> LazyExtractor {
        LazyExtractor::new("suno", "suno", SUNO_RE.clone(), move || {
            let pool = HttpPool::unpooled(&http)
                .map_err(|e| ExtractError::Unavailable(format!("suno HTTP client: {}", e)))?;
            Ok(Arc::new(SunoExtractor::new(Arc::new(pool))) as Arc<dyn Extractor>)
        })
    }
}

#[async_trait]
impl Extractor for SunoExtractor {
    fn id(&self) -> &str {
        "suno"
    }

    fn suitable(&self, url: &str) -> bool {
        SUNO_RE.is_match(url)
    }

    async fn extract(
        &self,
        query: &Query,
        _options: &ExtractOptions,
    ) -> Result<InfoDict, ExtractError> {
        let Query::Url(url) = query else {
            return Err(ExtractError::Unsupported(query.to_string()));
        };
        let code = SUNO_RE
            .captures(url)
            .and_then(|captures| captures.name("code"))
            .map(|code| code.as_str().to_string())
            .ok_or_else(|| ExtractError::Unsupported(url.clone()))?;

        let page = self.pages.fetch_page(url).await.map_err(|e| match e {
            AppError::Http(e) => ExtractError::Http(e),
            other => ExtractError::Process(other.to_string()),
        })?;

        let audio = html::meta_content(&page, "property", "og:audio")
            .ok_or_else(|| ExtractError::Parse("og:audio missing".to_string()))?;
        let title = html::page_title(&page)
            .map(|title| TITLE_SUFFIX_RE.replace(&title, "").into_owned());

        Ok(InfoDict {
            id: Some(code),
            url: Some(audio),
            title,
            thumbnail: html::meta_content(&page, "property", "og:image"),
            ..InfoDict::default()
        })
    }
}
