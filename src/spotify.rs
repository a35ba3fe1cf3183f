use async_trait::async_trait;
use moka::future::Cache;
use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::classifier::{SpotifyKind, SpotifyLink};
use crate::errors::{AppError, Result, SongError};
use crate::html;
use crate::http_pool::{HttpPool, PageFetcher};

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

static TITLE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(.*) - song( and lyrics)? by (.*) \| Spotify").expect("spotify title pattern")
});

/// Turns a Spotify page title into something worth searching for:
/// `"Song - song and lyrics by Artist | Spotify"` becomes `"Song Artist"`.
pub fn clean_title(title: &str) -> String {
    TITLE_RE.replace_all(title, "$1 $3").into_owned()
}

/// Paginated access to Spotify's catalog. Pages are raw API objects
/// carrying `items` and a `next` link.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn first_page(&self, kind: SpotifyKind, code: &str) -> Result<Option<Value>>;

    async fn next_page(&self, page: &Value) -> Result<Option<Value>>;
}

/// Spotify-specific resolution: track pages become search phrases,
/// playlists and albums become lists of track links.
pub struct SpotifyResolver {
    pages: Arc<dyn PageFetcher>,
    catalog: Option<Arc<dyn CatalogApi>>,
    titles: Cache<String, String>,
}

impl SpotifyResolver {
    pub fn new(
        pages: Arc<dyn PageFetcher>,
        catalog: Option<Arc<dyn CatalogApi>>,
        title_ttl: Duration,
    ) -> Self {
        Self {
            pages,
            catalog,
            titles: Cache::builder().max_capacity(1_000).time_to_live(title_ttl).build(),
        }
    }

    pub fn has_catalog(&self) -> bool {
        self.catalog.is_some()
    }

    /// Search phrase for a track link, scraped from the track page.
    pub async fn track_search_phrase(
        &self,
        link: &SpotifyLink,
    ) -> std::result::Result<String, SongError> {
        if let Some(phrase) = self.titles.get(&link.url).await {
            log::debug!("[SPOTIFY] Title cache hit for {}", link.url);
            return Ok(phrase);
        }

        let page = self.pages.fetch_page(&link.url).await.map_err(|e| {
            log::warn!("⚠️ [SPOTIFY] Could not fetch {}: {}", link.url, e);
            SongError::from(e)
        })?;
        let title = html::page_title(&page).ok_or_else(|| {
            log::warn!("⚠️ [SPOTIFY] No title on {}", link.url);
            SongError::Unsupported
        })?;

        let phrase = clean_title(&title);
        log::info!("🎵 [SPOTIFY] {} -> \"{}\"", link.url, phrase);
        self.titles.insert(link.url.clone(), phrase.clone()).await;
        Ok(phrase)
    }

    /// Track links of a playlist or album, in listing order.
    pub async fn collection_urls(
        &self,
        link: &SpotifyLink,
    ) -> std::result::Result<Vec<String>, SongError> {
        match &self.catalog {
            Some(catalog) => self.collection_from_api(catalog.as_ref(), link).await,
            None => self.collection_from_page(link).await,
        }
    }

    /// Walks every page. A failing page call discards what was collected so
    /// far; a malformed item is logged and skipped.
    async fn collection_from_api(
        &self,
        catalog: &dyn CatalogApi,
        link: &SpotifyLink,
    ) -> std::result::Result<Vec<String>, SongError> {
        let failed = |e: AppError| {
            log::error!("❌ [SPOTIFY] API returned error for {} {}: {}", link.kind, link.code, e);
            SongError::from(e)
        };

        let mut items = Vec::new();
        let mut page = match catalog.first_page(link.kind, &link.code).await.map_err(failed)? {
            Some(page) => page,
            None => {
                log::warn!("⚠️ [SPOTIFY] API returned nothing for {} {}", link.kind, link.code);
                return Ok(Vec::new());
            }
        };

        loop {
            if let Some(batch) = page.get("items").and_then(Value::as_array) {
                items.extend(batch.iter().cloned());
            }
            match catalog.next_page(&page).await.map_err(failed)? {
                Some(next) => page = next,
                None => break,
            }
        }

        let urls: Vec<String> = items.iter().filter_map(track_link).collect();
        log::info!(
            "📋 [SPOTIFY] {} {}: {} of {} tracks usable",
            link.kind,
            link.code,
            urls.len(),
            items.len()
        );
        Ok(urls)
    }

    async fn collection_from_page(
        &self,
        link: &SpotifyLink,
    ) -> std::result::Result<Vec<String>, SongError> {
        let page = self.pages.fetch_page(&link.url).await.map_err(|e| {
            log::warn!("⚠️ [SPOTIFY] Could not fetch {}: {}", link.url, e);
            SongError::from(e)
        })?;
        let urls = html::meta_contents(&page, "name", "music:song");
        log::info!("📋 [SPOTIFY] Scraped {} tracks from {}", urls.len(), link.url);
        Ok(urls)
    }
}

/// Playlist items wrap the track in `track`; album items are the track.
fn track_link(item: &Value) -> Option<String> {
    let track = item.get("track").unwrap_or(item);
    let link = track
        .get("external_urls")
        .and_then(|urls| urls.get("spotify"))
        .and_then(Value::as_str);

    if link.is_none() {
        log::warn!(
            "⚠️ [SPOTIFY] Cannot extract URL from {}: field external_urls.spotify is missing",
            item
        );
    }
    link.map(str::to_string)
}

/// Client-credentials access to the Spotify Web API.
pub struct SpotifyApi {
    pool: HttpPool,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<(String, Instant)>>,
}

impl SpotifyApi {
    pub fn new(pool: HttpPool, client_id: &str, client_secret: &str) -> Self {
        Self {
            pool,
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String> {
        let mut token = self.token.lock().await;
        if let Some((value, expires_at)) = token.as_ref() {
            if Instant::now() < *expires_at {
                return Ok(value.clone());
            }
        }

        let params = [
            ("grant_type", "client_credentials"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
        ];
        let response = self.pool.get_client().post(TOKEN_URL).form(&params).send().await?;
        if !response.status().is_success() {
            return Err(AppError::Api(format!(
                "Spotify token request failed: {}",
                response.status()
            )));
        }

        let json: Value = response.json().await?;
        let value = json["access_token"]
            .as_str()
            .ok_or_else(|| AppError::Api("No access_token in Spotify response".to_string()))?
            .to_string();
        let lifetime = json["expires_in"].as_u64().unwrap_or(3600).saturating_sub(60);

        log::debug!("[SPOTIFY] New API token, valid for {}s", lifetime);
        *token = Some((value.clone(), Instant::now() + Duration::from_secs(lifetime)));
        Ok(value)
    }

    async fn get_json(&self, url: &str) -> Result<Option<Value>> {
        let token = self.access_token().await?;
        let response = self
            .pool
            .get_client()
            .get(url)
            .header("Authorization", format!("Bearer {}", token))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(AppError::Api(format!(
                "Spotify API request failed: {} ({})",
                response.status(),
                url
            )));
        }

        let json: Value = response.json().await?;
        Ok(if json.is_null() { None } else { Some(json) })
    }
}

#[async_trait]
impl CatalogApi for SpotifyApi {
    async fn first_page(&self, kind: SpotifyKind, code: &str) -> Result<Option<Value>> {
        let url = match kind {
            SpotifyKind::Album => format!("{}/albums/{}/tracks?limit=50", API_BASE, code),
            SpotifyKind::Playlist => format!("{}/playlists/{}/tracks?limit=100", API_BASE, code),
            SpotifyKind::Track => {
                return Err(AppError::Api(format!("track {} has no track listing", code)))
            }
        };
        self.get_json(&url).await
    }

    async fn next_page(&self, page: &Value) -> Result<Option<Value>> {
        match page.get("next").and_then(Value::as_str) {
            Some(next) => self.get_json(next).await,
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Pages {
        body: &'static str,
        fetches: AtomicUsize,
    }

    impl Pages {
        fn new(body: &'static str) -> Arc<Self> {
            Arc::new(Self {
                body,
                fetches: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PageFetcher for Pages {
        async fn fetch_page(&self, _url: &str) -> Result<String> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.body.to_string())
        }
    }

    /// Serves `pages` in order; a `None` slot fails.
    struct Catalog {
        pages: Vec<Option<Value>>,
    }

    #[async_trait]
    impl CatalogApi for Catalog {
        async fn first_page(&self, _kind: SpotifyKind, _code: &str) -> Result<Option<Value>> {
            self.page(0)
        }

        async fn next_page(&self, page: &Value) -> Result<Option<Value>> {
            match page["next"].as_u64() {
                Some(index) => self.page(index as usize),
                None => Ok(None),
            }
        }
    }

    impl Catalog {
        fn page(&self, index: usize) -> Result<Option<Value>> {
            match self.pages.get(index) {
                Some(Some(page)) => Ok(Some(page.clone())),
                Some(None) => Err(AppError::Api("503 Service Unavailable".to_string())),
                None => Ok(None),
            }
        }
    }

    fn link(url: &str) -> SpotifyLink {
        SpotifyLink::parse(url).expect("spotify link")
    }

    fn item(url: &str) -> Value {
        json!({ "track": { "external_urls": { "spotify": url } } })
    }

    fn with_catalog(pages: Vec<Option<Value>>) -> SpotifyResolver {
        let catalog: Arc<dyn CatalogApi> = Arc::new(Catalog { pages });
        SpotifyResolver::new(Pages::new(""), Some(catalog), Duration::from_secs(60))
    }

    #[test]
    fn cleans_page_titles() {
        assert_eq!(
            clean_title("Never Gonna Give You Up - song and lyrics by Rick Astley | Spotify"),
            "Never Gonna Give You Up Rick Astley"
        );
        assert_eq!(clean_title("Blue - song by Eiffel 65 | Spotify"), "Blue Eiffel 65");
        assert_eq!(clean_title("Something else"), "Something else");
    }

    #[tokio::test]
    async fn track_titles_are_cached() {
        let pages = Pages::new("<title>Blue - song by Eiffel 65 | Spotify</title>");
        let spotify = SpotifyResolver::new(pages.clone(), None, Duration::from_secs(60));
        let track = link("https://open.spotify.com/track/abc");

        assert_eq!(spotify.track_search_phrase(&track).await, Ok("Blue Eiffel 65".to_string()));
        assert_eq!(spotify.track_search_phrase(&track).await, Ok("Blue Eiffel 65".to_string()));
        assert_eq!(pages.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn pages_through_api_and_skips_malformed_items() {
        let album_item =
            json!({ "external_urls": { "spotify": "https://open.spotify.com/track/2" } });
        let spotify = with_catalog(vec![
            Some(json!({
                "items": [item("https://open.spotify.com/track/1"), { "track": {} }],
                "next": 1
            })),
            Some(json!({ "items": [album_item], "next": null })),
        ]);

        let urls = spotify
            .collection_urls(&link("https://open.spotify.com/playlist/xyz"))
            .await
            .expect("urls");
        assert_eq!(
            urls,
            vec!["https://open.spotify.com/track/1", "https://open.spotify.com/track/2"]
        );
    }

    #[tokio::test]
    async fn failing_page_discards_the_batch() {
        let spotify = with_catalog(vec![
            Some(json!({ "items": [item("https://open.spotify.com/track/1")], "next": 1 })),
            None,
        ]);

        let result = spotify.collection_urls(&link("https://open.spotify.com/album/xyz")).await;
        assert!(matches!(result, Err(SongError::ResolutionFailed(_))));
    }

    #[tokio::test]
    async fn empty_api_answer_is_an_empty_list() {
        let spotify = with_catalog(vec![]);
        let urls = spotify
            .collection_urls(&link("https://open.spotify.com/album/xyz"))
            .await
            .expect("urls");
        assert!(urls.is_empty());
    }

    #[tokio::test]
    async fn scrapes_page_without_api() {
        let pages = Pages::new(
            r#"<meta name="music:song" content="https://open.spotify.com/track/1">
               <meta name="music:song" content="https://open.spotify.com/track/2">
               <meta name="music:musician" content="https://open.spotify.com/artist/3">"#,
        );
        let spotify = SpotifyResolver::new(pages, None, Duration::from_secs(60));
        assert!(!spotify.has_catalog());

        let urls = spotify
            .collection_urls(&link("https://open.spotify.com/album/xyz"))
            .await
            .expect("urls");
        assert_eq!(
            urls,
            vec!["https://open.spotify.com/track/1", "https://open.spotify.com/track/2"]
        );
    }
}
