use async_trait::async_trait;
use std::sync::Arc;

use crate::classifier::{classify, Classification, SpotifyKind};
use crate::errors::SongError;
use crate::extractor::{Extractor, ExtractorRegistry, InfoDict, Query};
use crate::song::{Host, Origin, Song};
use crate::spotify::SpotifyResolver;
use crate::worker::ExtractionWorker;

/// Outcome of resolving one reference.
#[derive(Debug, Clone)]
pub enum Resolved {
    Single(Song),
    Playlist(Vec<Song>),
}

impl Resolved {
    pub fn into_songs(self) -> Vec<Song> {
        match self {
            Resolved::Single(song) => vec![song],
            Resolved::Playlist(songs) => songs,
        }
    }
}

/// Anything able to turn a raw reference into songs.
#[async_trait]
pub trait SongSource: Send + Sync {
    async fn resolve(&self, reference: &str) -> Result<Resolved, SongError>;
}

/// Classifies references, dispatches them to the right path and
/// normalises whatever comes back into `Song`s.
pub struct Resolver {
    registry: Arc<ExtractorRegistry>,
    worker: Arc<ExtractionWorker>,
    spotify: SpotifyResolver,
    supported_extensions: Vec<String>,
}

impl Resolver {
    pub fn new(
        registry: Arc<ExtractorRegistry>,
        worker: Arc<ExtractionWorker>,
        spotify: SpotifyResolver,
        supported_extensions: Vec<String>,
    ) -> Self {
        Self {
            registry,
            worker,
            spotify,
            supported_extensions,
        }
    }

    /// Up to `count` search hits for a phrase, each keyed by its own link.
    /// Hits are left unresolved; their stream URLs come from a later pass.
    pub async fn search(&self, phrase: &str, count: usize) -> Result<Vec<Song>, SongError> {
        let search = self.registry.search_extractor().clone();
        let host = Host::Extractor(search.id().to_string());
        let data = self
            .worker
            .extract(Query::search(phrase, count.max(1)), search)
            .await
            .ok_or(SongError::Unsupported)?;

        let songs: Vec<Song> = data
            .entries
            .unwrap_or_default()
            .into_iter()
            .filter_map(|mut entry| {
                let link = entry.url.take()?;
                entry.webpage_url = None;
                let mut song = Song::new(Origin::Default, host.clone(), link);
                song.merge_info(&entry);
                Some(song)
            })
            .collect();

        log::info!("🔍 [RESOLVE] \"{}\": {} result(s)", phrase, songs.len());
        Ok(songs)
    }

    async fn first_search_hit(&self, phrase: &str) -> Result<InfoDict, SongError> {
        let search = self.registry.search_extractor().clone();
        let data = self
            .worker
            .extract(Query::search(phrase, 1), search)
            .await
            .ok_or(SongError::Unsupported)?;

        data.entries
            .and_then(|entries| entries.into_iter().next())
            .ok_or_else(|| {
                log::info!("🔍 [RESOLVE] No search results for \"{}\"", phrase);
                SongError::Unsupported
            })
    }

    async fn fetch(
        &self,
        reference: &str,
        classification: Classification,
    ) -> Result<(Host, InfoDict), SongError> {
        match classification {
            Classification::NotUrl => {
                let host = Host::Extractor(self.registry.search_extractor().id().to_string());
                Ok((host, self.first_search_hit(reference).await?))
            }
            Classification::UnknownSite => Err(SongError::Unsupported),
            Classification::Spotify(link) => match link.kind {
                SpotifyKind::Track => {
                    let phrase = self.spotify.track_search_phrase(&link).await?;
                    Ok((Host::Spotify, self.first_search_hit(&phrase).await?))
                }
                SpotifyKind::Playlist | SpotifyKind::Album => {
                    let entries = self
                        .spotify
                        .collection_urls(&link)
                        .await?
                        .into_iter()
                        .map(|url| InfoDict {
                            url: Some(url),
                            ..InfoDict::default()
                        })
                        .collect();
                    let data = InfoDict {
                        entries: Some(entries),
                        ..InfoDict::default()
                    };
                    Ok((Host::Spotify, data))
                }
            },
            Classification::CustomFile => Ok((Host::Custom, InfoDict::direct(reference))),
            Classification::MatchedExtractor(id) => {
                let extractor = self.registry.get(&id).ok_or(SongError::Unsupported)?;
                let data = self
                    .worker
                    .extract(Query::url(reference), extractor)
                    .await
                    .ok_or(SongError::Unsupported)?;
                Ok((Host::Extractor(id), data))
            }
        }
    }

    async fn normalize(
        &self,
        reference: &str,
        host: Host,
        mut data: InfoDict,
    ) -> Result<Resolved, SongError> {
        if let Some(entries) = data.entries.take() {
            return playlist_songs(host, entries).map(Resolved::Playlist);
        }

        // The result may point at a video page rather than a stream.
        let video = self.registry.video_extractor();
        if host != Host::Custom {
            if let Some(url) = data.url.clone().filter(|url| video.suitable(url)) {
                log::debug!("[RESOLVE] {} still needs extraction via {}", url, video.id());
                data = self
                    .worker
                    .extract(Query::url(url), video.clone())
                    .await
                    .ok_or(SongError::Unsupported)?;
            }
        }

        if data.url.as_deref().map_or(true, str::is_empty) {
            log::warn!("⚠️ [RESOLVE] No stream URL for {}", reference);
            return Err(SongError::Unsupported);
        }

        let mut song = Song::new(Origin::Default, host, reference);
        song.merge_info(&data);
        Ok(Resolved::Single(song))
    }
}

/// Entries become playlist songs keyed by their own link. The link is not a
/// stream yet, so `url` stays unset until the song is preloaded.
fn playlist_songs(host: Host, entries: Vec<InfoDict>) -> Result<Vec<Song>, SongError> {
    let total = entries.len();
    let songs: Vec<Song> = entries
        .into_iter()
        .filter_map(|mut entry| {
            let Some(link) = entry.url.take().filter(|url| !url.is_empty()) else {
                log::warn!(
                    "⚠️ [RESOLVE] Skipping playlist entry without a link: {:?}",
                    entry.title
                );
                return None;
            };
            entry.webpage_url = None;
            let mut song = Song::new(Origin::Playlist, host.clone(), link);
            song.merge_info(&entry);
            Some(song)
        })
        .collect();

    if songs.is_empty() {
        log::info!("📋 [RESOLVE] Playlist had no usable entries ({} listed)", total);
        return Err(SongError::Unsupported);
    }
    Ok(songs)
}

#[async_trait]
impl SongSource for Resolver {
    async fn resolve(&self, reference: &str) -> Result<Resolved, SongError> {
        let classification = classify(reference, &self.registry, &self.supported_extensions);
        log::debug!("[CLASSIFY] {} -> {:?}", reference, classification);

        let (host, data) = self.fetch(reference, classification).await?;
        let resolved = self.normalize(reference, host, data).await?;

        match &resolved {
            Resolved::Single(song) => log::info!(
                "✅ [RESOLVE] {} -> {}",
                reference,
                song.title.as_deref().unwrap_or("untitled")
            ),
            Resolved::Playlist(songs) => {
                log::info!("✅ [RESOLVE] {} -> {} songs", reference, songs.len())
            }
        }
        Ok(resolved)
    }
}
