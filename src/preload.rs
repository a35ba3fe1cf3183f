//! Keeps stream URLs valid ahead of playback. Stream links from most hosts
//! carry an `expire` timestamp; a song is re-resolved only once that has
//! passed, and concurrent requests for one song share a single resolution.

use futures::future::{BoxFuture, Shared};
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use crate::resolver::{Resolved, SongSource};
use crate::song::Song;

type Pending = Shared<BoxFuture<'static, Option<Song>>>;

/// Unix timestamp carried in the `expire` query parameter, if any.
pub fn parse_expire(url: &str) -> Option<i64> {
    let url = url::Url::parse(url).ok()?;
    let (_, value) = url.query_pairs().find(|(key, _)| key == "expire")?;
    value.parse().ok()
}

/// Whether a resolved stream URL can still be used as is.
pub fn is_fresh(song: &Song, now: i64) -> bool {
    let Some(url) = song.url.as_deref() else {
        return false;
    };
    match parse_expire(url) {
        None => true,
        // Re-resolving the canonical reference would hand back the same link.
        Some(expire) if Some(expire) == parse_expire(song.webpage_url()) => true,
        Some(expire) => expire > now,
    }
}

pub struct PreloadCache {
    source: Arc<dyn SongSource>,
    in_flight: Arc<Mutex<HashMap<String, Pending>>>,
}

impl PreloadCache {
    pub fn new(source: Arc<dyn SongSource>) -> Self {
        Self {
            source,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Makes sure `song` has a usable stream URL, re-resolving its canonical
    /// reference when the current one is missing or expired. Returns whether
    /// the song ends up playable.
    pub async fn ensure_fresh(&self, song: &mut Song) -> bool {
        if song.webpage_url().is_empty() {
            return true;
        }
        if is_fresh(song, chrono::Utc::now().timestamp()) {
            return true;
        }

        match self.pending(song.webpage_url()).await {
            Some(fresh) => {
                song.merge_song(&fresh);
                true
            }
            None => false,
        }
    }

    /// Number of re-resolutions currently running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Joins the running resolution for `key`, or starts one. The lookup and
    /// the insert happen under one lock.
    fn pending(&self, key: &str) -> Pending {
        let mut table = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pending) = table.get(key) {
            log::debug!("[PRELOAD] Joining in-flight resolution of {}", key);
            return pending.clone();
        }

        log::info!("🔄 [PRELOAD] Re-resolving {}", key);
        let source = self.source.clone();
        let in_flight = self.in_flight.clone();
        let reference = key.to_string();

        // Spawned so that a caller giving up does not cancel it for the others.
        let task = tokio::spawn(async move {
            let resolution = AssertUnwindSafe(source.resolve(&reference)).catch_unwind().await;
            let outcome = match resolution {
                Ok(Ok(Resolved::Single(song))) => Some(song),
                Ok(Ok(Resolved::Playlist(songs))) => {
                    log::warn!(
                        "⚠️ [PRELOAD] {} resolved to {} songs, expected one",
                        reference,
                        songs.len()
                    );
                    None
                }
                Ok(Err(e)) => {
                    log::warn!("⚠️ [PRELOAD] Could not re-resolve {}: {}", reference, e);
                    None
                }
                Err(_) => {
                    log::error!("❌ [PRELOAD] Resolution of {} panicked", reference);
                    None
                }
            };
            in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&reference);
            outcome
        });

        let pending = async move { task.await.ok().flatten() }.boxed().shared();
        table.insert(key.to_string(), pending.clone());
        pending
    }
}
