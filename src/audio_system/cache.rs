/// Sound buffer cache
///
/// Decoded buffers are kept for the life of the cache. Concurrent requests
/// for a URL that is still loading join the same pending load, so each URL is
/// fetched and decoded at most once at a time.
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use super::buffer::SoundBuffer;
use super::fetch::AssetFetcher;
use super::synth;
use crate::error::LoadError;

type LoadOutcome = Option<Result<Arc<SoundBuffer>, LoadError>>;

/// Shared in-flight load; resolves once to the buffer or the error
type PendingLoad = watch::Receiver<LoadOutcome>;

#[derive(Default)]
struct CacheState {
    ready: HashMap<String, Arc<SoundBuffer>>,
    pending: HashMap<String, PendingLoad>,
}

#[derive(Clone)]
pub struct BufferCache {
    fetcher: Arc<dyn AssetFetcher>,
    state: Arc<Mutex<CacheState>>,
}

impl BufferCache {
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self {
            fetcher,
            state: Arc::new(Mutex::new(CacheState::default())),
        }
    }

    /// Return the decoded buffer for `url`, loading it if needed
    pub async fn load(&self, url: &str) -> Result<Arc<SoundBuffer>, LoadError> {
        let mut pending = {
            let mut state = self.state.lock();
            if let Some(buffer) = state.ready.get(url) {
                return Ok(Arc::clone(buffer));
            }
            match state.pending.get(url) {
                Some(pending) => {
                    tracing::trace!("Joining pending load for {}", url);
                    pending.clone()
                }
                None => {
                    let (tx, rx) = watch::channel(None);
                    state.pending.insert(url.to_string(), rx.clone());
                    self.spawn_load(url.to_string(), tx);
                    rx
                }
            }
        };

        let outcome = match pending.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };

        outcome.unwrap_or_else(|| {
            Err(LoadError::Abandoned {
                url: url.to_string(),
            })
        })
    }

    /// Whether `url` has a decoded buffer ready
    pub fn is_cached(&self, url: &str) -> bool {
        self.state.lock().ready.contains_key(url)
    }

    pub fn cached_count(&self) -> usize {
        self.state.lock().ready.len()
    }

    pub fn pending_count(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn spawn_load(&self, url: String, tx: watch::Sender<LoadOutcome>) {
        let fetcher = Arc::clone(&self.fetcher);
        let state = Arc::clone(&self.state);

        // Runs detached so waiters still get a result if the first caller goes away
        tokio::spawn(async move {
            let result = fetch_and_decode(fetcher.as_ref(), &url).await.map(Arc::new);

            match &result {
                Ok(buffer) => tracing::debug!(
                    "Loaded {} ({} ch, {} Hz, {:.1}s)",
                    url,
                    buffer.channels(),
                    buffer.sample_rate(),
                    buffer.duration().as_secs_f32()
                ),
                Err(err) => tracing::warn!("Failed to load sound {}: {}", url, err),
            }

            {
                let mut state = state.lock();
                state.pending.remove(&url);
                if let Ok(buffer) = &result {
                    state.ready.insert(url.clone(), Arc::clone(buffer));
                }
            }

            tx.send_replace(Some(result));
        });
    }
}

async fn fetch_and_decode(fetcher: &dyn AssetFetcher, url: &str) -> Result<SoundBuffer, LoadError> {
    if url.starts_with(synth::SYNTH_SCHEME) {
        return synth::render(url).ok_or_else(|| LoadError::Decode {
            url: url.to_string(),
            reason: "unknown synthesized sound".to_string(),
        });
    }

    let bytes = fetcher.fetch(url).await?;

    let source = url.to_string();
    tokio::task::spawn_blocking(move || SoundBuffer::decode(&source, bytes))
        .await
        .map_err(|e| LoadError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_system::fetch::MemoryFetcher;
    use crate::audio_system::test_support::wav_bytes;
    use std::time::Duration;

    fn cache_with(fetcher: &MemoryFetcher) -> BufferCache {
        BufferCache::new(Arc::new(fetcher.clone()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_loads_share_one_fetch() {
        let fetcher = MemoryFetcher::new().with_latency(Duration::from_millis(300));
        fetcher.insert("/track.wav", wav_bytes(8_000, 1, 0.25));
        let cache = cache_with(&fetcher);

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { cache.load("/track.wav").await })
            })
            .collect();

        let mut buffers = Vec::new();
        for task in tasks {
            buffers.push(task.await.unwrap().unwrap());
        }

        assert_eq!(fetcher.fetch_count("/track.wav"), 1);
        assert!(buffers.iter().all(|b| Arc::ptr_eq(b, &buffers[0])));
        assert!(cache.is_cached("/track.wav"));
        assert_eq!(cache.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_buffer_is_returned_without_fetching() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("/track.wav", wav_bytes(8_000, 1, 0.25));
        let cache = cache_with(&fetcher);

        let first = cache.load("/track.wav").await.unwrap();
        let second = cache.load("/track.wav").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(fetcher.fetch_count("/track.wav"), 1);
        assert_eq!(cache.cached_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_reaches_every_waiter_and_is_not_cached() {
        let fetcher = MemoryFetcher::new().with_latency(Duration::from_millis(100));
        let cache = cache_with(&fetcher);

        let (a, b) = tokio::join!(cache.load("/missing.wav"), cache.load("/missing.wav"));
        assert!(matches!(a, Err(LoadError::Status { status: 404, .. })));
        assert_eq!(a.unwrap_err(), b.unwrap_err());
        assert_eq!(fetcher.fetch_count("/missing.wav"), 1);

        // A later request starts over once the asset exists
        fetcher.insert("/missing.wav", wav_bytes(8_000, 1, 0.1));
        assert!(cache.load("/missing.wav").await.is_ok());
        assert_eq!(fetcher.fetch_count("/missing.wav"), 2);
    }

    #[tokio::test]
    async fn test_undecodable_payload_is_a_load_error() {
        let fetcher = MemoryFetcher::new();
        fetcher.insert("/noise.mp3", vec![7; 128]);
        let cache = cache_with(&fetcher);

        assert!(matches!(
            cache.load("/noise.mp3").await,
            Err(LoadError::Decode { .. })
        ));
        assert!(!cache.is_cached("/noise.mp3"));
    }

    #[tokio::test]
    async fn test_synth_urls_render_without_fetching() {
        let fetcher = MemoryFetcher::new();
        let cache = cache_with(&fetcher);

        let modem = cache.load("synth:modem").await.unwrap();
        assert_eq!(modem.channels(), 1);
        assert_eq!(fetcher.total_fetches(), 0);
        assert!(cache.load("synth:whale").await.is_err());
    }
}
