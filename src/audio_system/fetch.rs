/// Asset fetching
///
/// Fetchers turn a registry URL into raw encoded bytes. Decoding happens
/// afterwards in the buffer cache.
use std::collections::HashMap;
use std::future::Future;
use std::io::Read;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::error::LoadError;

/// Upper bound on a single asset download
const MAX_ASSET_BYTES: u64 = 64 * 1024 * 1024;

pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Vec<u8>, LoadError>> + Send + 'static>>;

/// Source of encoded audio bytes
pub trait AssetFetcher: Send + Sync + 'static {
    fn fetch(&self, url: &str) -> FetchFuture;
}

/// Fetches assets with HTTP GET relative to a base URL
pub struct HttpFetcher {
    base_url: String,
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        let user_agent = format!("Blockfall/{}", env!("CARGO_PKG_VERSION"));
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(30))
            .user_agent(&user_agent)
            .build();

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            agent,
        }
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.base_url, url.trim_start_matches('/'))
        }
    }
}

impl AssetFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> FetchFuture {
        let key = url.to_string();
        let target = self.resolve(url);
        let agent = self.agent.clone();

        Box::pin(async move {
            let blocking_key = key.clone();
            tokio::task::spawn_blocking(move || http_get(&agent, &target, &blocking_key))
                .await
                .map_err(|e| LoadError::Fetch {
                    url: key,
                    reason: e.to_string(),
                })?
        })
    }
}

fn http_get(agent: &ureq::Agent, target: &str, key: &str) -> Result<Vec<u8>, LoadError> {
    tracing::debug!("GET {}", target);

    let response = agent.get(target).call().map_err(|e| match e {
        ureq::Error::Status(status, _) => LoadError::Status {
            url: key.to_string(),
            status,
        },
        other => LoadError::Fetch {
            url: key.to_string(),
            reason: other.to_string(),
        },
    })?;

    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_ASSET_BYTES)
        .read_to_end(&mut bytes)
        .map_err(|e| LoadError::Fetch {
            url: key.to_string(),
            reason: e.to_string(),
        })?;

    Ok(bytes)
}

/// Reads assets from a local directory; `/static/x.mp3` maps to `<root>/static/x.mp3`
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl AssetFetcher for FileFetcher {
    fn fetch(&self, url: &str) -> FetchFuture {
        let key = url.to_string();
        let path = self.root.join(url.trim_start_matches('/'));

        Box::pin(async move {
            tokio::fs::read(&path).await.map_err(|e| LoadError::Fetch {
                url: key,
                reason: format!("{}: {}", path.display(), e),
            })
        })
    }
}

/// In-memory asset store with simulated latency and per-URL fetch counters
#[derive(Clone, Default)]
pub struct MemoryFetcher {
    assets: Arc<RwLock<HashMap<String, Arc<Vec<u8>>>>>,
    fetches: Arc<RwLock<HashMap<String, usize>>>,
    latency: Duration,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.assets.write().insert(url.into(), Arc::new(bytes));
    }

    pub fn remove(&self, url: &str) {
        self.assets.write().remove(url);
    }

    /// How many times `url` was requested
    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.read().get(url).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.read().values().sum()
    }
}

impl AssetFetcher for MemoryFetcher {
    fn fetch(&self, url: &str) -> FetchFuture {
        *self.fetches.write().entry(url.to_string()).or_insert(0) += 1;

        let key = url.to_string();
        let assets = Arc::clone(&self.assets);
        let latency = self.latency;

        Box::pin(async move {
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let found = assets.read().get(&key).cloned();
            match found {
                Some(bytes) => Ok(bytes.as_ref().clone()),
                None => Err(LoadError::Status {
                    url: key,
                    status: 404,
                }),
            }
        })
    }
}
