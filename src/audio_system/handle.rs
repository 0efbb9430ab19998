/// Playback handles and named slots
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

use super::device::Voice;
use super::registry::SoundKey;

struct HandleInner {
    id: u64,
    key: Option<SoundKey>,
    url: String,
    looped: bool,
    voice: Box<dyn Voice>,
    stopped: AtomicBool,
    ended: watch::Sender<bool>,
}

/// An active, playing instance of a sound buffer
///
/// Clones refer to the same playback. The voice keeps sounding while any
/// clone is alive; the manager holds one until playback ends.
#[derive(Clone)]
pub struct PlaybackHandle {
    inner: Arc<HandleInner>,
}

impl PlaybackHandle {
    pub(crate) fn new(
        id: u64,
        key: Option<SoundKey>,
        url: &str,
        looped: bool,
        voice: Box<dyn Voice>,
    ) -> Self {
        let (ended, _) = watch::channel(false);
        Self {
            inner: Arc::new(HandleInner {
                id,
                key,
                url: url.to_string(),
                looped,
                voice,
                stopped: AtomicBool::new(false),
                ended,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Registered effect this plays; `None` for background tracks
    pub fn key(&self) -> Option<SoundKey> {
        self.inner.key
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn is_looping(&self) -> bool {
        self.inner.looped
    }

    /// Stop playback. Only the first call reaches the device.
    pub fn stop(&self) {
        if !self.inner.stopped.swap(true, Ordering::SeqCst) {
            tracing::debug!("Stopping playback #{} ({})", self.inner.id, self.inner.url);
            self.inner.voice.stop();
        }
    }

    /// Whether playback was cut short by `stop()`
    pub fn was_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    pub fn has_ended(&self) -> bool {
        *self.inner.ended.borrow()
    }

    /// Wait until the manager has processed the end of this playback
    pub async fn finished(&self) {
        let mut ended = self.inner.ended.subscribe();
        let _ = ended.wait_for(|ended| *ended).await;
    }

    pub(crate) fn mark_ended(&self) {
        self.inner.ended.send_replace(true);
    }
}

impl PartialEq for PlaybackHandle {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for PlaybackHandle {}

impl fmt::Debug for PlaybackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlaybackHandle")
            .field("id", &self.inner.id)
            .field("key", &self.inner.key)
            .field("url", &self.inner.url)
            .field("looped", &self.inner.looped)
            .field("stopped", &self.was_stopped())
            .finish()
    }
}

/// Named reference to at most one handle
#[derive(Debug, Clone, Default)]
pub enum Slot {
    #[default]
    Empty,
    Playing(PlaybackHandle),
}

impl Slot {
    pub fn handle(&self) -> Option<&PlaybackHandle> {
        match self {
            Slot::Empty => None,
            Slot::Playing(handle) => Some(handle),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Slot::Empty)
    }

    pub fn holds(&self, handle: &PlaybackHandle) -> bool {
        self.handle() == Some(handle)
    }

    pub fn take(&mut self) -> Option<PlaybackHandle> {
        match std::mem::take(self) {
            Slot::Empty => None,
            Slot::Playing(handle) => Some(handle),
        }
    }

    /// Empty the slot if it refers to `handle`
    pub fn clear_if(&mut self, handle: &PlaybackHandle) -> bool {
        if self.holds(handle) {
            *self = Slot::Empty;
            true
        } else {
            false
        }
    }
}
