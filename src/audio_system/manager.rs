/// Audio lifecycle manager
///
/// Coordinates asynchronously loaded sounds against the game's mode
/// (title, playing, paused, game over). State lives behind one lock that is
/// never held across an `.await`; anything read before a suspension point is
/// checked again after it, because key presses, timers and playback ends may
/// have changed the mode in the meantime.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::sync::{oneshot, watch};

use super::buffer::SoundBuffer;
use super::cache::BufferCache;
use super::device::OutputDevice;
use super::fetch::AssetFetcher;
use super::handle::{PlaybackHandle, Slot};
use super::registry::{SoundKey, SoundRegistry};
use crate::config::Config;
use crate::error::{AudioError, LoadError};

/// Timing and startup knobs for the manager
#[derive(Debug, Clone)]
pub struct ManagerSettings {
    /// Wait after stopping audio before new audio may start
    pub settle_delay: Duration,

    /// Wait before retrying a failed background load
    pub retry_backoff: Duration,

    /// Consecutive background load failures before the rotation gives up
    pub max_load_retries: u32,

    pub start_muted: bool,

    pub rng_seed: Option<u64>,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(150),
            retry_backoff: Duration::from_millis(1000),
            max_load_retries: 5,
            start_muted: false,
            rng_seed: None,
        }
    }
}

impl ManagerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            retry_backoff: config.retry_backoff(),
            max_load_retries: config.max_load_retries.max(1),
            start_muted: config.start_muted,
            rng_seed: config.rng_seed,
        }
    }
}

/// Background music lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MusicPhase {
    /// Nothing requested yet, or just reset
    #[default]
    Idle,

    /// Settling or loading the next track
    Loading,

    Playing,

    /// A track ran out; the next one is about to load
    Ended,

    /// Stopped by mute, pause, title or an explicit stop
    Stopped,

    /// Locked out until `reset()`
    GameOver,
}

/// Which music the current screen calls for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Scene {
    #[default]
    Idle,
    Title,
    Game,
}

/// Snapshot of the manager for logging and tests
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioStatus {
    pub muted: bool,
    pub paused: bool,
    pub game_over: bool,
    pub scene: Scene,
    pub phase: MusicPhase,
    /// URL of the background track currently playing
    pub background: Option<String>,
    pub title_playing: bool,
    pub game_over_playing: bool,
    pub active_sounds: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopScope {
    /// Music and unprotected effects
    Music,
    /// Everything, protected effects included
    Everything,
}

enum Resume {
    Nothing,
    Background,
    Title,
}

#[derive(Default)]
struct ManagerState {
    muted: bool,
    paused: bool,
    game_over: bool,
    scene: Scene,
    phase: MusicPhase,

    /// Bumped by every stop; a rotation only acts while its epoch is current
    rotation_epoch: u64,

    background: Slot,
    title: Slot,
    game_over_effect: Slot,
    level_up: Slot,

    active: HashMap<u64, PlaybackHandle>,

    /// Set while a guarded stop runs; resolves to `true` when it finishes
    stopping: Option<watch::Receiver<bool>>,
}

struct Inner {
    device: Arc<dyn OutputDevice>,
    cache: BufferCache,
    registry: SoundRegistry,
    settings: ManagerSettings,
    state: Mutex<ManagerState>,
    /// Serializes stop-and-settle sequences
    cleanup: tokio::sync::Mutex<()>,
    rng: Mutex<StdRng>,
    next_handle_id: AtomicU64,
}

/// Audio manager shared by the game and its event handlers
///
/// Cheap to clone; all clones drive the same state.
#[derive(Clone)]
pub struct AudioManager {
    inner: Arc<Inner>,
}

impl AudioManager {
    pub fn new(
        device: Arc<dyn OutputDevice>,
        fetcher: Arc<dyn AssetFetcher>,
        registry: SoundRegistry,
        settings: ManagerSettings,
    ) -> Self {
        let rng = match settings.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let state = ManagerState {
            muted: settings.start_muted,
            ..ManagerState::default()
        };

        tracing::info!(
            "Audio manager ready on {} output ({} background tracks)",
            device.name(),
            registry.playlist().len()
        );

        Self {
            inner: Arc::new(Inner {
                device,
                cache: BufferCache::new(fetcher),
                registry,
                settings,
                state: Mutex::new(state),
                cleanup: tokio::sync::Mutex::new(()),
                rng: Mutex::new(rng),
                next_handle_id: AtomicU64::new(1),
            }),
        }
    }

    /// Decoded buffer for `url`; concurrent callers share one fetch and decode
    pub async fn load_buffer(&self, url: &str) -> Result<Arc<SoundBuffer>, LoadError> {
        self.inner.cache.load(url).await
    }

    /// Play a registered effect
    ///
    /// Returns `Ok(None)` when muted, when the sound cannot be loaded or
    /// started, or when the game moved on while it was loading. Only an
    /// unregistered key is an error.
    pub async fn play_effect(
        &self,
        key: impl AsRef<str>,
        looped: bool,
    ) -> Result<Option<PlaybackHandle>, AudioError> {
        let key = key.as_ref();
        let sound = SoundKey::from_name(key);

        match sound {
            Some(SoundKey::GameOver) => {
                let mut state = self.inner.state.lock();
                if let Some(existing) = state.game_over_effect.handle() {
                    return Ok(Some(existing.clone()));
                }
                if !state.game_over {
                    tracing::info!("Game over: background music locked until reset");
                }
                state.game_over = true;
                Self::stop_all(&mut state, StopScope::Music);
                state.phase = MusicPhase::GameOver;
            }
            Some(SoundKey::Title) => {
                self.inner.state.lock().scene = Scene::Title;
            }
            _ => {}
        }

        if self.is_muted() {
            tracing::debug!("Muted, not playing {}", key);
            return Ok(None);
        }

        let url = self.inner.registry.effect_url(key)?.to_string();

        if sound == Some(SoundKey::Title) {
            self.cleanup_current_audio(StopScope::Music).await;
            let state = self.inner.state.lock();
            if !state.background.is_empty() || !state.title.is_empty() {
                tracing::debug!("Music started during title cleanup, not starting title");
                return Ok(None);
            }
        }

        let buffer = match self.load_buffer(&url).await {
            Ok(buffer) => buffer,
            Err(err) => {
                tracing::warn!("Skipping sound {}: {}", key, err);
                return Ok(None);
            }
        };

        let mut state = self.inner.state.lock();
        if state.muted {
            return Ok(None);
        }
        match sound {
            Some(SoundKey::GameOver) => {
                if let Some(existing) = state.game_over_effect.handle() {
                    return Ok(Some(existing.clone()));
                }
                if !state.game_over {
                    tracing::debug!("Reset while the game-over sting loaded, dropping it");
                    return Ok(None);
                }
            }
            Some(SoundKey::Title) => {
                let title_still_wanted = state.scene == Scene::Title
                    && !state.game_over
                    && state.background.is_empty()
                    && state.title.is_empty();
                if !title_still_wanted {
                    tracing::debug!("Title music no longer wanted after load");
                    return Ok(None);
                }
            }
            _ => {}
        }

        let handle = match self.start_locked(&mut state, sound, &url, buffer, looped) {
            Ok(handle) => handle,
            Err(err) => {
                tracing::warn!("Failed to start sound {}: {}", key, err);
                return Ok(None);
            }
        };

        match sound {
            Some(SoundKey::Title) => state.title = Slot::Playing(handle.clone()),
            Some(SoundKey::GameOver) => state.game_over_effect = Slot::Playing(handle.clone()),
            Some(SoundKey::LevelUp) => state.level_up = Slot::Playing(handle.clone()),
            _ => {}
        }

        tracing::info!("Playing {} ({}{})", key, url, if looped { ", looped" } else { "" });
        Ok(Some(handle))
    }

    /// Start the randomized background playlist
    ///
    /// Fire-and-forget: the rotation runs on its own task and keeps picking
    /// tracks until muted, paused, game over, title music or an explicit stop.
    pub fn play_random_background(&self) {
        let epoch = {
            let mut state = self.inner.state.lock();
            if state.title.is_empty() {
                state.scene = Scene::Game;
            }
            if !Self::background_allowed(&state) {
                tracing::debug!(
                    "Background music not allowed (muted={}, paused={}, game_over={}, title={})",
                    state.muted,
                    state.paused,
                    state.game_over,
                    !state.title.is_empty()
                );
                return;
            }
            state.rotation_epoch += 1;
            state.phase = MusicPhase::Loading;
            state.rotation_epoch
        };

        let manager = self.clone();
        tokio::spawn(async move { manager.run_rotation(epoch).await });
    }

    /// Stop music and unprotected effects; game-over and level-up stings finish
    ///
    /// A call made while another stop is running waits for that one instead.
    pub async fn stop_music(&self) {
        self.stop_guarded(StopScope::Music).await;
    }

    /// Stop every sound, protected effects included
    pub async fn stop_all_sounds(&self) {
        self.stop_guarded(StopScope::Everything).await;
    }

    /// Flip mute; returns the new mute state
    pub async fn toggle_mute(&self) -> bool {
        let (muted, resume) = {
            let mut state = self.inner.state.lock();
            state.muted = !state.muted;
            (state.muted, Self::resume_target(&state))
        };

        if muted {
            tracing::info!("Audio muted");
            self.stop_music().await;
        } else {
            tracing::info!("Audio unmuted");
            self.resume(resume).await;
        }
        muted
    }

    pub async fn set_pause(&self, paused: bool) {
        let resume = {
            let mut state = self.inner.state.lock();
            if state.paused == paused {
                return;
            }
            state.paused = paused;
            Self::resume_target(&state)
        };

        if paused {
            tracing::info!("Audio paused");
            self.stop_music().await;
        } else {
            tracing::info!("Audio resumed");
            if let Resume::Background = resume {
                self.play_random_background();
            }
        }
    }

    /// Clear game-over and pause, stop everything, back to a startable state
    pub async fn reset(&self) {
        {
            let mut state = self.inner.state.lock();
            state.game_over = false;
            state.paused = false;
        }

        self.stop_all_sounds().await;

        let mut state = self.inner.state.lock();
        state.game_over_effect = Slot::Empty;
        state.level_up = Slot::Empty;
        if matches!(state.phase, MusicPhase::Stopped | MusicPhase::GameOver) {
            state.phase = MusicPhase::Idle;
        }
        tracing::info!("Audio reset");
    }

    pub fn is_muted(&self) -> bool {
        self.inner.state.lock().muted
    }

    pub fn is_paused(&self) -> bool {
        self.inner.state.lock().paused
    }

    pub fn is_game_over(&self) -> bool {
        self.inner.state.lock().game_over
    }

    pub fn music_phase(&self) -> MusicPhase {
        self.inner.state.lock().phase
    }

    pub fn current_background(&self) -> Option<PlaybackHandle> {
        self.inner.state.lock().background.handle().cloned()
    }

    pub fn title_handle(&self) -> Option<PlaybackHandle> {
        self.inner.state.lock().title.handle().cloned()
    }

    pub fn active_count(&self) -> usize {
        self.inner.state.lock().active.len()
    }

    pub fn cached_buffers(&self) -> usize {
        self.inner.cache.cached_count()
    }

    pub fn status(&self) -> AudioStatus {
        let state = self.inner.state.lock();
        AudioStatus {
            muted: state.muted,
            paused: state.paused,
            game_over: state.game_over,
            scene: state.scene,
            phase: state.phase,
            background: state.background.handle().map(|h| h.url().to_string()),
            title_playing: !state.title.is_empty(),
            game_over_playing: !state.game_over_effect.is_empty(),
            active_sounds: state.active.len(),
        }
    }

    fn background_allowed(state: &ManagerState) -> bool {
        !state.muted && !state.paused && !state.game_over && state.title.is_empty()
    }

    fn rotation_current(state: &ManagerState, epoch: u64) -> bool {
        state.rotation_epoch == epoch && Self::background_allowed(state)
    }

    fn resume_target(state: &ManagerState) -> Resume {
        if state.muted || state.game_over {
            return Resume::Nothing;
        }
        match state.scene {
            Scene::Title => Resume::Title,
            Scene::Game if !state.paused => Resume::Background,
            _ => Resume::Nothing,
        }
    }

    async fn resume(&self, target: Resume) {
        match target {
            Resume::Background => self.play_random_background(),
            Resume::Title => {
                if let Err(err) = self.play_effect(SoundKey::Title, true).await {
                    tracing::warn!("Could not resume title music: {}", err);
                }
            }
            Resume::Nothing => {}
        }
    }

    /// Background loop: Loading -> Playing -> Ended -> Loading ...
    async fn run_rotation(self, epoch: u64) {
        let backoff = self.inner.settings.retry_backoff;
        let mut failures = 0u32;

        loop {
            self.stop_background_and_settle().await;

            let url = {
                let mut state = self.inner.state.lock();
                if !Self::rotation_current(&state, epoch) {
                    None
                } else {
                    state.phase = MusicPhase::Loading;
                    self.pick_track()
                }
            };
            let Some(url) = url else {
                self.retire_rotation(epoch);
                return;
            };

            let buffer = match self.load_buffer(&url).await {
                Ok(buffer) => {
                    failures = 0;
                    buffer
                }
                Err(err) => {
                    failures += 1;
                    if failures >= self.inner.settings.max_load_retries {
                        tracing::error!(
                            "Background music failed to load {} times in a row, giving up: {}",
                            failures,
                            err
                        );
                        self.retire_rotation(epoch);
                        return;
                    }
                    tracing::warn!(
                        "Background track failed to load ({}), retrying in {:?}",
                        err,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                    continue;
                }
            };

            let handle = {
                let mut state = self.inner.state.lock();
                if !Self::rotation_current(&state, epoch) {
                    tracing::debug!("Discarding stale background load of {}", url);
                    if state.rotation_epoch == epoch && state.phase != MusicPhase::GameOver {
                        state.phase = MusicPhase::Stopped;
                    }
                    return;
                }
                if let Some(previous) = state.background.take() {
                    previous.stop();
                }
                match self.start_locked(&mut state, None, &url, buffer, false) {
                    Ok(handle) => {
                        state.background = Slot::Playing(handle.clone());
                        state.phase = MusicPhase::Playing;
                        handle
                    }
                    Err(err) => {
                        tracing::error!("Failed to start background track {}: {}", url, err);
                        state.phase = MusicPhase::Stopped;
                        return;
                    }
                }
            };
            tracing::info!("Background track: {}", url);

            handle.finished().await;

            {
                let mut state = self.inner.state.lock();
                if handle.was_stopped() || !Self::rotation_current(&state, epoch) {
                    return;
                }
                state.phase = MusicPhase::Ended;
            }
            tracing::debug!("Background track ended, advancing playlist");
        }
    }

    fn retire_rotation(&self, epoch: u64) {
        let mut state = self.inner.state.lock();
        if state.rotation_epoch == epoch && state.phase != MusicPhase::GameOver {
            state.phase = MusicPhase::Stopped;
        }
    }

    fn pick_track(&self) -> Option<String> {
        let playlist = self.inner.registry.playlist();
        if playlist.is_empty() {
            tracing::warn!("Background playlist is empty");
            return None;
        }
        let index = self.inner.rng.lock().gen_range(0..playlist.len());
        Some(playlist[index].clone())
    }

    async fn stop_background_and_settle(&self) {
        let _chain = self.inner.cleanup.lock().await;
        let previous = self.inner.state.lock().background.take();
        if let Some(previous) = previous {
            previous.stop();
        }
        tokio::time::sleep(self.inner.settings.settle_delay).await;
    }

    /// Stop `scope` right away, then wait out the settle delay in turn
    async fn cleanup_current_audio(&self, scope: StopScope) {
        self.stop_now(scope);
        self.settle().await;
    }

    fn stop_now(&self, scope: StopScope) {
        let stopped = {
            let mut state = self.inner.state.lock();
            Self::stop_all(&mut state, scope)
        };
        tracing::debug!("Stopped {} sounds ({:?})", stopped, scope);
    }

    async fn settle(&self) {
        let _chain = self.inner.cleanup.lock().await;
        tokio::time::sleep(self.inner.settings.settle_delay).await;
    }

    /// The stop lands at call time; only the settle is shared between callers
    async fn stop_guarded(&self, scope: StopScope) {
        self.stop_now(scope);

        let done = loop {
            let mut in_progress = {
                let mut state = self.inner.state.lock();
                match state.stopping.clone() {
                    Some(in_progress) => in_progress,
                    None => {
                        let (done, in_progress) = watch::channel(false);
                        state.stopping = Some(in_progress);
                        break done;
                    }
                }
            };

            if in_progress.wait_for(|finished| *finished).await.is_ok() {
                return;
            }
            // The other stop was cancelled midway; release its guard
            let mut state = self.inner.state.lock();
            if state
                .stopping
                .as_ref()
                .is_some_and(|current| current.same_channel(&in_progress))
            {
                state.stopping = None;
            }
        };

        self.settle().await;

        self.inner.state.lock().stopping = None;
        done.send_replace(true);
    }

    /// Stop background, title and every active sound outside `scope`'s protection
    fn stop_all(state: &mut ManagerState, scope: StopScope) -> usize {
        state.rotation_epoch += 1;
        if !matches!(state.phase, MusicPhase::Idle | MusicPhase::GameOver) {
            state.phase = MusicPhase::Stopped;
        }

        Self::stop_all_except(state, |handle| {
            scope == StopScope::Music && handle.key().is_some_and(|key| key.is_protected())
        })
    }

    fn stop_all_except(state: &mut ManagerState, except: impl Fn(&PlaybackHandle) -> bool) -> usize {
        for slot in [&mut state.background, &mut state.title] {
            if let Some(handle) = slot.take() {
                handle.stop();
            }
        }

        let victims: Vec<PlaybackHandle> = state
            .active
            .values()
            .filter(|handle| !except(*handle))
            .cloned()
            .collect();
        for handle in &victims {
            handle.stop();
            state.active.remove(&handle.id());
        }

        for slot in [&mut state.game_over_effect, &mut state.level_up] {
            if slot.handle().is_some_and(PlaybackHandle::was_stopped) {
                *slot = Slot::Empty;
            }
        }

        victims.len()
    }

    fn start_locked(
        &self,
        state: &mut ManagerState,
        key: Option<SoundKey>,
        url: &str,
        buffer: Arc<SoundBuffer>,
        looped: bool,
    ) -> Result<PlaybackHandle, AudioError> {
        let (ended_tx, ended_rx) = oneshot::channel();
        let voice = self.inner.device.start(buffer, looped, ended_tx)?;
        let id = self.inner.next_handle_id.fetch_add(1, Ordering::Relaxed);
        let handle = PlaybackHandle::new(id, key, url, looped, voice);
        state.active.insert(id, handle.clone());

        let manager = self.clone();
        let watched = handle.clone();
        tokio::spawn(async move {
            let _ = ended_rx.await;
            manager.on_playback_ended(&watched);
        });

        Ok(handle)
    }

    fn on_playback_ended(&self, handle: &PlaybackHandle) {
        let resume_background = {
            let mut state = self.inner.state.lock();
            state.active.remove(&handle.id());
            state.background.clear_if(handle);
            state.title.clear_if(handle);
            state.game_over_effect.clear_if(handle);
            let level_up_finished = state.level_up.clear_if(handle) && !handle.was_stopped();

            level_up_finished
                && state.scene == Scene::Game
                && Self::background_allowed(&state)
                && state.background.is_empty()
                && !matches!(
                    state.phase,
                    MusicPhase::Loading | MusicPhase::Playing | MusicPhase::Ended
                )
        };

        handle.mark_ended();

        if resume_background {
            tracing::info!("Level-up finished, resuming background music");
            self.play_random_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_system::device::{SilentDevice, Voice};
    use crate::audio_system::test_support::{
        fixture_fetcher, fixture_registry, fixture_settings, rig, rig_with_latency, Rig, PLAYLIST,
    };
    use tokio::time::{sleep, Instant};

    /// Signals `ended` after a stop too, the way the speaker output does
    struct SignalOnStopDevice(SilentDevice);

    impl OutputDevice for SignalOnStopDevice {
        fn start(
            &self,
            buffer: Arc<SoundBuffer>,
            looped: bool,
            ended: oneshot::Sender<()>,
        ) -> Result<Box<dyn Voice>, AudioError> {
            let (silent_tx, silent_rx) = oneshot::channel();
            let voice = self.0.start(buffer, looped, silent_tx)?;
            tokio::spawn(async move {
                let _ = silent_rx.await;
                let _ = ended.send(());
            });
            Ok(voice)
        }

        fn name(&self) -> &str {
            "signal-on-stop"
        }
    }

    fn background_records(device: &SilentDevice) -> Vec<crate::audio_system::device::VoiceRecord> {
        device
            .journal()
            .into_iter()
            .filter(|record| PLAYLIST.contains(&record.source.as_str()))
            .collect()
    }

    fn assert_no_background_overlap(device: &SilentDevice) {
        let records = background_records(device);
        for pair in records.windows(2) {
            let previous_end = pair[0]
                .finished_at
                .expect("a background track was still sounding when the next one started");
            assert!(pair[1].started_at >= previous_end);
        }
    }

    async fn start_game(rig: &Rig) {
        rig.manager.play_random_background();
        sleep(Duration::from_millis(500)).await;
        assert!(rig.manager.current_background().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_rotation_starts_a_playlist_track() {
        let rig = rig();
        start_game(&rig).await;

        let status = rig.manager.status();
        assert_eq!(status.phase, MusicPhase::Playing);
        assert_eq!(status.scene, Scene::Game);
        assert!(PLAYLIST.contains(&status.background.unwrap().as_str()));
        assert_eq!(background_records(&rig.device).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_over_is_idempotent() {
        let rig = rig();
        start_game(&rig).await;

        let first = rig.manager.play_effect("gameOver", false).await.unwrap().unwrap();
        let second = rig.manager.play_effect("gameOver", false).await.unwrap().unwrap();

        assert_eq!(first, second);
        assert!(rig.manager.current_background().is_none());
        assert!(rig.manager.is_game_over());
        assert_eq!(rig.manager.music_phase(), MusicPhase::GameOver);
        assert_eq!(
            rig.device
                .journal()
                .iter()
                .filter(|r| r.source == "/static/music/game-over.wav")
                .count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_game_over_blocks_background_until_reset() {
        let rig = rig();
        start_game(&rig).await;
        rig.manager.play_effect(SoundKey::GameOver, false).await.unwrap();

        rig.manager.play_random_background();
        rig.manager.set_pause(true).await;
        rig.manager.set_pause(false).await;
        sleep(Duration::from_secs(5)).await;
        assert_eq!(background_records(&rig.device).len(), 1);

        rig.manager.reset().await;
        assert_eq!(rig.manager.music_phase(), MusicPhase::Idle);
        rig.manager.play_random_background();
        sleep(Duration::from_millis(500)).await;
        assert!(rig.manager.current_background().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_protected_effects_survive_stop_music() {
        let rig = rig();
        start_game(&rig).await;

        let level_up = rig.manager.play_effect("levelUp", false).await.unwrap().unwrap();
        rig.manager.stop_music().await;

        assert!(!level_up.was_stopped());
        assert!(rig.manager.current_background().is_none());
        assert_eq!(rig.manager.active_count(), 1);

        rig.manager.stop_all_sounds().await;
        assert!(level_up.was_stopped());
        assert_eq!(rig.manager.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_music_spares_only_protected_keys() {
        let rig = rig();
        start_game(&rig).await;

        let mut effects = Vec::new();
        for key in [SoundKey::LevelUp, SoundKey::Modem] {
            let handle = rig.manager.play_effect(key, false).await.unwrap().unwrap();
            assert_eq!(handle.key(), Some(key));
            effects.push(handle);
        }
        rig.manager.stop_music().await;

        for handle in &effects {
            let key = handle.key().unwrap();
            assert_eq!(handle.was_stopped(), !key.is_protected(), "{}", key);
        }
        assert_eq!(rig.manager.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_reported_as_an_end_does_not_advance() {
        let silent = SilentDevice::new();
        let manager = AudioManager::new(
            Arc::new(SignalOnStopDevice(silent.clone())),
            Arc::new(fixture_fetcher(Duration::from_millis(50))),
            fixture_registry(),
            fixture_settings(),
        );
        manager.play_random_background();
        sleep(Duration::from_millis(500)).await;
        let track = manager.current_background().unwrap();

        manager.stop_music().await;
        sleep(Duration::from_secs(5)).await;

        assert!(track.was_stopped());
        assert!(track.has_ended());
        assert!(manager.current_background().is_none());
        assert_eq!(manager.music_phase(), MusicPhase::Stopped);
        assert_eq!(background_records(&silent).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_level_up_end_resumes_background() {
        let rig = rig();
        start_game(&rig).await;
        rig.manager.stop_music().await;

        rig.manager.play_effect("levelUp", false).await.unwrap().unwrap();
        sleep(Duration::from_secs(2)).await;

        assert!(rig.manager.current_background().is_some());
        assert_eq!(background_records(&rig.device).len(), 2);
        assert_no_background_overlap(&rig.device);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_during_load_prevents_start() {
        let rig = rig_with_latency(Duration::from_secs(1));
        rig.manager.play_random_background();

        // Past the settle delay, inside the fetch
        sleep(Duration::from_millis(500)).await;
        assert_eq!(rig.manager.music_phase(), MusicPhase::Loading);
        rig.manager.set_pause(true).await;

        sleep(Duration::from_secs(5)).await;
        assert!(background_records(&rig.device).is_empty());
        assert_eq!(rig.manager.music_phase(), MusicPhase::Stopped);

        rig.manager.set_pause(false).await;
        sleep(Duration::from_secs(2)).await;
        assert_eq!(background_records(&rig.device).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_load_after_game_over_never_plays() {
        let rig = rig_with_latency(Duration::from_secs(1));
        rig.manager.play_random_background();
        sleep(Duration::from_millis(500)).await;

        rig.manager.play_effect("gameOver", false).await.unwrap();
        sleep(Duration::from_secs(5)).await;

        assert!(background_records(&rig.device).is_empty());
        assert_eq!(rig.manager.music_phase(), MusicPhase::GameOver);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmute_resumes_background_in_game() {
        let rig = rig();
        start_game(&rig).await;

        assert!(rig.manager.toggle_mute().await);
        assert!(rig.device.sounding().is_empty());
        assert_eq!(rig.manager.music_phase(), MusicPhase::Stopped);

        assert!(!rig.manager.toggle_mute().await);
        sleep(Duration::from_millis(500)).await;
        assert!(rig.manager.current_background().is_some());
        assert!(rig.manager.title_handle().is_none());
        assert_no_background_overlap(&rig.device);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_mute_unmute_keeps_background() {
        let rig = rig();
        rig.manager.play_random_background();
        tokio::task::yield_now().await;

        // Unmute lands while the mute is still waiting out its settle
        tokio::join!(rig.manager.toggle_mute(), async {
            tokio::task::yield_now().await;
            rig.manager.toggle_mute().await
        });
        sleep(Duration::from_secs(3)).await;

        assert!(!rig.manager.is_muted());
        assert!(!background_records(&rig.device).is_empty());
        assert_ne!(rig.manager.music_phase(), MusicPhase::Stopped);
        assert_no_background_overlap(&rig.device);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quick_pause_resume_keeps_background() {
        let rig = rig();
        rig.manager.play_random_background();
        tokio::task::yield_now().await;

        tokio::join!(rig.manager.set_pause(true), async {
            tokio::task::yield_now().await;
            rig.manager.set_pause(false).await
        });
        sleep(Duration::from_secs(3)).await;

        assert!(!rig.manager.is_paused());
        assert!(!background_records(&rig.device).is_empty());
        assert_ne!(rig.manager.music_phase(), MusicPhase::Stopped);
        assert_no_background_overlap(&rig.device);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unmute_resumes_title_on_title_screen() {
        let rig = rig();
        rig.manager.play_effect("title", true).await.unwrap().unwrap();

        rig.manager.toggle_mute().await;
        assert!(rig.manager.title_handle().is_none());

        rig.manager.toggle_mute().await;
        assert!(rig.manager.title_handle().is_some());
        assert!(rig.manager.current_background().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_title_excludes_background() {
        let rig = rig();
        rig.manager.play_effect("title", true).await.unwrap().unwrap();

        rig.manager.play_random_background();
        sleep(Duration::from_secs(1)).await;

        assert!(background_records(&rig.device).is_empty());
        assert_eq!(rig.manager.status().scene, Scene::Title);
    }

    #[tokio::test(start_paused = true)]
    async fn test_title_stops_running_background() {
        let rig = rig();
        start_game(&rig).await;

        let title = rig.manager.play_effect("title", true).await.unwrap().unwrap();
        assert!(title.is_looping());
        assert!(rig.manager.current_background().is_none());
        assert!(background_records(&rig.device)[0].stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_muted_effects_are_silent() {
        let rig = rig();
        rig.manager.toggle_mute().await;

        assert!(rig.manager.play_effect("levelUp", false).await.unwrap().is_none());
        rig.manager.play_random_background();
        sleep(Duration::from_secs(1)).await;
        assert!(rig.device.journal().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_sound_is_an_error() {
        let rig = rig();
        match rig.manager.play_effect("fanfare", false).await {
            Err(AudioError::UnknownSound(key)) => assert_eq!(key, "fanfare"),
            other => panic!("expected UnknownSound, got {:?}", other.map(|h| h.is_some())),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_unloadable_effect_degrades_to_silence() {
        let rig = rig();
        rig.fetcher.remove("/static/music/level-up.wav");
        assert!(rig.manager.play_effect("levelUp", false).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_stops_share_one_settle() {
        let rig = rig();
        start_game(&rig).await;

        let started = Instant::now();
        tokio::join!(rig.manager.stop_music(), rig.manager.stop_music());
        let settle = ManagerSettings::default().settle_delay;
        assert!(started.elapsed() >= settle);
        assert!(started.elapsed() < settle * 2);
        assert!(rig.manager.current_background().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_loads_retry_then_give_up() {
        let rig = rig();
        for track in PLAYLIST {
            rig.fetcher.remove(track);
        }

        rig.manager.play_random_background();
        sleep(Duration::from_secs(30)).await;

        let fetches: usize = PLAYLIST.iter().map(|t| rig.fetcher.fetch_count(t)).sum();
        assert_eq!(fetches, ManagerSettings::default().max_load_retries as usize);
        assert_eq!(rig.manager.music_phase(), MusicPhase::Stopped);
        assert!(rig.device.journal().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_recovers_after_transient_failure() {
        let rig = rig();
        let stash: Vec<Vec<u8>> = PLAYLIST
            .iter()
            .map(|_| crate::audio_system::test_support::wav_bytes(8_000, 1, 2.0))
            .collect();
        for track in PLAYLIST {
            rig.fetcher.remove(track);
        }

        rig.manager.play_random_background();
        sleep(Duration::from_millis(1500)).await;
        for (track, bytes) in PLAYLIST.iter().zip(stash) {
            rig.fetcher.insert(*track, bytes);
        }
        sleep(Duration::from_secs(2)).await;

        assert_eq!(background_records(&rig.device).len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_starts_keep_one_background() {
        let rig = rig();
        for _ in 0..5 {
            rig.manager.play_random_background();
            sleep(Duration::from_millis(60)).await;
        }
        sleep(Duration::from_secs(1)).await;

        let sounding = rig
            .device
            .sounding()
            .into_iter()
            .filter(|r| PLAYLIST.contains(&r.source.as_str()))
            .count();
        assert_eq!(sounding, 1);
        assert_no_background_overlap(&rig.device);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_calls_never_overlap_background() {
        let rig = rig();
        let mut rng = StdRng::seed_from_u64(99);

        for _ in 0..60 {
            match rng.gen_range(0..6) {
                0 | 1 => rig.manager.play_random_background(),
                2 => rig.manager.stop_music().await,
                3 => rig.manager.set_pause(true).await,
                4 => rig.manager.set_pause(false).await,
                _ => {
                    rig.manager.play_effect("levelUp", false).await.unwrap();
                }
            }
            sleep(Duration::from_millis(rng.gen_range(0..1500))).await;
        }
        sleep(Duration::from_secs(3)).await;

        assert_no_background_overlap(&rig.device);
    }
}
