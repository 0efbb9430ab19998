/// Audio output devices
///
/// An `OutputDevice` starts voices for decoded buffers. Each voice resolves its
/// `ended` sender once it goes quiet, whether it ran out or was stopped: the
/// speaker output sends after its sink drains, the silent device drops the
/// sender on stop. Receivers must not read the signal as a natural end; the
/// handle's stop flag tells the two apart.
use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;
use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink, Source};
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::buffer::SoundBuffer;
use crate::error::AudioError;

/// A single sounding instance of a buffer
pub trait Voice: Send + Sync {
    /// Stop playback; calling twice is harmless
    fn stop(&self);
}

pub trait OutputDevice: Send + Sync + 'static {
    fn start(
        &self,
        buffer: Arc<SoundBuffer>,
        looped: bool,
        ended: oneshot::Sender<()>,
    ) -> Result<Box<dyn Voice>, AudioError>;

    fn name(&self) -> &str;
}

/// Speaker output through rodio
///
/// The rodio `OutputStream` is not `Send`, so it lives on its own thread for
/// as long as the device exists. Every voice gets its own `Sink`.
pub struct RodioDevice {
    stream_handle: OutputStreamHandle,
    volume: f32,
    _keep_alive: crossbeam_channel::Sender<()>,
}

impl RodioDevice {
    /// Open the default output device
    pub fn open(volume: f32) -> Result<Self, AudioError> {
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);
        let (keep_alive_tx, keep_alive_rx) = crossbeam_channel::bounded::<()>(0);

        thread::Builder::new()
            .name("audio-output".to_string())
            .spawn(move || match OutputStream::try_default() {
                Ok((stream, handle)) => {
                    let _ = ready_tx.send(Ok(handle));
                    // Returns once the device is dropped
                    let _ = keep_alive_rx.recv();
                    drop(stream);
                    tracing::debug!("Audio output stream closed");
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e.to_string()));
                }
            })
            .map_err(|e| AudioError::StreamInitFailed(Box::new(e)))?;

        let stream_handle = ready_rx
            .recv()
            .map_err(|e| AudioError::StreamInitFailed(Box::new(e)))?
            .map_err(|reason| AudioError::StreamInitFailed(reason.into()))?;

        tracing::info!("✓ Audio output stream opened");

        Ok(Self {
            stream_handle,
            volume: volume.clamp(0.0, 1.0),
            _keep_alive: keep_alive_tx,
        })
    }
}

impl OutputDevice for RodioDevice {
    fn start(
        &self,
        buffer: Arc<SoundBuffer>,
        looped: bool,
        ended: oneshot::Sender<()>,
    ) -> Result<Box<dyn Voice>, AudioError> {
        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| AudioError::PlaybackFailed(e.to_string().into()))?;
        sink.set_volume(self.volume);

        let source = SamplesBuffer::new(
            buffer.channels(),
            buffer.sample_rate(),
            buffer.samples().to_vec(),
        );
        if looped {
            sink.append(source.repeat_infinite());
        } else {
            sink.append(source);
        }
        sink.play();

        let sink = Arc::new(sink);
        let watcher = Arc::clone(&sink);
        thread::spawn(move || {
            watcher.sleep_until_end();
            let _ = ended.send(());
        });

        Ok(Box::new(RodioVoice { sink }))
    }

    fn name(&self) -> &str {
        "rodio"
    }
}

struct RodioVoice {
    sink: Arc<Sink>,
}

impl Voice for RodioVoice {
    fn stop(&self) {
        self.sink.stop();
    }
}

/// One voice as seen by a `SilentDevice`
#[derive(Debug, Clone)]
pub struct VoiceRecord {
    pub source: String,
    pub looped: bool,
    pub started_at: Instant,
    /// Set when the voice ran out or was stopped
    pub finished_at: Option<Instant>,
    pub stopped: bool,
}

impl VoiceRecord {
    pub fn is_sounding(&self) -> bool {
        self.finished_at.is_none()
    }
}

/// Device that plays nothing but keeps time
///
/// Voices end after their buffer's duration on the tokio clock, so the
/// manager behaves exactly as with real output. Used when no output device is
/// available and as the test double.
#[derive(Clone, Default)]
pub struct SilentDevice {
    journal: Arc<Mutex<Vec<VoiceRecord>>>,
}

impl SilentDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every voice started so far, in start order
    pub fn journal(&self) -> Vec<VoiceRecord> {
        self.journal.lock().clone()
    }

    /// Voices that are still sounding
    pub fn sounding(&self) -> Vec<VoiceRecord> {
        self.journal
            .lock()
            .iter()
            .filter(|record| record.is_sounding())
            .cloned()
            .collect()
    }
}

impl OutputDevice for SilentDevice {
    fn start(
        &self,
        buffer: Arc<SoundBuffer>,
        looped: bool,
        ended: oneshot::Sender<()>,
    ) -> Result<Box<dyn Voice>, AudioError> {
        let index = {
            let mut journal = self.journal.lock();
            journal.push(VoiceRecord {
                source: buffer.source().to_string(),
                looped,
                started_at: Instant::now(),
                finished_at: None,
                stopped: false,
            });
            journal.len() - 1
        };

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let journal = Arc::clone(&self.journal);
        let duration = buffer.duration();

        tokio::spawn(async move {
            let ran_out = if looped {
                let _ = stop_rx.await;
                false
            } else {
                tokio::select! {
                    _ = tokio::time::sleep(duration) => true,
                    _ = stop_rx => false,
                }
            };

            if ran_out {
                if let Some(record) = journal.lock().get_mut(index) {
                    record.finished_at.get_or_insert_with(Instant::now);
                }
                let _ = ended.send(());
            }
        });

        Ok(Box::new(SilentVoice {
            stop: Mutex::new(Some(stop_tx)),
            journal: Arc::clone(&self.journal),
            index,
        }))
    }

    fn name(&self) -> &str {
        "silent"
    }
}

struct SilentVoice {
    stop: Mutex<Option<oneshot::Sender<()>>>,
    journal: Arc<Mutex<Vec<VoiceRecord>>>,
    index: usize,
}

impl Voice for SilentVoice {
    fn stop(&self) {
        let Some(stop) = self.stop.lock().take() else {
            return;
        };
        if let Some(record) = self.journal.lock().get_mut(self.index) {
            if record.finished_at.is_none() {
                record.finished_at = Some(Instant::now());
                record.stopped = true;
            }
        }
        let _ = stop.send(());
    }
}

impl Drop for SilentVoice {
    fn drop(&mut self) {
        self.stop();
    }
}
