/// Decoded sound buffers
///
/// A `SoundBuffer` is immutable interleaved PCM, decoded once per URL and
/// shared between every playback of that URL.
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::LoadError;

#[derive(Debug, Clone)]
pub struct SoundBuffer {
    source: String,
    channels: u16,
    sample_rate: u32,
    samples: Arc<[f32]>,
}

impl SoundBuffer {
    /// Wrap already-rendered interleaved samples
    pub fn from_samples(
        source: impl Into<String>,
        channels: u16,
        sample_rate: u32,
        samples: Vec<f32>,
    ) -> Self {
        Self {
            source: source.into(),
            channels: channels.max(1),
            sample_rate: sample_rate.max(1),
            samples: samples.into(),
        }
    }

    /// Decode an encoded audio payload (mp3, wav, ogg, flac, ...) into PCM
    pub fn decode(source: &str, bytes: Vec<u8>) -> Result<Self, LoadError> {
        let decode_failed = |reason: String| LoadError::Decode {
            url: source.to_string(),
            reason,
        };

        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        // Hint the container format from the file extension
        let mut hint = Hint::new();
        if let Some(ext) = Path::new(source).extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let detected = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| decode_failed(e.to_string()))?;
        let mut format = detected.format;

        // Find the first audio track with a known (decodable) codec
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| decode_failed("no supported audio tracks".to_string()))?;
        let track_id = track.id;

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| decode_failed(e.to_string()))?;

        let mut channels = 0u16;
        let mut sample_rate = 0u32;
        let mut samples: Vec<f32> = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(err))
                    if err.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    break;
                }
                // Track list changed mid-stream; keep what was decoded so far
                Err(SymphoniaError::ResetRequired) => break,
                Err(err) => return Err(decode_failed(err.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    channels = spec.channels.count() as u16;
                    sample_rate = spec.rate;

                    let mut interleaved = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    interleaved.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(interleaved.samples());
                }
                Err(SymphoniaError::IoError(_)) | Err(SymphoniaError::DecodeError(_)) => {
                    // Corrupt packet, skip it
                    continue;
                }
                Err(err) => return Err(decode_failed(err.to_string())),
            }
        }

        if samples.is_empty() || channels == 0 {
            return Err(decode_failed("payload contained no audio frames".to_string()));
        }

        Ok(Self::from_samples(source, channels, sample_rate, samples))
    }

    /// URL this buffer was loaded from
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }
}
