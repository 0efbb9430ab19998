/// Fixtures shared by the audio unit tests
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use super::device::SilentDevice;
use super::fetch::MemoryFetcher;
use super::manager::{AudioManager, ManagerSettings};
use super::registry::SoundRegistry;

pub const PLAYLIST: [&str; 4] = [
    "/static/music/melody/a.wav",
    "/static/music/melody/b.wav",
    "/static/music/melody/c.wav",
    "/static/music/melody/d.wav",
];

/// Encode a silent 16-bit WAV of the given length
pub fn wav_bytes(sample_rate: u32, channels: u16, seconds: f32) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let frames = (sample_rate as f32 * seconds) as usize;

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for _ in 0..frames * channels as usize {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

pub struct Rig {
    pub manager: AudioManager,
    pub device: SilentDevice,
    pub fetcher: MemoryFetcher,
}

/// Manager over a silent device with 2 s tracks, 1 s stings and a 4 s title
pub fn rig() -> Rig {
    rig_with_latency(Duration::from_millis(50))
}

pub fn rig_with_latency(latency: Duration) -> Rig {
    let fetcher = fixture_fetcher(latency);
    let device = SilentDevice::new();
    let manager = AudioManager::new(
        Arc::new(device.clone()),
        Arc::new(fetcher.clone()),
        fixture_registry(),
        fixture_settings(),
    );

    Rig {
        manager,
        device,
        fetcher,
    }
}

pub fn fixture_fetcher(latency: Duration) -> MemoryFetcher {
    let fetcher = MemoryFetcher::new().with_latency(latency);
    for track in PLAYLIST {
        fetcher.insert(track, wav_bytes(8_000, 1, 2.0));
    }
    fetcher.insert("/static/music/title.wav", wav_bytes(8_000, 1, 4.0));
    fetcher.insert("/static/music/game-over.wav", wav_bytes(8_000, 1, 1.0));
    fetcher.insert("/static/music/level-up.wav", wav_bytes(8_000, 1, 1.0));
    fetcher
}

pub fn fixture_registry() -> SoundRegistry {
    let effects = [
        ("title", "/static/music/title.wav"),
        ("gameOver", "/static/music/game-over.wav"),
        ("levelUp", "/static/music/level-up.wav"),
        ("modem", "synth:modem"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    SoundRegistry::new(effects, PLAYLIST.iter().map(|t| t.to_string()).collect())
}

pub fn fixture_settings() -> ManagerSettings {
    ManagerSettings {
        rng_seed: Some(7),
        ..ManagerSettings::default()
    }
}
