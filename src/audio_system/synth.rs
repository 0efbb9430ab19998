/// Procedurally rendered sounds
///
/// Registry entries using the `synth:` scheme are rendered locally instead of
/// being fetched, e.g. `synth:modem`.
use std::f32::consts::PI;

use super::buffer::SoundBuffer;

pub const SYNTH_SCHEME: &str = "synth:";

const SAMPLE_RATE: u32 = 44_100;
const MODEM_SECONDS: u32 = 3;

/// Render the sound named by a `synth:` URL, if it is one we know
pub fn render(url: &str) -> Option<SoundBuffer> {
    match url.strip_prefix(SYNTH_SCHEME)? {
        "modem" => Some(modem_tone(SAMPLE_RATE)),
        _ => None,
    }
}

/// Dial-up handshake: two warbling carriers over a decaying 800 Hz ping
pub fn modem_tone(sample_rate: u32) -> SoundBuffer {
    let frames = (sample_rate * MODEM_SECONDS) as usize;
    let rate = sample_rate as f32;

    let samples = (0..frames)
        .map(|i| {
            let t = i as f32 / rate;
            let carrier_a = 1000.0 + (t * 10.0).sin() * 500.0;
            let carrier_b = 2000.0 + (t * 5.0).sin() * 300.0;

            0.3 * (2.0 * PI * carrier_a * t).sin()
                + 0.3 * (2.0 * PI * carrier_b * t).sin()
                + 0.2 * (2.0 * PI * 800.0 * t).sin() * (-t).exp()
        })
        .collect();

    SoundBuffer::from_samples(format!("{SYNTH_SCHEME}modem"), 1, sample_rate, samples)
}
