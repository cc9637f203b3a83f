use crate::models::audio_models::AudioLevels;

const FULL_SCALE: f32 = 32768.0;

/// RMS level of 16-bit samples, normalized to 0.0-1.0.
pub fn rms_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f64 = samples
        .iter()
        .map(|&s| {
            let v = s as f64 / FULL_SCALE as f64;
            v * v
        })
        .sum();
    (sum_sq / samples.len() as f64).sqrt() as f32
}

/// Peak absolute level of 16-bit samples, normalized to 0.0-1.0.
pub fn peak_level(samples: &[i16]) -> f32 {
    samples
        .iter()
        .map(|&s| (s as i32).unsigned_abs())
        .max()
        .map_or(0.0, |peak| peak as f32 / FULL_SCALE)
}

pub fn measure(samples: &[i16]) -> AudioLevels {
    AudioLevels {
        rms: rms_level(samples),
        peak: peak_level(samples),
    }
}
