//! # Audio Decoding Helpers
//!
//! Turns a staged WAV payload into the sample stream the Whisper model
//! consumes: mono `f32` in `[-1.0, 1.0]` at the model's sample rate.
//! These helpers are internal to the inference backend; the HTTP layer
//! never inspects audio content.

use anyhow::{anyhow, Result};
use std::path::Path;

/// Read a WAV file and produce mono f32 samples at `target_rate` Hz.
pub fn decode_wav(path: &Path, target_rate: u32) -> Result<Vec<f32>> {
    let mut file = std::fs::File::open(path)
        .map_err(|e| anyhow!("cannot open staged audio {}: {}", path.display(), e))?;
    let (header, data) = wav::read(&mut file)
        .map_err(|e| anyhow!("unsupported audio container (expected WAV): {}", e))?;

    let samples = samples_to_f32(data)?;
    if samples.is_empty() {
        return Err(anyhow!("audio payload contains no samples"));
    }

    let mono = mix_to_mono(&samples, header.channel_count as usize);
    Ok(resample_linear(&mono, header.sampling_rate, target_rate))
}

/// Scale integer PCM of any supported bit depth into float range.
fn samples_to_f32(data: wav::BitDepth) -> Result<Vec<f32>> {
    let samples = match data {
        wav::BitDepth::Eight(s) => s
            .into_iter()
            .map(|v| (v as f32 - 128.0) / 128.0)
            .collect(),
        wav::BitDepth::Sixteen(s) => s.into_iter().map(|v| v as f32 / 32768.0).collect(),
        wav::BitDepth::TwentyFour(s) => s
            .into_iter()
            .map(|v| v as f32 / 8_388_608.0)
            .collect(),
        wav::BitDepth::ThirtyTwoFloat(s) => s,
        wav::BitDepth::Empty => Vec::new(),
    };
    Ok(samples)
}

/// Average interleaved channels down to a single channel.
fn mix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return samples.to_vec();
    }

    samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

/// Linear-interpolation rate conversion. Adequate for speech input; the
/// model is tolerant of the interpolation error.
fn resample_linear(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let out_len = ((samples.len() as f64) / ratio).round() as usize;
    let mut out = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let src_pos = i as f64 * ratio;
        let idx = src_pos as usize;
        let frac = (src_pos - idx as f64) as f32;

        let a = samples[idx.min(samples.len() - 1)];
        let b = samples[(idx + 1).min(samples.len() - 1)];
        out.push(a + (b - a) * frac);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_test_wav(path: &Path, channels: u16, rate: u32, samples: &[i16]) {
        let header = wav::Header::new(wav::header::WAV_FORMAT_PCM, channels, rate, 16);
        let mut file = std::fs::File::create(path).unwrap();
        wav::write(header, &wav::BitDepth::Sixteen(samples.to_vec()), &mut file).unwrap();
    }

    fn temp_wav_path(tag: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("audio-test-{}-{}.wav", tag, uuid::Uuid::new_v4()))
    }

    #[test]
    fn test_decode_mono_16k_passthrough() {
        let path = temp_wav_path("mono");
        let samples: Vec<i16> = (0..1600).map(|i| (i % 100) as i16 * 300).collect();
        write_test_wav(&path, 1, 16000, &samples);

        let decoded = decode_wav(&path, 16000).unwrap();
        assert_eq!(decoded.len(), samples.len());
        // 16384/32768 scales to exactly 0.5.
        assert!((decoded[0] - samples[0] as f32 / 32768.0).abs() < 1e-6);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_decode_averages_stereo() {
        let path = temp_wav_path("stereo");
        // L = 16384, R = 0 on every frame: mono mix is 0.25.
        let samples: Vec<i16> = (0..200).map(|i| if i % 2 == 0 { 16384 } else { 0 }).collect();
        write_test_wav(&path, 2, 16000, &samples);

        let decoded = decode_wav(&path, 16000).unwrap();
        assert_eq!(decoded.len(), 100);
        assert!(decoded.iter().all(|&s| (s - 0.25).abs() < 1e-6));

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_decode_resamples_to_target_rate() {
        let path = temp_wav_path("rate");
        let samples: Vec<i16> = vec![1000; 32000];
        write_test_wav(&path, 1, 32000, &samples);

        let decoded = decode_wav(&path, 16000).unwrap();
        // One second of audio stays one second long at the new rate.
        assert_eq!(decoded.len(), 16000);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_decode_rejects_non_wav_bytes() {
        let path = temp_wav_path("garbage");
        std::fs::write(&path, b"not an audio container at all").unwrap();

        assert!(decode_wav(&path, 16000).is_err());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_resample_identity() {
        let samples = vec![0.1f32, 0.2, 0.3];
        assert_eq!(resample_linear(&samples, 16000, 16000), samples);
    }
}
