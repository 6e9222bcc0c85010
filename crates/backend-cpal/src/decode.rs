// Clip decoding: whole clip to interleaved stereo f32.
// Loop source clips are short preprocessed assets, so decoding the entire
// clip up front is cheaper and simpler than a streaming pipeline, and it
// makes the duration available immediately.

use lull_core::{AudioError, Result};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Fully decoded clip, interleaved stereo
pub struct DecodedClip {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl DecodedClip {
    pub fn frames(&self) -> usize {
        self.samples.len() / 2
    }

    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        (self.frames() as u64 * 1000) / self.sample_rate as u64
    }
}

/// Decode a clip from any seekable media source
pub fn decode_clip(
    source: Box<dyn MediaSource>,
    extension_hint: Option<&str>,
) -> Result<DecodedClip> {
    let mss = MediaSourceStream::new(source, Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension_hint {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| AudioError::DecodingError(format!("Probe failed: {}", e)))?;

    let mut format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| AudioError::DecodingError("No default audio track".to_string()))?;
    let track_id = track.id;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count())
        .unwrap_or(2)
        .max(1);
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| AudioError::DecodingError("Unknown sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| AudioError::DecodingError(format!("No decoder: {}", e)))?;

    let mut samples: Vec<f32> = Vec::new();
    let mut sample_buf: Option<SampleBuffer<f32>> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => {
                return Err(AudioError::DecodingError(format!("Packet read: {}", e)));
            }
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                if sample_buf.is_none() {
                    let spec = *decoded.spec();
                    sample_buf = Some(SampleBuffer::new(decoded.capacity() as u64, spec));
                }
                if let Some(buf) = sample_buf.as_mut() {
                    buf.copy_interleaved_ref(decoded);
                    push_as_stereo(&mut samples, buf.samples(), channels);
                }
            }
            // Recoverable decode error: skip the packet, keep going
            Err(SymphoniaError::DecodeError(e)) => {
                log::debug!("Skipping undecodable packet: {}", e);
            }
            Err(e) => {
                return Err(AudioError::DecodingError(format!("Decode failed: {}", e)));
            }
        }
    }

    if samples.is_empty() {
        return Err(AudioError::DecodingError(
            "Clip decoded to zero samples".to_string(),
        ));
    }

    Ok(DecodedClip {
        samples,
        sample_rate,
    })
}

/// Interleave an arbitrary channel count down/up to stereo
fn push_as_stereo(out: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    match channels {
        1 => {
            for &s in interleaved {
                out.push(s);
                out.push(s);
            }
        }
        2 => out.extend_from_slice(interleaved),
        n => {
            // Multichannel: keep the front pair
            for frame in interleaved.chunks_exact(n) {
                out.push(frame[0]);
                out.push(frame[1]);
            }
        }
    }
}

/// Linear resample of interleaved stereo samples. Quality is sufficient for
/// ambient textures; the preprocessed source assets are already clean.
pub fn resample_stereo(input: &[f32], src_rate: u32, dst_rate: u32) -> Vec<f32> {
    if src_rate == dst_rate || src_rate == 0 || input.len() < 4 {
        return input.to_vec();
    }

    let src_frames = input.len() / 2;
    let dst_frames = ((src_frames as u64 * dst_rate as u64) / src_rate as u64) as usize;
    let mut out = Vec::with_capacity(dst_frames * 2);
    let step = src_frames as f64 / dst_frames as f64;

    for i in 0..dst_frames {
        let pos = i as f64 * step;
        let idx = pos as usize;
        let frac = (pos - idx as f64) as f32;
        let next = (idx + 1).min(src_frames - 1);
        for ch in 0..2 {
            let a = input[idx * 2 + ch];
            let b = input[next * 2 + ch];
            out.push(a + (b - a) * frac);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_duplicates_to_stereo() {
        let mut out = Vec::new();
        push_as_stereo(&mut out, &[0.1, 0.2], 1);
        assert_eq!(out, vec![0.1, 0.1, 0.2, 0.2]);
    }

    #[test]
    fn multichannel_keeps_front_pair() {
        let mut out = Vec::new();
        push_as_stereo(&mut out, &[0.1, 0.2, 0.9, 0.3, 0.4, 0.9], 3);
        assert_eq!(out, vec![0.1, 0.2, 0.3, 0.4]);
    }

    #[test]
    fn resample_preserves_duration_ratio() {
        let input: Vec<f32> = (0..4800 * 2).map(|i| (i % 7) as f32 * 0.1).collect();
        let out = resample_stereo(&input, 48000, 44100);
        let out_frames = out.len() / 2;
        assert_eq!(out_frames, 4410);
    }

    #[test]
    fn resample_same_rate_is_identity() {
        let input = vec![0.5f32, -0.5, 0.25, -0.25];
        assert_eq!(resample_stereo(&input, 44100, 44100), input);
    }

    #[test]
    fn duration_from_frames() {
        let clip = DecodedClip {
            samples: vec![0.0; 44100 * 2],
            sample_rate: 44100,
        };
        assert_eq!(clip.duration_ms(), 1000);
    }
}
