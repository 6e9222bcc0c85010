// Desktop audio backend: cpal output stream + software voice mixer.
//
// The cpal stream is not Send, so a dedicated audio thread owns it; the
// backend only shares the voice table with that thread. Each loaded clip is
// one voice with its own gain, position and looping flag, which is exactly
// the many-concurrent-instances contract the loop scheduler needs.

pub mod decode;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use decode::{decode_clip, resample_stereo};
use lull_backend_api::{AudioBackend, AudioSessionConfig, ClipHandle, ClipSource, ClipStatus};
use lull_core::{AudioError, Result};
use lull_transport_http::download_clip;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

struct Voice {
    samples: Arc<Vec<f32>>,
    frame_pos: usize,
    gain: f32,
    playing: bool,
    looping: bool,
}

impl Voice {
    fn frames(&self) -> usize {
        self.samples.len() / 2
    }
}

type VoiceTable = Arc<Mutex<HashMap<ClipHandle, Voice>>>;

/// cpal-backed implementation of the audio backend adapter
pub struct CpalBackend {
    voices: VoiceTable,
    next_handle: AtomicU64,
    sample_rate: u32,
    shutdown: Arc<AtomicBool>,
    audio_thread: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CpalBackend {
    /// Open the default output device and start the mixer stream.
    /// Fails with `DeviceError` when no usable output device exists.
    pub fn new() -> Result<Self> {
        let voices: VoiceTable = Arc::new(Mutex::new(HashMap::new()));
        let shutdown = Arc::new(AtomicBool::new(false));

        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32>>();
        let thread_voices = voices.clone();
        let thread_shutdown = shutdown.clone();

        let handle = thread::Builder::new()
            .name("lull-audio".into())
            .spawn(move || {
                audio_thread_main(thread_voices, thread_shutdown, ready_tx);
            })
            .map_err(|e| AudioError::DeviceError(format!("Audio thread spawn failed: {}", e)))?;

        let sample_rate = ready_rx
            .recv()
            .map_err(|_| AudioError::DeviceError("Audio thread died during setup".to_string()))??;

        log::info!("[backend] cpal mixer running at {} Hz", sample_rate);

        Ok(Self {
            voices,
            next_handle: AtomicU64::new(1),
            sample_rate,
            shutdown,
            audio_thread: Mutex::new(Some(handle)),
        })
    }

    fn decode_source(&self, source: &ClipSource) -> Result<Vec<f32>> {
        let decoded = match source {
            ClipSource::Path(path) => {
                let file = File::open(path)
                    .map_err(|e| AudioError::LoadError(format!("{}: {}", path, e)))?;
                let ext = Path::new(path)
                    .extension()
                    .and_then(|e| e.to_str())
                    .map(|e| e.to_string());
                decode_clip(Box::new(file), ext.as_deref())?
            }
            ClipSource::Url(url) => {
                let data = download_clip(url)?;
                let ext = url.rsplit('.').next().filter(|e| e.len() <= 4).map(String::from);
                decode_clip(Box::new(std::io::Cursor::new(data)), ext.as_deref())?
            }
        };

        Ok(resample_stereo(
            &decoded.samples,
            decoded.sample_rate,
            self.sample_rate,
        ))
    }

    fn with_voice<R>(
        &self,
        handle: ClipHandle,
        op: &str,
        f: impl FnOnce(&mut Voice) -> R,
    ) -> Result<R> {
        let mut voices = self.voices.lock();
        let voice = voices
            .get_mut(&handle)
            .ok_or_else(|| AudioError::InvalidHandle(format!("{} on {:?}", op, handle)))?;
        Ok(f(voice))
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(handle) = self.audio_thread.lock().take() {
            let _ = handle.join();
        }
    }
}

impl AudioBackend for CpalBackend {
    fn configure(&self, config: &AudioSessionConfig) -> Result<()> {
        // Background/mixing policy is a mobile audio-session concern; the
        // desktop stream already mixes and keeps running unfocused.
        log::debug!("[backend] configure: {:?}", config);
        Ok(())
    }

    fn load(&self, source: &ClipSource) -> Result<ClipHandle> {
        let samples = self.decode_source(source)?;
        let handle = ClipHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));

        log::debug!(
            "[backend] loaded {:?} -> {:?} ({} frames)",
            source.key(),
            handle,
            samples.len() / 2
        );

        self.voices.lock().insert(
            handle,
            Voice {
                samples: Arc::new(samples),
                frame_pos: 0,
                gain: 1.0,
                playing: false,
                looping: false,
            },
        );
        Ok(handle)
    }

    fn play(&self, handle: ClipHandle) -> Result<()> {
        self.with_voice(handle, "play", |v| v.playing = true)
    }

    fn stop(&self, handle: ClipHandle) -> Result<()> {
        self.with_voice(handle, "stop", |v| v.playing = false)
    }

    fn unload(&self, handle: ClipHandle) -> Result<()> {
        self.voices
            .lock()
            .remove(&handle)
            .map(|_| ())
            .ok_or_else(|| AudioError::InvalidHandle(format!("unload on {:?}", handle)))
    }

    fn set_volume(&self, handle: ClipHandle, gain: f32) -> Result<()> {
        let gain = gain.clamp(0.0, 1.0);
        self.with_voice(handle, "set_volume", |v| v.gain = gain)
    }

    fn set_looping(&self, handle: ClipHandle, looping: bool) -> Result<()> {
        self.with_voice(handle, "set_looping", |v| v.looping = looping)
    }

    fn set_position(&self, handle: ClipHandle, position_ms: u64) -> Result<()> {
        let rate = self.sample_rate as u64;
        self.with_voice(handle, "set_position", |v| {
            let frame = ((position_ms * rate) / 1000) as usize;
            v.frame_pos = frame.min(v.frames());
        })
    }

    fn status(&self, handle: ClipHandle) -> Result<ClipStatus> {
        let rate = self.sample_rate as u64;
        self.with_voice(handle, "status", |v| ClipStatus {
            is_loaded: true,
            is_playing: v.playing,
            position_ms: (v.frame_pos as u64 * 1000) / rate,
            duration_ms: Some((v.frames() as u64 * 1000) / rate),
        })
    }
}

fn audio_thread_main(
    voices: VoiceTable,
    shutdown: Arc<AtomicBool>,
    ready_tx: mpsc::Sender<Result<u32>>,
) {
    let host = cpal::default_host();
    let device = match host.default_output_device() {
        Some(d) => d,
        None => {
            let _ = ready_tx.send(Err(AudioError::DeviceError(
                "No output device available".to_string(),
            )));
            return;
        }
    };

    let supported = match device.default_output_config() {
        Ok(c) => c,
        Err(e) => {
            let _ = ready_tx.send(Err(AudioError::DeviceError(format!(
                "No output config: {}",
                e
            ))));
            return;
        }
    };

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels() as usize;
    let config: cpal::StreamConfig = supported.config();

    let mix_voices = voices;
    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _| {
            mix_into(&mix_voices, data, channels);
        },
        |err| log::error!("[backend] stream error: {}", err),
        None,
    );

    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            let _ = ready_tx.send(Err(AudioError::DeviceError(format!(
                "Stream build failed: {}",
                e
            ))));
            return;
        }
    };

    if let Err(e) = stream.play() {
        let _ = ready_tx.send(Err(AudioError::DeviceError(format!(
            "Stream start failed: {}",
            e
        ))));
        return;
    }

    let _ = ready_tx.send(Ok(sample_rate));

    // Keep the stream alive until the backend drops
    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(100));
    }
    drop(stream);
    log::debug!("[backend] audio thread exiting");
}

/// Sum every playing voice into the output buffer
fn mix_into(voices: &VoiceTable, data: &mut [f32], channels: usize) {
    data.fill(0.0);
    if channels == 0 {
        return;
    }

    let mut voices = voices.lock();
    for voice in voices.values_mut() {
        if !voice.playing {
            continue;
        }
        let frames = voice.frames();
        if frames == 0 {
            voice.playing = false;
            continue;
        }

        for frame in data.chunks_exact_mut(channels) {
            if voice.frame_pos >= frames {
                if voice.looping {
                    voice.frame_pos = 0;
                } else {
                    voice.playing = false;
                    break;
                }
            }
            let l = voice.samples[voice.frame_pos * 2] * voice.gain;
            let r = voice.samples[voice.frame_pos * 2 + 1] * voice.gain;
            voice.frame_pos += 1;

            if channels == 1 {
                frame[0] += (l + r) * 0.5;
            } else {
                frame[0] += l;
                frame[1] += r;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn voice(samples: Vec<f32>, playing: bool, looping: bool) -> Voice {
        Voice {
            samples: Arc::new(samples),
            frame_pos: 0,
            gain: 1.0,
            playing,
            looping,
        }
    }

    #[test]
    fn mixes_two_playing_voices() {
        let voices: VoiceTable = Arc::new(Mutex::new(HashMap::new()));
        voices
            .lock()
            .insert(ClipHandle(1), voice(vec![0.25, 0.25, 0.25, 0.25], true, false));
        voices
            .lock()
            .insert(ClipHandle(2), voice(vec![0.5, 0.5, 0.5, 0.5], true, false));

        let mut out = vec![0.0f32; 4];
        mix_into(&voices, &mut out, 2);
        assert_eq!(out, vec![0.75, 0.75, 0.75, 0.75]);
    }

    #[test]
    fn non_looping_voice_stops_at_end() {
        let voices: VoiceTable = Arc::new(Mutex::new(HashMap::new()));
        voices
            .lock()
            .insert(ClipHandle(1), voice(vec![1.0, 1.0], true, false));

        let mut out = vec![0.0f32; 8];
        mix_into(&voices, &mut out, 2);

        assert_eq!(out[0], 1.0);
        assert_eq!(out[2], 0.0);
        assert!(!voices.lock().get(&ClipHandle(1)).unwrap().playing);
    }

    #[test]
    fn looping_voice_wraps() {
        let voices: VoiceTable = Arc::new(Mutex::new(HashMap::new()));
        voices
            .lock()
            .insert(ClipHandle(1), voice(vec![0.5, 0.5], true, true));

        let mut out = vec![0.0f32; 8];
        mix_into(&voices, &mut out, 2);
        assert_eq!(out, vec![0.5; 8]);
    }

    #[test]
    fn gain_scales_output() {
        let voices: VoiceTable = Arc::new(Mutex::new(HashMap::new()));
        let mut v = voice(vec![1.0, 1.0], true, false);
        v.gain = 0.25;
        voices.lock().insert(ClipHandle(1), v);

        let mut out = vec![0.0f32; 2];
        mix_into(&voices, &mut out, 2);
        assert_eq!(out, vec![0.25, 0.25]);
    }
}
