//! Audio input capture.
//!
//! A [`Capture`] owns a cpal input stream whose callback pushes samples
//! into a lock-free ring; a drain thread accumulates them off the audio
//! thread. [`Capture::finish`] stops the stream and returns the take as
//! WAV bytes, which the decoder turns back into a playable clip.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::{
    FromSample, Sample, SampleFormat, SizedSample, StreamConfig,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("input device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("unsupported input sample format: {0}")]
    UnsupportedFormat(String),

    #[error(transparent)]
    Devices(#[from] cpal::DevicesError),

    #[error(transparent)]
    Config(#[from] cpal::DefaultStreamConfigError),

    #[error(transparent)]
    Stream(#[from] cpal::BuildStreamError),

    #[error(transparent)]
    Play(#[from] cpal::PlayStreamError),

    #[error(transparent)]
    Encode(#[from] hound::Error),

    #[error("capture drain thread panicked")]
    Worker,
}

/// A finished take, encoded so it can go through the same decode path as
/// an imported file.
#[derive(Debug, Clone)]
pub struct CapturedAudio {
    pub wav_bytes: Vec<u8>,
    pub sample_rate: u32,
    pub channels: u16,
    pub frames: usize,
}

/// An in-flight recording on one input device.
///
/// Dropping a `Capture` aborts it: the stream closes and the drain thread
/// is joined, discarding whatever was buffered.
pub struct Capture {
    stream: Option<cpal::Stream>,
    stop: Arc<AtomicBool>,
    drain: Option<JoinHandle<Vec<f32>>>,
    sample_rate: u32,
    channels: u16,
}

impl Drop for Capture {
    fn drop(&mut self) {
        self.stream.take();
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = self.drain.take() {
            let _ = handle.join();
        }
    }
}

impl Capture {
    /// Start capturing from the named input device, or the system default
    /// when `device_id` is `None`.
    pub fn open(device_id: Option<&str>) -> Result<Self, CaptureError> {
        let host = cpal::default_host();
        let device = match device_id {
            Some(id) => host
                .input_devices()?
                .find(|d| d.name().map(|n| n == id).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceUnavailable(id.to_string()))?,
            None => host
                .default_input_device()
                .ok_or_else(|| CaptureError::DeviceUnavailable("default".to_string()))?,
        };

        let supported = device.default_input_config()?;
        let sample_format = supported.sample_format();
        let config: StreamConfig = supported.into();
        let channels = config.channels;
        let sample_rate = config.sample_rate.0;

        // one second of headroom between the callback and the drain thread
        let capacity = sample_rate as usize * channels as usize;
        let (producer, mut consumer) = rtrb::RingBuffer::<f32>::new(capacity);

        let stop = Arc::new(AtomicBool::new(false));
        let drain_stop = Arc::clone(&stop);
        let drain = thread::spawn(move || {
            let mut samples = Vec::new();
            loop {
                while let Ok(s) = consumer.pop() {
                    samples.push(s);
                }
                if drain_stop.load(Ordering::Acquire) {
                    while let Ok(s) = consumer.pop() {
                        samples.push(s);
                    }
                    break;
                }
                thread::sleep(Duration::from_millis(5));
            }
            samples
        });

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, producer)?,
            SampleFormat::I16 => build_stream::<i16>(&device, &config, producer)?,
            SampleFormat::U16 => build_stream::<u16>(&device, &config, producer)?,
            other => return Err(CaptureError::UnsupportedFormat(other.to_string())),
        };

        stream.play()?;
        tracing::debug!(sample_rate, channels, "input capture started");

        Ok(Self {
            stream: Some(stream),
            stop,
            drain: Some(drain),
            sample_rate,
            channels,
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Stop the stream, drain the remaining samples and encode the take.
    pub fn finish(mut self) -> Result<CapturedAudio, CaptureError> {
        self.stream.take();
        self.stop.store(true, Ordering::Release);

        let mut samples = match self.drain.take() {
            Some(handle) => handle.join().map_err(|_| CaptureError::Worker)?,
            None => return Err(CaptureError::Worker),
        };

        // drop a trailing partial frame if the stream stopped mid-frame
        let whole = samples.len() - samples.len() % self.channels as usize;
        samples.truncate(whole);
        let frames = samples.len() / self.channels as usize;

        let wav_bytes = encode_wav(&samples, self.sample_rate, self.channels)?;
        tracing::debug!(frames, "input capture finished");

        Ok(CapturedAudio {
            wav_bytes,
            sample_rate: self.sample_rate,
            channels: self.channels,
            frames,
        })
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: rtrb::Producer<f32>,
) -> Result<cpal::Stream, CaptureError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let stream = device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for &s in data {
                // ring full: drop the rest of this block
                if producer.push(f32::from_sample(s)).is_err() {
                    break;
                }
            }
        },
        |err| tracing::error!(%err, "input stream error"),
        None,
    )?;
    Ok(stream)
}

fn encode_wav(samples: &[f32], sample_rate: u32, channels: u16) -> Result<Vec<u8>, hound::Error> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &s in samples {
            writer.write_sample(s)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}
