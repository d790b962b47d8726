use std::sync::Arc;

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

/// Shared, immutable interleaved audio sample data.
///
/// `AudioArc` is the playable handle produced by the decoder and referenced
/// by clips. The sample data lives in an `Arc<[f32]>`, so cloning only bumps
/// a refcount and many clips (or a clip and its live player) can share the
/// same underlying audio without copying.
///
/// # Examples
///
/// ```
/// use loft_audio::AudioArc;
///
/// let samples = vec![0.0, 0.5, 1.0, 0.5]; // [L, R, L, R]
/// let audio = AudioArc::new(samples, 44100, 2);
/// assert_eq!(audio.frames(), 2);
///
/// // Clone is cheap - just bumps the refcount
/// let audio2 = audio.clone();
/// assert_eq!(audio2.frames(), 2);
/// ```
#[derive(Clone)]
pub struct AudioArc {
    samples: Arc<[f32]>,
    sample_rate: u32,
    channels: u16,
}

impl AudioArc {
    /// Create a new `AudioArc` from owned interleaved samples.
    ///
    /// # Panics
    ///
    /// Panics if `channels` is 0 or if `samples.len()` is not divisible by
    /// `channels`.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        assert!(channels > 0, "channels must be greater than 0");
        assert_eq!(
            samples.len() % channels as usize,
            0,
            "samples.len() must be divisible by channels"
        );
        Self {
            samples: Arc::from(samples),
            sample_rate,
            channels,
        }
    }

    /// An empty buffer. Used as the placeholder source when a serialized
    /// project is loaded without its assets.
    pub fn empty() -> Self {
        Self {
            samples: Arc::from(Vec::new()),
            sample_rate: 44100,
            channels: 2,
        }
    }

    /// All interleaved samples. For stereo the layout is [L, R, L, R, ...].
    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// The inner `Arc<[f32]>`, for refcount checks in tests.
    pub fn samples_arc(&self) -> &Arc<[f32]> {
        &self.samples
    }

    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    #[inline]
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Number of frames (samples per channel).
    #[inline]
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels as usize
    }

    /// Total number of samples (frames * channels).
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Resample to a target sample rate.
    ///
    /// Returns a cheap clone when the audio is already at the target rate,
    /// otherwise performs sinc interpolation resampling.
    pub fn resample(&self, target_sample_rate: u32) -> anyhow::Result<Self> {
        if self.sample_rate == target_sample_rate {
            return Ok(self.clone());
        }
        resample_audio_arc(self, target_sample_rate)
    }
}

impl std::fmt::Debug for AudioArc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioArc")
            .field("frames", &self.frames())
            .field("sample_rate", &self.sample_rate)
            .field("channels", &self.channels)
            .field("duration_secs", &self.duration_secs())
            .finish()
    }
}

/// Resample an `AudioArc` to a target sample rate with sinc interpolation.
pub fn resample_audio_arc(audio: &AudioArc, target_sample_rate: u32) -> anyhow::Result<AudioArc> {
    if audio.sample_rate == target_sample_rate {
        return Ok(audio.clone());
    }
    if audio.is_empty() {
        return Ok(AudioArc::new(
            Vec::new(),
            target_sample_rate,
            audio.channels,
        ));
    }

    let channels = audio.channels as usize;
    let input_frames = audio.frames();

    let resample_ratio = target_sample_rate as f64 / audio.sample_rate as f64;
    let output_frames = (input_frames as f64 * resample_ratio).ceil() as usize;

    // rubato wants per-channel (non-interleaved) input
    let mut input_channels = vec![Vec::with_capacity(input_frames); channels];
    for frame_idx in 0..input_frames {
        for ch in 0..channels {
            input_channels[ch].push(audio.samples()[frame_idx * channels + ch]);
        }
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let mut resampler =
        SincFixedIn::<f32>::new(resample_ratio, 2.0, params, input_frames, channels)?;

    let output_channels = resampler.process(&input_channels, None)?;

    let mut output_samples = Vec::with_capacity(output_frames * channels);
    for frame_idx in 0..output_channels[0].len() {
        for ch in 0..channels {
            output_samples.push(output_channels[ch][frame_idx]);
        }
    }

    Ok(AudioArc::new(
        output_samples,
        target_sample_rate,
        audio.channels,
    ))
}
