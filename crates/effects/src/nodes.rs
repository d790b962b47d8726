//! The effect node implementations.
//!
//! All nodes process interleaved f32 blocks in place and allocate only at
//! construction time.

use std::f32::consts::TAU;

use biquad::{Biquad, Coefficients, DirectForm2Transposed, ToHertz, Type};

use crate::dsp::{DelayLine, db_to_linear, linear_to_db};
use crate::{EffectKind, EffectNode, ParamKey};

/// Build biquad coefficients with inputs clamped into the stable region.
/// Falls back to a pass-through section if the cookbook math rejects the
/// parameters, so a node never ends up in an undefined state.
fn make_coeffs(ty: Type<f32>, fs: f32, f0: f32, q: f32) -> Coefficients<f32> {
    let f0 = f0.clamp(10.0, fs * 0.45);
    let q = q.max(0.05);
    Coefficients::<f32>::from_params(ty, fs.hz(), f0.hz(), q).unwrap_or(Coefficients {
        a1: 0.0,
        a2: 0.0,
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
    })
}

// ---------------------------------------------------------------------------
// Reverb
// ---------------------------------------------------------------------------

/// Comb delay base times in seconds, before room-size scaling. Mutually
/// prime lengths keep the tail dense (Schroeder).
const COMB_TIMES: [f32; 4] = [0.0297, 0.0371, 0.0411, 0.0437];
const ALLPASS_TIMES: [f32; 2] = [0.005, 0.0017];
const ALLPASS_G: f32 = 0.7;

struct ReverbChannel {
    pre: DelayLine,
    combs: [DelayLine; 4],
    allpasses: [DelayLine; 2],
}

/// Schroeder reverb: four parallel combs into two series allpasses, with a
/// pre-delay stage in front.
pub struct Reverb {
    sample_rate: f32,
    channels: Vec<ReverbChannel>,
    comb_delays: [usize; 4],
    comb_feedback: [f32; 4],
    allpass_delays: [usize; 2],
    pre_delay_samples: usize,
    decay: f32,
    room_size: f32,
    wet: f32,
}

impl Reverb {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let sr = sample_rate as f32;
        let make_channel = || ReverbChannel {
            pre: DelayLine::new((0.25 * sr) as usize + 1),
            // Sized for room_size = 1.0
            combs: COMB_TIMES.map(|t| DelayLine::new((t * 1.5 * sr) as usize + 2)),
            allpasses: ALLPASS_TIMES.map(|t| DelayLine::new((t * sr) as usize + 2)),
        };

        let mut reverb = Self {
            sample_rate: sr,
            channels: (0..channels.max(1)).map(|_| make_channel()).collect(),
            comb_delays: [1; 4],
            comb_feedback: [0.0; 4],
            allpass_delays: ALLPASS_TIMES.map(|t| ((t * sr) as usize).max(1)),
            pre_delay_samples: 0,
            decay: 2.0,
            room_size: 0.5,
            wet: 0.25,
        };
        reverb.set_param(ParamKey::Decay, 2.0);
        reverb.set_param(ParamKey::RoomSize, 0.5);
        reverb.set_param(ParamKey::PreDelay, 0.02);
        reverb
    }

    fn update_combs(&mut self) {
        // RoomSize scales the comb lengths, Decay sets per-comb feedback so
        // the tail reaches -60 dB after `decay` seconds.
        let scale = 0.5 + self.room_size;
        for (i, base) in COMB_TIMES.iter().enumerate() {
            let time = base * scale;
            self.comb_delays[i] = ((time * self.sample_rate) as usize).max(1);
            self.comb_feedback[i] = 10.0f32.powf(-3.0 * time / self.decay.max(0.01));
        }
    }
}

impl EffectNode for Reverb {
    fn kind(&self) -> EffectKind {
        EffectKind::Reverb
    }

    fn process(&mut self, buf: &mut [f32], channels: usize) {
        let frames = buf.len() / channels;
        let n = self.channels.len();
        for frame in 0..frames {
            for ch in 0..channels {
                let state = &mut self.channels[ch % n];
                let dry = buf[frame * channels + ch];

                state.pre.push(dry);
                let delayed = state.pre.read(self.pre_delay_samples);

                let mut comb_sum = 0.0;
                for (i, comb) in state.combs.iter_mut().enumerate() {
                    let fed_back = comb.read(self.comb_delays[i]);
                    comb.push(delayed + fed_back * self.comb_feedback[i]);
                    comb_sum += fed_back;
                }
                let mut wet = comb_sum * 0.25;

                for (i, allpass) in state.allpasses.iter_mut().enumerate() {
                    let d = allpass.read(self.allpass_delays[i]);
                    let w = wet + ALLPASS_G * d;
                    allpass.push(w);
                    wet = d - ALLPASS_G * w;
                }

                buf[frame * channels + ch] = dry * (1.0 - self.wet) + wet * self.wet;
            }
        }
    }

    fn set_param(&mut self, key: ParamKey, value: f32) {
        match key {
            ParamKey::Decay => {
                self.decay = value;
                self.update_combs();
            }
            ParamKey::RoomSize => {
                self.room_size = value;
                self.update_combs();
            }
            ParamKey::PreDelay => {
                self.pre_delay_samples = (value * self.sample_rate) as usize;
            }
            ParamKey::Wet => self.wet = value,
            _ => {}
        }
    }

    fn reset(&mut self) {
        for ch in &mut self.channels {
            ch.pre.reset();
            for c in &mut ch.combs {
                c.reset();
            }
            for a in &mut ch.allpasses {
                a.reset();
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Delay
// ---------------------------------------------------------------------------

/// Feedback delay.
pub struct Delay {
    sample_rate: f32,
    lines: Vec<DelayLine>,
    delay_samples: usize,
    feedback: f32,
    wet: f32,
}

impl Delay {
    const MAX_TIME: f32 = 2.0;

    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let sr = sample_rate as f32;
        Self {
            sample_rate: sr,
            lines: (0..channels.max(1))
                .map(|_| DelayLine::new((Self::MAX_TIME * sr) as usize + 1))
                .collect(),
            delay_samples: (0.5 * sr) as usize,
            feedback: 0.3,
            wet: 0.25,
        }
    }
}

impl EffectNode for Delay {
    fn kind(&self) -> EffectKind {
        EffectKind::Delay
    }

    fn process(&mut self, buf: &mut [f32], channels: usize) {
        let frames = buf.len() / channels;
        let n = self.lines.len();
        for frame in 0..frames {
            for ch in 0..channels {
                let line = &mut self.lines[ch % n];
                let dry = buf[frame * channels + ch];
                let echoed = line.read(self.delay_samples);
                line.push(dry + echoed * self.feedback);
                buf[frame * channels + ch] = dry * (1.0 - self.wet) + echoed * self.wet;
            }
        }
    }

    fn set_param(&mut self, key: ParamKey, value: f32) {
        match key {
            ParamKey::Time => {
                self.delay_samples = ((value * self.sample_rate) as usize).max(1);
            }
            ParamKey::Feedback => self.feedback = value,
            ParamKey::Wet => self.wet = value,
            _ => {}
        }
    }

    fn reset(&mut self) {
        for line in &mut self.lines {
            line.reset();
        }
    }
}

// ---------------------------------------------------------------------------
// Compressor
// ---------------------------------------------------------------------------

/// Feed-forward peak compressor with a one-pole envelope follower. One
/// detector across all channels so the image does not shift under gain
/// reduction.
pub struct Compressor {
    sample_rate: f32,
    threshold_db: f32,
    ratio: f32,
    attack_coeff: f32,
    release_coeff: f32,
    envelope: f32,
}

impl Compressor {
    pub fn new(sample_rate: u32) -> Self {
        let mut comp = Self {
            sample_rate: sample_rate as f32,
            threshold_db: -24.0,
            ratio: 4.0,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
        };
        comp.set_param(ParamKey::Attack, 0.003);
        comp.set_param(ParamKey::Release, 0.25);
        comp
    }

    fn time_coeff(&self, seconds: f32) -> f32 {
        (-1.0 / (seconds.max(1e-4) * self.sample_rate)).exp()
    }
}

impl EffectNode for Compressor {
    fn kind(&self) -> EffectKind {
        EffectKind::Compressor
    }

    fn process(&mut self, buf: &mut [f32], channels: usize) {
        let frames = buf.len() / channels;
        for frame in 0..frames {
            let mut peak = 0.0f32;
            for ch in 0..channels {
                peak = peak.max(buf[frame * channels + ch].abs());
            }

            let coeff = if peak > self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = peak + coeff * (self.envelope - peak);

            let env_db = linear_to_db(self.envelope);
            let gain = if env_db > self.threshold_db {
                let over = env_db - self.threshold_db;
                db_to_linear(-over * (1.0 - 1.0 / self.ratio))
            } else {
                1.0
            };

            for ch in 0..channels {
                buf[frame * channels + ch] *= gain;
            }
        }
    }

    fn set_param(&mut self, key: ParamKey, value: f32) {
        match key {
            ParamKey::Threshold => self.threshold_db = value,
            ParamKey::Ratio => self.ratio = value.max(1.0),
            ParamKey::Attack => self.attack_coeff = self.time_coeff(value),
            ParamKey::Release => self.release_coeff = self.time_coeff(value),
            _ => {}
        }
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
    }
}

// ---------------------------------------------------------------------------
// Eq (3-band)
// ---------------------------------------------------------------------------

const EQ_LOW_HZ: f32 = 400.0;
const EQ_HIGH_HZ: f32 = 2500.0;

/// Three-band EQ: low shelf at 400 Hz, a mid peaking band at the
/// `Frequency`/`Q` parameters, high shelf at 2.5 kHz.
pub struct Eq3 {
    sample_rate: f32,
    low: Vec<DirectForm2Transposed<f32>>,
    mid: Vec<DirectForm2Transposed<f32>>,
    high: Vec<DirectForm2Transposed<f32>>,
    low_gain_db: f32,
    mid_gain_db: f32,
    high_gain_db: f32,
    mid_freq: f32,
    mid_q: f32,
}

impl Eq3 {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let sr = sample_rate as f32;
        let n = channels.max(1);
        let flat = |ty: Type<f32>, f0: f32, q: f32| {
            let coeffs = make_coeffs(ty, sr, f0, q);
            (0..n)
                .map(|_| DirectForm2Transposed::<f32>::new(coeffs))
                .collect::<Vec<_>>()
        };

        Self {
            sample_rate: sr,
            low: flat(Type::LowShelf(0.0), EQ_LOW_HZ, 0.707),
            mid: flat(Type::PeakingEQ(0.0), 1000.0, 1.0),
            high: flat(Type::HighShelf(0.0), EQ_HIGH_HZ, 0.707),
            low_gain_db: 0.0,
            mid_gain_db: 0.0,
            high_gain_db: 0.0,
            mid_freq: 1000.0,
            mid_q: 1.0,
        }
    }

    fn refresh(&mut self) {
        let low = make_coeffs(
            Type::LowShelf(self.low_gain_db),
            self.sample_rate,
            EQ_LOW_HZ,
            0.707,
        );
        let mid = make_coeffs(
            Type::PeakingEQ(self.mid_gain_db),
            self.sample_rate,
            self.mid_freq,
            self.mid_q,
        );
        let high = make_coeffs(
            Type::HighShelf(self.high_gain_db),
            self.sample_rate,
            EQ_HIGH_HZ,
            0.707,
        );
        for f in &mut self.low {
            f.update_coefficients(low);
        }
        for f in &mut self.mid {
            f.update_coefficients(mid);
        }
        for f in &mut self.high {
            f.update_coefficients(high);
        }
    }
}

impl EffectNode for Eq3 {
    fn kind(&self) -> EffectKind {
        EffectKind::Eq
    }

    fn process(&mut self, buf: &mut [f32], channels: usize) {
        let frames = buf.len() / channels;
        let n = self.low.len();
        for frame in 0..frames {
            for ch in 0..channels {
                let idx = frame * channels + ch;
                let mut x = buf[idx];
                x = self.low[ch % n].run(x);
                x = self.mid[ch % n].run(x);
                x = self.high[ch % n].run(x);
                buf[idx] = x;
            }
        }
    }

    fn set_param(&mut self, key: ParamKey, value: f32) {
        match key {
            ParamKey::Low => self.low_gain_db = value,
            ParamKey::Mid => self.mid_gain_db = value,
            ParamKey::High => self.high_gain_db = value,
            ParamKey::Frequency => self.mid_freq = value,
            ParamKey::Q => self.mid_q = value,
            _ => return,
        }
        self.refresh();
    }

    fn reset(&mut self) {
        for i in 0..self.low.len() {
            self.low[i].reset_state();
            self.mid[i].reset_state();
            self.high[i].reset_state();
        }
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

/// Single biquad filter with selectable mode.
pub struct Filter {
    sample_rate: f32,
    sections: Vec<DirectForm2Transposed<f32>>,
    mode: u8,
    frequency: f32,
    q: f32,
}

impl Filter {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let sr = sample_rate as f32;
        let coeffs = make_coeffs(Type::LowPass, sr, 10000.0, 0.707);
        Self {
            sample_rate: sr,
            sections: (0..channels.max(1))
                .map(|_| DirectForm2Transposed::<f32>::new(coeffs))
                .collect(),
            mode: 0,
            frequency: 10000.0,
            q: 0.707,
        }
    }

    fn refresh(&mut self) {
        let ty = match self.mode {
            1 => Type::HighPass,
            2 => Type::BandPass,
            3 => Type::Notch,
            _ => Type::LowPass,
        };
        let coeffs = make_coeffs(ty, self.sample_rate, self.frequency, self.q);
        for f in &mut self.sections {
            f.update_coefficients(coeffs);
        }
    }
}

impl EffectNode for Filter {
    fn kind(&self) -> EffectKind {
        EffectKind::Filter
    }

    fn process(&mut self, buf: &mut [f32], channels: usize) {
        let frames = buf.len() / channels;
        let n = self.sections.len();
        for frame in 0..frames {
            for ch in 0..channels {
                let idx = frame * channels + ch;
                buf[idx] = self.sections[ch % n].run(buf[idx]);
            }
        }
    }

    fn set_param(&mut self, key: ParamKey, value: f32) {
        match key {
            ParamKey::Mode => self.mode = value.round().clamp(0.0, 3.0) as u8,
            ParamKey::Frequency => self.frequency = value,
            ParamKey::Q => self.q = value,
            _ => return,
        }
        self.refresh();
    }

    fn reset(&mut self) {
        for f in &mut self.sections {
            f.reset_state();
        }
    }
}

// ---------------------------------------------------------------------------
// Distortion
// ---------------------------------------------------------------------------

/// Tanh waveshaper with naive linear-interpolated oversampling.
pub struct Distortion {
    prev: Vec<f32>,
    amount: f32,
    oversample: u8,
    wet: f32,
}

impl Distortion {
    pub fn new(channels: usize) -> Self {
        Self {
            prev: vec![0.0; channels.max(1)],
            amount: 0.4,
            oversample: 4,
            wet: 0.5,
        }
    }

    #[inline]
    fn shape(&self, x: f32) -> f32 {
        let drive = 1.0 + 9.0 * self.amount;
        (drive * x).tanh() / drive.tanh()
    }
}

impl EffectNode for Distortion {
    fn kind(&self) -> EffectKind {
        EffectKind::Distortion
    }

    fn process(&mut self, buf: &mut [f32], channels: usize) {
        let frames = buf.len() / channels;
        let os = self.oversample.max(1) as usize;
        let n = self.prev.len();
        for frame in 0..frames {
            for ch in 0..channels {
                let idx = frame * channels + ch;
                let dry = buf[idx];
                let prev = self.prev[ch % n];

                // Shape at `os` interpolated points between consecutive
                // inputs and average, which pushes shaper harmonics above
                // the band that folds back.
                let mut acc = 0.0;
                for step in 1..=os {
                    let t = step as f32 / os as f32;
                    acc += self.shape(prev + (dry - prev) * t);
                }
                let shaped = acc / os as f32;

                self.prev[ch % n] = dry;
                buf[idx] = dry * (1.0 - self.wet) + shaped * self.wet;
            }
        }
    }

    fn set_param(&mut self, key: ParamKey, value: f32) {
        match key {
            ParamKey::Amount => self.amount = value,
            ParamKey::Oversample => {
                self.oversample = match value.round() as u8 {
                    0 | 1 => 1,
                    2 | 3 => 2,
                    _ => 4,
                };
            }
            ParamKey::Wet => self.wet = value,
            _ => {}
        }
    }

    fn reset(&mut self) {
        self.prev.fill(0.0);
    }
}

// ---------------------------------------------------------------------------
// Chorus
// ---------------------------------------------------------------------------

const CHORUS_BASE_MS: f32 = 20.0;
const CHORUS_MAX_MS: f32 = 40.0;

/// Modulated short delay. Channel LFOs are phase-offset a quarter cycle to
/// widen the image.
pub struct Chorus {
    sample_rate: f32,
    lines: Vec<DelayLine>,
    phase: f32,
    rate_hz: f32,
    depth_ms: f32,
    wet: f32,
}

impl Chorus {
    pub fn new(sample_rate: u32, channels: usize) -> Self {
        let sr = sample_rate as f32;
        Self {
            sample_rate: sr,
            lines: (0..channels.max(1))
                .map(|_| DelayLine::new((CHORUS_MAX_MS / 1000.0 * sr) as usize + 2))
                .collect(),
            phase: 0.0,
            rate_hz: 1.5,
            depth_ms: 3.5,
            wet: 0.3,
        }
    }
}

impl EffectNode for Chorus {
    fn kind(&self) -> EffectKind {
        EffectKind::Chorus
    }

    fn process(&mut self, buf: &mut [f32], channels: usize) {
        let frames = buf.len() / channels;
        let n = self.lines.len();
        let samples_per_ms = self.sample_rate / 1000.0;
        for frame in 0..frames {
            for ch in 0..channels {
                let idx = frame * channels + ch;
                let dry = buf[idx];
                let line = &mut self.lines[ch % n];
                line.push(dry);

                let lfo = (self.phase + ch as f32 * 0.25 * TAU).sin();
                let delay_ms = CHORUS_BASE_MS + self.depth_ms * lfo;
                let wet = line.read_frac(delay_ms * samples_per_ms);

                buf[idx] = dry * (1.0 - self.wet) + wet * self.wet;
            }
            self.phase = (self.phase + TAU * self.rate_hz / self.sample_rate) % TAU;
        }
    }

    fn set_param(&mut self, key: ParamKey, value: f32) {
        match key {
            ParamKey::Rate => self.rate_hz = value,
            ParamKey::Depth => self.depth_ms = value.min(CHORUS_MAX_MS - CHORUS_BASE_MS),
            ParamKey::Wet => self.wet = value,
            _ => {}
        }
    }

    fn reset(&mut self) {
        self.phase = 0.0;
        for line in &mut self.lines {
            line.reset();
        }
    }
}

// ---------------------------------------------------------------------------
// Bitcrusher
// ---------------------------------------------------------------------------

/// Quantizes samples to `2^bits` levels.
pub struct Bitcrusher {
    levels: f32,
    wet: f32,
}

impl Bitcrusher {
    pub fn new() -> Self {
        Self {
            levels: 256.0,
            wet: 0.5,
        }
    }
}

impl Default for Bitcrusher {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectNode for Bitcrusher {
    fn kind(&self) -> EffectKind {
        EffectKind::Bitcrusher
    }

    fn process(&mut self, buf: &mut [f32], _channels: usize) {
        let scale = (self.levels - 1.0) * 0.5;
        let inv = 1.0 / scale;
        for sample in buf.iter_mut() {
            let dry = *sample;
            let crushed = (dry.clamp(-1.0, 1.0) * scale).round() * inv;
            *sample = dry * (1.0 - self.wet) + crushed * self.wet;
        }
    }

    fn set_param(&mut self, key: ParamKey, value: f32) {
        match key {
            ParamKey::Bits => self.levels = 2.0f32.powi(value.round() as i32).max(2.0),
            ParamKey::Wet => self.wet = value,
            _ => {}
        }
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{build_effect, default_params};

    fn impulse(frames: usize, channels: usize) -> Vec<f32> {
        let mut buf = vec![0.0; frames * channels];
        for ch in 0..channels {
            buf[ch] = 1.0;
        }
        buf
    }

    #[test]
    fn delay_echoes_impulse_at_configured_time() {
        let sr = 1000u32;
        let mut delay = Delay::new(sr, 1);
        delay.set_param(ParamKey::Time, 0.1); // 100 samples
        delay.set_param(ParamKey::Wet, 1.0);
        delay.set_param(ParamKey::Feedback, 0.0);

        let mut buf = impulse(300, 1);
        delay.process(&mut buf, 1);

        // Fully wet: nothing before the echo, the echo at 100 samples
        assert_eq!(buf[0], 0.0);
        assert!((buf[100] - 1.0).abs() < 1e-6);
        assert_eq!(buf[150], 0.0);
    }

    #[test]
    fn delay_feedback_produces_repeats() {
        let sr = 1000u32;
        let mut delay = Delay::new(sr, 1);
        delay.set_param(ParamKey::Time, 0.05); // 50 samples
        delay.set_param(ParamKey::Wet, 1.0);
        delay.set_param(ParamKey::Feedback, 0.5);

        let mut buf = impulse(200, 1);
        delay.process(&mut buf, 1);

        assert!((buf[50] - 1.0).abs() < 1e-6);
        assert!((buf[100] - 0.5).abs() < 1e-6);
        assert!((buf[150] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn compressor_reduces_loud_signal() {
        let mut comp = Compressor::new(48000);
        comp.set_param(ParamKey::Threshold, -24.0);
        comp.set_param(ParamKey::Ratio, 10.0);
        comp.set_param(ParamKey::Attack, 0.0005);

        // 0 dBFS square wave, well above threshold
        let mut buf = vec![1.0f32; 48000];
        comp.process(&mut buf, 1);

        // After the attack settles, gain should be well below unity
        let tail = &buf[24000..];
        let peak = tail.iter().cloned().fold(0.0f32, f32::max);
        assert!(peak < 0.5, "expected gain reduction, peak {}", peak);
    }

    #[test]
    fn compressor_passes_quiet_signal() {
        let mut comp = Compressor::new(48000);
        let mut buf = vec![0.01f32; 4800];
        comp.process(&mut buf, 1);
        assert!((buf[4000] - 0.01).abs() < 1e-4);
    }

    #[test]
    fn bitcrusher_quantizes_to_level_grid() {
        let mut crusher = Bitcrusher::new();
        crusher.set_param(ParamKey::Bits, 2.0); // 4 levels
        crusher.set_param(ParamKey::Wet, 1.0);

        let mut buf = vec![0.4f32];
        crusher.process(&mut buf, 1);

        // 4 levels -> scale 1.5, 0.4 * 1.5 = 0.6 rounds to 1 -> 1/1.5
        assert!((buf[0] - 1.0 / 1.5).abs() < 1e-6);
    }

    #[test]
    fn distortion_stays_bounded() {
        let mut dist = Distortion::new(2);
        dist.set_param(ParamKey::Amount, 1.0);
        dist.set_param(ParamKey::Wet, 1.0);

        let mut buf: Vec<f32> = (0..256).map(|i| ((i as f32) * 0.37).sin() * 2.0).collect();
        dist.process(&mut buf, 2);

        assert!(buf.iter().all(|s| s.abs() <= 1.01));
    }

    #[test]
    fn eq_flat_settings_roughly_pass_through() {
        let mut eq = Eq3::new(48000, 1);
        let mut buf: Vec<f32> = (0..480)
            .map(|i| (TAU * 440.0 * i as f32 / 48000.0).sin() * 0.5)
            .collect();
        let reference = buf.clone();
        eq.process(&mut buf, 1);

        let err: f32 = buf
            .iter()
            .zip(&reference)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f32::max);
        assert!(err < 0.05, "flat EQ altered signal by {}", err);
    }

    #[test]
    fn lowpass_filter_attenuates_high_frequencies() {
        let sr = 48000u32;
        let mut filter = Filter::new(sr, 1);
        filter.set_param(ParamKey::Frequency, 500.0);

        // 10 kHz tone, far above cutoff
        let mut buf: Vec<f32> = (0..4800)
            .map(|i| (TAU * 10000.0 * i as f32 / sr as f32).sin())
            .collect();
        filter.process(&mut buf, 1);

        let tail_peak = buf[2400..].iter().cloned().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(tail_peak < 0.1, "expected attenuation, peak {}", tail_peak);
    }

    #[test]
    fn reverb_produces_a_tail() {
        let sr = 48000u32;
        let mut reverb = Reverb::new(sr, 1);
        reverb.set_param(ParamKey::Wet, 1.0);
        reverb.set_param(ParamKey::PreDelay, 0.0);

        let mut buf = impulse(sr as usize / 2, 1);
        reverb.process(&mut buf, 1);

        // Energy should exist well after the impulse
        let tail = &buf[sr as usize / 10..];
        let energy: f32 = tail.iter().map(|s| s * s).sum();
        assert!(energy > 0.0, "reverb tail is silent");
    }

    #[test]
    fn chorus_output_mixes_delayed_copy() {
        let mut chorus = Chorus::new(48000, 2);
        chorus.set_param(ParamKey::Wet, 0.5);
        let mut buf: Vec<f32> = (0..960)
            .map(|i| (TAU * 220.0 * i as f32 / 48000.0).sin())
            .collect();
        let reference = buf.clone();
        chorus.process(&mut buf, 2);
        assert_ne!(buf, reference);
        assert!(buf.iter().all(|s| s.abs() <= 2.0));
    }

    #[test]
    fn nodes_reset_clears_state() {
        for kind in crate::EffectKind::ALL {
            let mut node = build_effect(kind, &default_params(kind), 48000, 2);
            let mut buf = impulse(1024, 2);
            node.process(&mut buf, 2);
            node.reset();
            // A second run over silence after reset must stay silent for
            // state-carrying nodes (delay/reverb tails cleared).
            let mut silence = vec![0.0f32; 2048];
            node.process(&mut silence, 2);
            let peak = silence.iter().cloned().fold(0.0f32, |m, s| m.max(s.abs()));
            assert!(peak < 1e-4, "{kind:?} leaked state after reset: {peak}");
        }
    }
}
