//! Tempo-synced click generator mixed after the master bus.

use std::f32::consts::TAU;

const CLICK_SECS: f32 = 0.1;
const CLICK_GAIN: f32 = 0.3;
const ACCENT_GAIN: f32 = 0.45;
const BEAT_FREQ: f32 = 1000.0;
const ACCENT_FREQ: f32 = 1500.0;

/// One in-flight click: a sine burst with an exponential decay envelope.
struct Click {
    phase: f32,
    phase_inc: f32,
    amp: f32,
    decay: f32,
    remaining: u32,
}

impl Click {
    fn new(accent: bool, sample_rate: u32) -> Self {
        let freq = if accent { ACCENT_FREQ } else { BEAT_FREQ };
        let len = ((CLICK_SECS * sample_rate as f32) as u32).max(1);
        Self {
            phase: 0.0,
            phase_inc: freq / sample_rate as f32,
            amp: if accent { ACCENT_GAIN } else { CLICK_GAIN },
            // reaches -60 dB at the end of the burst
            decay: 0.001f32.powf(1.0 / len as f32),
            remaining: len,
        }
    }

    fn next(&mut self) -> f32 {
        let s = (self.phase * TAU).sin() * self.amp;
        self.phase = (self.phase + self.phase_inc).fract();
        self.amp *= self.decay;
        self.remaining -= 1;
        s
    }

    fn done(&self) -> bool {
        self.remaining == 0
    }
}

/// Emits clicks on a beat grid anchored at timeline zero. The grid depends
/// only on tempo and meter, never on where playback started, so beats land
/// at the same timeline positions regardless of seeks.
pub struct Metronome {
    sample_rate: u32,
    enabled: bool,
    beats_per_bar: u32,
    /// Frames per beat at the current tempo.
    interval: f64,
    /// Index of the next beat to emit.
    next_beat: u64,
    click: Option<Click>,
}

impl Metronome {
    pub fn new(sample_rate: u32, bpm: f64, beats_per_bar: u32, enabled: bool) -> Self {
        Self {
            sample_rate,
            enabled,
            beats_per_bar: beats_per_bar.max(1),
            interval: beat_interval(bpm, sample_rate),
            next_beat: 0,
            click: None,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Change tempo and re-anchor the grid at `position` so the next beat
    /// falls on the new grid.
    pub fn set_tempo(&mut self, bpm: f64, position: u64) {
        self.interval = beat_interval(bpm, self.sample_rate);
        self.sync(position);
    }

    pub fn set_beats_per_bar(&mut self, beats_per_bar: u32) {
        self.beats_per_bar = beats_per_bar.max(1);
    }

    /// Point the beat cursor at the first beat at or after `position`.
    pub fn sync(&mut self, position: u64) {
        self.next_beat = (position as f64 / self.interval).ceil() as u64;
        self.click = None;
    }

    /// Add click samples for one block starting at frame `position`.
    pub fn render(&mut self, out: &mut [f32], channels: usize, position: u64) {
        let mut pos = position;
        for frame in out.chunks_mut(channels) {
            let due = (self.next_beat as f64 * self.interval) as u64;
            if pos >= due {
                if self.enabled {
                    let accent = self.next_beat % self.beats_per_bar as u64 == 0;
                    self.click = Some(Click::new(accent, self.sample_rate));
                }
                self.next_beat += 1;
            }
            if let Some(click) = &mut self.click {
                let s = click.next();
                for sample in frame.iter_mut() {
                    *sample += s;
                }
                if click.done() {
                    self.click = None;
                }
            }
            pos += 1;
        }
    }
}

fn beat_interval(bpm: f64, sample_rate: u32) -> f64 {
    60.0 / bpm.max(1.0) * sample_rate as f64
}
