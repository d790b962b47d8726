//! Effect kinds, parameter metadata and the real-time processing nodes
//! that make up a track's effect chain.

mod dsp;
mod nodes;

pub use dsp::{DelayLine, db_to_linear, linear_to_db};
pub use nodes::{
    Bitcrusher, Chorus, Compressor, Delay, Distortion, Eq3, Filter, Reverb,
};

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum EffectError {
    #[error("unknown effect type: {0}")]
    UnknownKind(String),

    #[error("effect {kind:?} has no parameter {key:?}")]
    UnknownParam { kind: EffectKind, key: ParamKey },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    Reverb,
    Delay,
    Compressor,
    Eq,
    Distortion,
    Filter,
    Chorus,
    Bitcrusher,
}

impl EffectKind {
    pub const ALL: [EffectKind; 8] = [
        EffectKind::Reverb,
        EffectKind::Delay,
        EffectKind::Compressor,
        EffectKind::Eq,
        EffectKind::Distortion,
        EffectKind::Filter,
        EffectKind::Chorus,
        EffectKind::Bitcrusher,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EffectKind::Reverb => "reverb",
            EffectKind::Delay => "delay",
            EffectKind::Compressor => "compressor",
            EffectKind::Eq => "eq",
            EffectKind::Distortion => "distortion",
            EffectKind::Filter => "filter",
            EffectKind::Chorus => "chorus",
            EffectKind::Bitcrusher => "bitcrusher",
        }
    }
}

impl std::fmt::Display for EffectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectKind {
    type Err = EffectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EffectKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| EffectError::UnknownKind(s.to_string()))
    }
}

/// Parameter keys across all effect kinds. Which keys apply to which kind
/// is defined by [`param_specs`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ParamKey {
    /// Reverb tail length in seconds
    Decay,
    /// Reverb pre-delay in seconds
    PreDelay,
    /// Reverb room size, 0..1
    RoomSize,
    /// Dry/wet mix, 0..1
    Wet,
    /// Delay time in seconds
    Time,
    /// Delay feedback, 0..1
    Feedback,
    /// Compressor threshold in dB
    Threshold,
    /// Compression ratio
    Ratio,
    /// Attack time in seconds
    Attack,
    /// Release time in seconds
    Release,
    /// Low shelf gain in dB
    Low,
    /// Mid peak gain in dB
    Mid,
    /// High shelf gain in dB
    High,
    /// Center/cutoff frequency in Hz
    Frequency,
    Q,
    /// Distortion drive, 0..1
    Amount,
    /// Distortion oversampling factor (1, 2 or 4)
    Oversample,
    /// Filter mode: 0 lowpass, 1 highpass, 2 bandpass, 3 notch
    Mode,
    /// Bitcrusher bit depth
    Bits,
    /// Chorus LFO rate in Hz
    Rate,
    /// Chorus depth in milliseconds
    Depth,
}

/// One parameter of an effect kind: its default and its clamping range.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub key: ParamKey,
    pub default: f32,
    pub min: f32,
    pub max: f32,
}

const fn spec(key: ParamKey, default: f32, min: f32, max: f32) -> ParamSpec {
    ParamSpec {
        key,
        default,
        min,
        max,
    }
}

const REVERB_SPECS: &[ParamSpec] = &[
    spec(ParamKey::Decay, 2.0, 0.1, 10.0),
    spec(ParamKey::Wet, 0.25, 0.0, 1.0),
    spec(ParamKey::PreDelay, 0.02, 0.0, 0.25),
    spec(ParamKey::RoomSize, 0.5, 0.0, 1.0),
];

const DELAY_SPECS: &[ParamSpec] = &[
    spec(ParamKey::Time, 0.5, 0.01, 2.0),
    spec(ParamKey::Feedback, 0.3, 0.0, 0.95),
    spec(ParamKey::Wet, 0.25, 0.0, 1.0),
];

const COMPRESSOR_SPECS: &[ParamSpec] = &[
    spec(ParamKey::Threshold, -24.0, -60.0, 0.0),
    spec(ParamKey::Ratio, 4.0, 1.0, 20.0),
    spec(ParamKey::Attack, 0.003, 0.0005, 1.0),
    spec(ParamKey::Release, 0.25, 0.01, 2.0),
];

const EQ_SPECS: &[ParamSpec] = &[
    spec(ParamKey::Low, 0.0, -24.0, 24.0),
    spec(ParamKey::Mid, 0.0, -24.0, 24.0),
    spec(ParamKey::High, 0.0, -24.0, 24.0),
    spec(ParamKey::Frequency, 1000.0, 20.0, 20000.0),
    spec(ParamKey::Q, 1.0, 0.1, 10.0),
];

const DISTORTION_SPECS: &[ParamSpec] = &[
    spec(ParamKey::Amount, 0.4, 0.0, 1.0),
    spec(ParamKey::Oversample, 4.0, 1.0, 4.0),
    spec(ParamKey::Wet, 0.5, 0.0, 1.0),
];

const FILTER_SPECS: &[ParamSpec] = &[
    spec(ParamKey::Mode, 0.0, 0.0, 3.0),
    spec(ParamKey::Frequency, 10000.0, 20.0, 20000.0),
    spec(ParamKey::Q, 0.707, 0.1, 10.0),
];

const CHORUS_SPECS: &[ParamSpec] = &[
    spec(ParamKey::Rate, 1.5, 0.1, 5.0),
    spec(ParamKey::Depth, 3.5, 0.5, 10.0),
    spec(ParamKey::Wet, 0.3, 0.0, 1.0),
];

const BITCRUSHER_SPECS: &[ParamSpec] = &[
    spec(ParamKey::Bits, 8.0, 1.0, 16.0),
    spec(ParamKey::Wet, 0.5, 0.0, 1.0),
];

/// The documented parameter set per effect kind.
pub fn param_specs(kind: EffectKind) -> &'static [ParamSpec] {
    match kind {
        EffectKind::Reverb => REVERB_SPECS,
        EffectKind::Delay => DELAY_SPECS,
        EffectKind::Compressor => COMPRESSOR_SPECS,
        EffectKind::Eq => EQ_SPECS,
        EffectKind::Distortion => DISTORTION_SPECS,
        EffectKind::Filter => FILTER_SPECS,
        EffectKind::Chorus => CHORUS_SPECS,
        EffectKind::Bitcrusher => BITCRUSHER_SPECS,
    }
}

/// Defaults for a kind as a parameter map, used when an effect instance is
/// created without explicit values.
pub fn default_params(kind: EffectKind) -> BTreeMap<ParamKey, f32> {
    param_specs(kind)
        .iter()
        .map(|s| (s.key, s.default))
        .collect()
}

/// Clamp `value` to the documented range of `key` on `kind`.
///
/// Out-of-range values clamp rather than error; a key the kind does not
/// have at all is a contract violation and is rejected.
pub fn clamp_param(kind: EffectKind, key: ParamKey, value: f32) -> Result<f32, EffectError> {
    param_specs(kind)
        .iter()
        .find(|s| s.key == key)
        .map(|s| value.clamp(s.min, s.max))
        .ok_or(EffectError::UnknownParam { kind, key })
}

/// A live signal processor in a track's chain.
///
/// Nodes are pure: they know their neighbors only through the buffer handed
/// to `process` and hold no track or project identity. All methods are
/// real-time safe; buffers are allocated at construction.
pub trait EffectNode: Send {
    fn kind(&self) -> EffectKind;

    /// Process one interleaved block in place.
    fn process(&mut self, buf: &mut [f32], channels: usize);

    /// Apply a parameter write. Values are expected pre-clamped by the
    /// store; unknown keys are ignored here (the store rejects them).
    fn set_param(&mut self, key: ParamKey, value: f32);

    /// Clear internal state (delay lines, envelopes).
    fn reset(&mut self);
}

/// Build a live node for `kind`, starting from defaults and applying
/// `params` on top. Building never fails for a known kind.
pub fn build_effect(
    kind: EffectKind,
    params: &BTreeMap<ParamKey, f32>,
    sample_rate: u32,
    channels: usize,
) -> Box<dyn EffectNode> {
    let mut node: Box<dyn EffectNode> = match kind {
        EffectKind::Reverb => Box::new(Reverb::new(sample_rate, channels)),
        EffectKind::Delay => Box::new(Delay::new(sample_rate, channels)),
        EffectKind::Compressor => Box::new(Compressor::new(sample_rate)),
        EffectKind::Eq => Box::new(Eq3::new(sample_rate, channels)),
        EffectKind::Distortion => Box::new(Distortion::new(channels)),
        EffectKind::Filter => Box::new(Filter::new(sample_rate, channels)),
        EffectKind::Chorus => Box::new(Chorus::new(sample_rate, channels)),
        EffectKind::Bitcrusher => Box::new(Bitcrusher::new()),
    };

    for (&key, &value) in params {
        if let Ok(clamped) = clamp_param(kind, key, value) {
            node.set_param(key, clamped);
        }
    }

    node
}
