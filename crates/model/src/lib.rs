//! The serializable project model and its store.
//!
//! This crate owns the canonical description of a project: tracks, clips,
//! effect chains, tempo and transport position. Nothing here touches audio
//! hardware; the engine reads this model to build its render graph.

mod store;

pub use store::{ProjectStore, StoreError};

use loft_audio::AudioArc;
use loft_effects::{EffectKind, ParamKey, default_params};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TrackId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ClipId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EffectId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackKind {
    Audio,
    Midi,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Meter {
    pub beats_per_bar: u32,
    pub beat_unit: u32,
}

impl Default for Meter {
    fn default() -> Self {
        Self {
            beats_per_bar: 4,
            beat_unit: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TransportState {
    pub current_time_secs: f64,
    pub is_playing: bool,
    pub is_recording: bool,
}

/// A time-bounded placement of decoded audio on a track.
///
/// The source handle is skipped during serialization; a persistence layer
/// is expected to store asset references next to the model and re-decode
/// on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    pub name: String,
    pub start_secs: f64,
    pub duration_secs: f64,
    #[serde(skip, default = "AudioArc::empty")]
    pub source: AudioArc,
}

impl Clip {
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectInstance {
    pub id: EffectId,
    pub kind: EffectKind,
    pub enabled: bool,
    pub params: BTreeMap<ParamKey, f32>,
}

impl EffectInstance {
    pub fn new(id: EffectId, kind: EffectKind) -> Self {
        Self {
            id,
            kind,
            enabled: true,
            params: default_params(kind),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub kind: TrackKind,
    /// Linear gain, 0..1
    pub volume: f32,
    /// -1 (full left) .. 1 (full right)
    pub pan: f32,
    pub muted: bool,
    pub solo: bool,
    pub record_armed: bool,
    pub input_device_id: Option<String>,
    pub output_device_id: Option<String>,
    /// Insertion order
    pub clips: Vec<Clip>,
    /// Signal-chain order: gain/pan -> effects[0] -> ... -> master
    pub effects: Vec<EffectInstance>,
}

impl Track {
    pub fn new(id: TrackId, name: String, kind: TrackKind) -> Self {
        Self {
            id,
            name,
            kind,
            volume: 0.8,
            pan: 0.0,
            muted: false,
            solo: false,
            record_armed: false,
            input_device_id: None,
            output_device_id: None,
            clips: Vec::new(),
            effects: Vec::new(),
        }
    }

    pub fn clip(&self, id: ClipId) -> Option<&Clip> {
        self.clips.iter().find(|c| c.id == id)
    }

    pub fn effect(&self, id: EffectId) -> Option<&EffectInstance> {
        self.effects.iter().find(|e| e.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    pub bpm: f64,
    pub meter: Meter,
    pub metronome_enabled: bool,
    /// Linear master bus gain
    pub master_gain: f32,
    pub tracks: Vec<Track>,
    pub transport: TransportState,
    pub zoom_px_per_second: f64,
}

impl Project {
    pub fn track(&self, id: TrackId) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    pub fn track_mut(&mut self, id: TrackId) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| t.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_serialization_round_trip() {
        let mut store = ProjectStore::new();
        let track = store.add_track(TrackKind::Audio);
        store.set_track_volume(track, 0.5).unwrap();
        let fx = store.add_effect(track, EffectKind::Delay).unwrap();
        store
            .set_effect_param(track, fx, ParamKey::Feedback, 0.6)
            .unwrap();

        let json = serde_json::to_string(store.project()).expect("serialize");
        let decoded: Project = serde_json::from_str(&json).expect("deserialize");

        assert_eq!(decoded.name, store.project().name);
        assert_eq!(decoded.tracks.len(), store.project().tracks.len());
        let dt = decoded.track(track).unwrap();
        assert_eq!(dt.volume, 0.5);
        assert_eq!(dt.effects[0].kind, EffectKind::Delay);
        assert_eq!(dt.effects[0].params[&ParamKey::Feedback], 0.6);
    }

    #[test]
    fn test_clip_source_is_not_serialized() {
        let mut store = ProjectStore::new();
        let track = store.project().tracks[0].id;
        let audio = AudioArc::new(vec![0.1; 44100], 44100, 1);
        let clip = store.add_clip(track, "take".into(), audio, 1.5).unwrap();

        let json = serde_json::to_string(store.project()).expect("serialize");
        assert!(!json.contains("samples"));

        let decoded: Project = serde_json::from_str(&json).expect("deserialize");
        let dc = decoded.track(track).unwrap().clip(clip).unwrap();
        assert_eq!(dc.start_secs, 1.5);
        assert!(dc.source.is_empty());
        assert!((dc.duration_secs - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_effect_instance_starts_with_defaults() {
        let fx = EffectInstance::new(EffectId(1), EffectKind::Reverb);
        assert!(fx.enabled);
        assert_eq!(fx.params[&ParamKey::Decay], 2.0);
        assert_eq!(fx.params[&ParamKey::Wet], 0.25);
    }
}
