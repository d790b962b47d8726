pub mod session;

pub use session::{PlaybackState, Session, SessionError};

pub use loft_audio::AudioArc;
pub use loft_decode::{DecodeError, DecodedAudio, decode_bytes, decode_file};
pub use loft_effects::{EffectError, EffectKind, ParamKey, ParamSpec, param_specs};
pub use loft_engine::{DeviceInfo, list_input_devices, list_output_devices};
pub use loft_model::{
    Clip, ClipId, EffectId, EffectInstance, Meter, Project, ProjectStore, StoreError, Track,
    TrackId, TrackKind, TransportState,
};
pub use loft_record::{Capture, CaptureError, CapturedAudio};
