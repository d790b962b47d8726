//! Compressed/container audio decoding into interleaved f32 buffers.
//!
//! Wraps symphonia's probe-and-decode loop for both files on disk and
//! in-memory byte buffers (the latter is how freshly recorded takes and
//! drag-and-dropped assets arrive).

use std::fs::File;
use std::io::Cursor;
use std::path::Path;

use loft_audio::AudioArc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The container or codec is not one we ship a decoder for.
    #[error("unsupported audio format: {0}")]
    UnsupportedFormat(String),

    /// The data was recognized but could not be decoded to the end.
    #[error("corrupt audio data: {0}")]
    CorruptData(String),

    #[error("audio source has no decodable track")]
    NoAudioTrack,

    #[error("decoded audio contains no samples")]
    Empty,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<SymphoniaError> for DecodeError {
    fn from(err: SymphoniaError) -> Self {
        match err {
            SymphoniaError::Unsupported(what) => {
                DecodeError::UnsupportedFormat(what.to_string())
            }
            SymphoniaError::IoError(e) => DecodeError::Io(e),
            other => DecodeError::CorruptData(other.to_string()),
        }
    }
}

/// A fully decoded asset, ready to be placed on the timeline.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub audio: AudioArc,
    pub duration_secs: f64,
}

/// Decode an audio file from disk.
pub fn decode_file(path: &Path) -> Result<DecodedAudio, DecodeError> {
    let file = File::open(path)?;

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    decode_source(Box::new(file), hint)
}

/// Decode an in-memory audio byte buffer (WAV, MP3, FLAC, ...).
pub fn decode_bytes(bytes: &[u8]) -> Result<DecodedAudio, DecodeError> {
    decode_source(Box::new(Cursor::new(bytes.to_vec())), Hint::new())
}

fn decode_source(
    source: Box<dyn MediaSource>,
    hint: Hint,
) -> Result<DecodedAudio, DecodeError> {
    let mss = MediaSourceStream::new(source, Default::default());

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let mut format = probed.format;

    let track = format.default_track().ok_or(DecodeError::NoAudioTrack)?;

    // guessing either of these would commit clips with the wrong
    // duration and pitch, so a stream that omits them is rejected
    let sample_rate = track
        .codec_params
        .sample_rate
        .filter(|&r| r > 0)
        .ok_or_else(|| DecodeError::UnsupportedFormat("stream reports no sample rate".into()))?;
    let channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .filter(|&c| c > 0)
        .ok_or_else(|| DecodeError::UnsupportedFormat("stream reports no channel layout".into()))?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = decoder.decode(&packet)?;
        let spec = *decoded.spec();
        let duration = decoded.capacity() as u64;

        let mut sample_buf = SampleBuffer::<f32>::new(duration, spec);
        sample_buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(sample_buf.samples());
    }

    if samples.is_empty() {
        return Err(DecodeError::Empty);
    }

    let audio = AudioArc::new(samples, sample_rate, channels);
    let duration_secs = audio.duration_secs();

    Ok(DecodedAudio {
        audio,
        duration_secs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn wav_bytes(sample_rate: u32, channels: u16, frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                let s = (i as f32 * 0.01).sin() * 0.5;
                for _ in 0..channels {
                    writer.write_sample(s).unwrap();
                }
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_wav_bytes() {
        let bytes = wav_bytes(44100, 2, 44100);
        let decoded = decode_bytes(&bytes).expect("decode");
        assert_eq!(decoded.audio.sample_rate(), 44100);
        assert_eq!(decoded.audio.channels(), 2);
        assert_eq!(decoded.audio.frames(), 44100);
        assert!((decoded.duration_secs - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_decode_mono_wav_bytes() {
        let bytes = wav_bytes(22050, 1, 2205);
        let decoded = decode_bytes(&bytes).expect("decode");
        assert_eq!(decoded.audio.channels(), 1);
        assert!((decoded.duration_secs - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_decode_file_from_disk() {
        let bytes = wav_bytes(48000, 2, 4800);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        File::create(&path).unwrap().write_all(&bytes).unwrap();

        let decoded = decode_file(&path).expect("decode");
        assert_eq!(decoded.audio.sample_rate(), 48000);
        assert_eq!(decoded.audio.frames(), 4800);
    }

    #[test]
    fn test_zero_sample_rate_is_rejected_not_guessed() {
        // patch the fmt chunk's sample rate field (bytes 24..28) to 0
        let mut bytes = wav_bytes(44100, 2, 4410);
        bytes[24..28].copy_from_slice(&0u32.to_le_bytes());
        assert!(decode_bytes(&bytes).is_err());
    }

    #[test]
    fn test_zero_channel_count_is_rejected_not_guessed() {
        // patch the fmt chunk's channel count field (bytes 22..24) to 0
        let mut bytes = wav_bytes(44100, 2, 4410);
        bytes[22..24].copy_from_slice(&0u16.to_le_bytes());
        assert!(decode_bytes(&bytes).is_err());
    }

    #[test]
    fn test_garbage_bytes_are_rejected() {
        let garbage = vec![0x13u8; 512];
        assert!(decode_bytes(&garbage).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = decode_file(Path::new("/nonexistent/take.wav")).unwrap_err();
        assert!(matches!(err, DecodeError::Io(_)));
    }
}
