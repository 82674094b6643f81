//! Audio splitter worker: trims a WAV payload to a `[from_time, to_time]`
//! window.
//!
//! `etl_args` is a URL-encoded JSON object:
//!
//! ```text
//! {"from_time": 1.5, "to_time": 3.0, "audio_format": "wav"}
//! ```
//!
//! Frame math: `start = round(from_time * sample_rate)`,
//! `end = round(to_time * sample_rate)`; `end - start` frames are read from
//! `start` and written back with the source's channel count and sample rate
//! as 16-bit PCM. A window reaching past the end of the audio is clamped to
//! what exists.

use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use linkme::distributed_slice;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use aisetl_core::{
    BuildContext, BuildError, TRANSFORMS, Transform, TransformError, TransformResult,
    TransformSpec, transform::ExecMode,
};

/// Trim parameters carried in `etl_args`.
#[derive(Debug, Clone, Deserialize)]
pub struct SplitArgs {
    /// Window start, in seconds.
    pub from_time: f64,
    /// Window end, in seconds.
    pub to_time: f64,
    /// Output encoding; only `wav` is supported.
    #[serde(default = "default_format")]
    pub audio_format: String,
}

fn default_format() -> String {
    "wav".to_string()
}

/// Splitter failure vocabulary; lowered into [`TransformError`] at the seam.
#[derive(Debug, Error)]
pub enum SplitError {
    /// A required argument was absent.
    #[error("missing required argument: {0}")]
    ArgsMissing(&'static str),

    /// `etl_args` did not decode into trim parameters.
    #[error("invalid etl_args: {0}")]
    ArgsInvalid(String),

    /// The payload is not readable audio.
    #[error("unreadable audio payload: {0}")]
    MediaInvalid(String),

    /// The trim window or the re-encode failed.
    #[error("audio trim failed: {0}")]
    TrimFailed(String),
}

impl From<SplitError> for TransformError {
    fn from(err: SplitError) -> Self {
        match err {
            SplitError::ArgsMissing(field) => TransformError::args_missing(field),
            SplitError::ArgsInvalid(reason) => TransformError::args_invalid(reason),
            other => TransformError::failed(other.to_string()),
        }
    }
}

/// The WAV trimming transform.
pub struct AudioSplitter;

impl AudioSplitter {
    /// Decodes and validates `etl_args`.
    pub fn parse_args(raw: &str) -> Result<SplitArgs, SplitError> {
        if raw.is_empty() {
            return Err(SplitError::ArgsMissing("etl_args"));
        }
        let replaced = raw.replace('+', " ");
        let decoded = urlencoding::decode(&replaced)
            .map_err(|e| SplitError::ArgsInvalid(e.to_string()))?;
        let value: serde_json::Value =
            serde_json::from_str(&decoded).map_err(|e| SplitError::ArgsInvalid(e.to_string()))?;
        for field in ["from_time", "to_time"] {
            if value.get(field).is_none() {
                return Err(SplitError::ArgsMissing(field));
            }
        }
        let args: SplitArgs =
            serde_json::from_value(value).map_err(|e| SplitError::ArgsInvalid(e.to_string()))?;
        if args.audio_format != "wav" {
            return Err(SplitError::ArgsInvalid(format!(
                "unsupported audio_format '{}': only wav output is supported",
                args.audio_format,
            )));
        }
        if args.from_time < 0.0 || args.to_time < args.from_time {
            return Err(SplitError::ArgsInvalid(format!(
                "invalid trim window [{}, {}]",
                args.from_time, args.to_time,
            )));
        }
        Ok(args)
    }

    /// Trims the WAV payload to the window described by `args`.
    pub fn trim(payload: &[u8], args: &SplitArgs) -> Result<Vec<u8>, SplitError> {
        let mut reader = hound::WavReader::new(Cursor::new(payload))
            .map_err(|e| SplitError::MediaInvalid(e.to_string()))?;
        let spec = reader.spec();
        let sample_rate = f64::from(spec.sample_rate);
        let total_frames = u64::from(reader.duration());

        let start_frame = (args.from_time * sample_rate).round() as u64;
        let end_frame = ((args.to_time * sample_rate).round() as u64).min(total_frames);
        if start_frame > total_frames {
            return Err(SplitError::TrimFailed(format!(
                "window starts at frame {start_frame} but the audio has {total_frames} frames",
            )));
        }

        reader
            .seek(start_frame as u32)
            .map_err(|e| SplitError::TrimFailed(e.to_string()))?;

        let frames = end_frame.saturating_sub(start_frame);
        let samples = (frames * u64::from(spec.channels)) as usize;
        let out_spec = hound::WavSpec {
            channels: spec.channels,
            sample_rate: spec.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut out = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut out), out_spec)
                .map_err(|e| SplitError::TrimFailed(e.to_string()))?;
            write_samples(&mut reader, &mut writer, &spec, samples)?;
            writer
                .finalize()
                .map_err(|e| SplitError::TrimFailed(e.to_string()))?;
        }
        Ok(out)
    }
}

/// Copies `samples` samples, coercing the source format to 16-bit PCM.
fn write_samples<R, W>(
    reader: &mut hound::WavReader<R>,
    writer: &mut hound::WavWriter<W>,
    spec: &hound::WavSpec,
    samples: usize,
) -> Result<(), SplitError>
where
    R: std::io::Read,
    W: std::io::Write + std::io::Seek,
{
    match spec.sample_format {
        hound::SampleFormat::Int => {
            let shift = i32::from(spec.bits_per_sample) - 16;
            for sample in reader.samples::<i32>().take(samples) {
                let value = sample.map_err(|e| SplitError::TrimFailed(e.to_string()))?;
                let coerced = if shift > 0 {
                    (value >> shift) as i16
                } else if shift < 0 {
                    (value << -shift) as i16
                } else {
                    value as i16
                };
                writer
                    .write_sample(coerced)
                    .map_err(|e| SplitError::TrimFailed(e.to_string()))?;
            }
        }
        hound::SampleFormat::Float => {
            for sample in reader.samples::<f32>().take(samples) {
                let value = sample.map_err(|e| SplitError::TrimFailed(e.to_string()))?;
                let coerced = (value.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16;
                writer
                    .write_sample(coerced)
                    .map_err(|e| SplitError::TrimFailed(e.to_string()))?;
            }
        }
    }
    Ok(())
}

#[async_trait]
impl Transform for AudioSplitter {
    fn exec_mode(&self) -> ExecMode {
        ExecMode::Blocking
    }

    async fn transform(
        &self,
        payload: Bytes,
        _path: &str,
        etl_args: &str,
    ) -> TransformResult<Bytes> {
        let args = Self::parse_args(etl_args)?;
        debug!(
            from = args.from_time,
            to = args.to_time,
            format = %args.audio_format,
            "Trimming audio",
        );
        let out = Self::trim(&payload, &args)?;
        Ok(Bytes::from(out))
    }
}

fn build(_ctx: &BuildContext) -> Result<Arc<dyn Transform>, BuildError> {
    Ok(Arc::new(AudioSplitter))
}

#[distributed_slice(TRANSFORMS)]
static AUDIO_SPLITTER: TransformSpec = TransformSpec {
    kind: "audio-splitter",
    build,
};

#[cfg(test)]
mod tests {
    use super::*;

    /// A mono 16-bit WAV with a sample ramp, `seconds` long.
    fn ramp_wav(sample_rate: u32, seconds: u32) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut out = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut out), spec).unwrap();
            for i in 0..(sample_rate * seconds) {
                writer.write_sample((i % 1000) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        out
    }

    fn args(json: &str) -> String {
        urlencoding::encode(json).into_owned()
    }

    #[tokio::test]
    async fn test_trim_one_second_window() {
        let wav = ramp_wav(16_000, 3);
        let out = AudioSplitter
            .transform(
                Bytes::from(wav),
                "bck/a.wav",
                &args(r#"{"from_time":1.0,"to_time":2.0,"audio_format":"wav"}"#),
            )
            .await
            .unwrap();

        let reader = hound::WavReader::new(Cursor::new(&out[..])).unwrap();
        assert_eq!(reader.spec().sample_rate, 16_000);
        assert_eq!(reader.spec().channels, 1);
        assert_eq!(reader.duration(), 16_000);
    }

    #[tokio::test]
    async fn test_trim_preserves_sample_values() {
        let wav = ramp_wav(1_000, 3);
        let out = AudioSplitter
            .transform(
                Bytes::from(wav),
                "a.wav",
                &args(r#"{"from_time":1.0,"to_time":1.01}"#),
            )
            .await
            .unwrap();

        let mut reader = hound::WavReader::new(Cursor::new(&out[..])).unwrap();
        let samples: Vec<i16> = reader.samples::<i16>().map(Result::unwrap).collect();
        // Frames 1000..1010 of the ramp.
        let expected: Vec<i16> = (1000..1010).map(|i| (i % 1000) as i16).collect();
        assert_eq!(samples, expected);
    }

    #[tokio::test]
    async fn test_window_clamped_to_end_of_audio() {
        let wav = ramp_wav(8_000, 1);
        let out = AudioSplitter
            .transform(
                Bytes::from(wav),
                "a.wav",
                &args(r#"{"from_time":0.5,"to_time":9.0}"#),
            )
            .await
            .unwrap();
        let reader = hound::WavReader::new(Cursor::new(&out[..])).unwrap();
        assert_eq!(reader.duration(), 4_000);
    }

    #[test]
    fn test_stereo_channel_count_preserved() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut wav = Vec::new();
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut wav), spec).unwrap();
            for i in 0..16_000 {
                writer.write_sample((i % 100) as i16).unwrap();
                writer.write_sample(-((i % 100) as i16)).unwrap();
            }
            writer.finalize().unwrap();
        }

        let parsed = AudioSplitter::parse_args(&args(r#"{"from_time":0.0,"to_time":1.0}"#)).unwrap();
        let out = AudioSplitter::trim(&wav, &parsed).unwrap();
        let reader = hound::WavReader::new(Cursor::new(&out[..])).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.duration(), 8_000);
    }

    #[test]
    fn test_missing_args() {
        assert!(matches!(
            AudioSplitter::parse_args(""),
            Err(SplitError::ArgsMissing("etl_args")),
        ));
        assert!(matches!(
            AudioSplitter::parse_args(&args(r#"{"from_time":1.0}"#)),
            Err(SplitError::ArgsMissing("to_time")),
        ));
    }

    #[test]
    fn test_invalid_args() {
        assert!(matches!(
            AudioSplitter::parse_args("not%20json"),
            Err(SplitError::ArgsInvalid(_)),
        ));
        assert!(matches!(
            AudioSplitter::parse_args(&args(r#"{"from_time":1.0,"to_time":2.0,"audio_format":"flac"}"#)),
            Err(SplitError::ArgsInvalid(_)),
        ));
        assert!(matches!(
            AudioSplitter::parse_args(&args(r#"{"from_time":2.0,"to_time":1.0}"#)),
            Err(SplitError::ArgsInvalid(_)),
        ));
    }

    #[test]
    fn test_default_format_is_wav() {
        let parsed = AudioSplitter::parse_args(&args(r#"{"from_time":0.0,"to_time":1.0}"#)).unwrap();
        assert_eq!(parsed.audio_format, "wav");
    }

    #[tokio::test]
    async fn test_non_audio_payload_is_media_invalid() {
        let err = AudioSplitter
            .transform(
                Bytes::from_static(b"definitely not audio"),
                "a.wav",
                &args(r#"{"from_time":0.0,"to_time":1.0}"#),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransformError::Failed(_)));
    }

    #[test]
    fn test_window_start_past_end_fails() {
        let wav = ramp_wav(8_000, 1);
        let parsed = AudioSplitter::parse_args(&args(r#"{"from_time":5.0,"to_time":6.0}"#)).unwrap();
        assert!(matches!(
            AudioSplitter::trim(&wav, &parsed),
            Err(SplitError::TrimFailed(_)),
        ));
    }

    #[test]
    fn test_registered() {
        assert!(aisetl_core::find_transform("audio-splitter").is_some());
    }
}
