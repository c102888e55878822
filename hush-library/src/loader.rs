//! Sound decoding with Symphonia, resampled to the engine rate with Rubato

use hush_audio::{AudioBuffer, SoundDecoder};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;
use tracing::{debug, warn};

/// Errors that can occur while decoding a sound file
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("no audio track found in file")]
    NoAudioTrack,
    #[error("decode error: {0}")]
    Decode(String),
}

/// Decodes whole files into memory at a fixed sample rate
#[derive(Debug, Clone)]
pub struct SoundLoader {
    target_sample_rate: u32,
}

impl Default for SoundLoader {
    fn default() -> Self {
        Self::new(48000)
    }
}

impl SoundLoader {
    pub fn new(target_sample_rate: u32) -> Self {
        Self { target_sample_rate }
    }

    pub fn target_sample_rate(&self) -> u32 {
        self.target_sample_rate
    }

    /// Decode a file to interleaved f32 at the target rate
    pub fn load(&self, path: &Path) -> Result<AudioBuffer, DecodeError> {
        let file = std::fs::File::open(path)?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .map_err(|e| DecodeError::Decode(e.to_string()))?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or(DecodeError::NoAudioTrack)?;
        let track_id = track.id;
        let params = track.codec_params.clone();

        let source_rate = params.sample_rate.unwrap_or(44100);
        let mut channels = params.channels.map(|c| c.count() as u16).unwrap_or(2);

        let mut decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| DecodeError::Decode(e.to_string()))?;

        let mut samples: Vec<f32> = Vec::new();
        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(DecodeError::Decode(e.to_string())),
            };
            if packet.track_id() != track_id {
                continue;
            }

            let decoded = match decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    // A corrupt packet is skipped, not fatal
                    warn!(path = %path.display(), error = e, "skipping bad packet");
                    continue;
                }
                Err(e) => return Err(DecodeError::Decode(e.to_string())),
            };

            let spec = *decoded.spec();
            channels = spec.channels.count() as u16;
            let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }

        if samples.is_empty() {
            return Err(DecodeError::Decode("file contains no samples".into()));
        }

        let samples = if source_rate != self.target_sample_rate {
            resample(&samples, source_rate, self.target_sample_rate, channels)?
        } else {
            samples
        };

        debug!(
            path = %path.display(),
            source_rate,
            channels,
            frames = samples.len() / channels.max(1) as usize,
            "decoded sound"
        );
        Ok(AudioBuffer::new(samples, self.target_sample_rate, channels))
    }
}

impl SoundDecoder for SoundLoader {
    fn decode(&self, location: &Path) -> Result<AudioBuffer, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.load(location)?)
    }
}

/// Convert interleaved audio between sample rates
fn resample(samples: &[f32], from: u32, to: u32, channels: u16) -> Result<Vec<f32>, DecodeError> {
    use rubato::{FftFixedInOut, Resampler};

    let channels = channels.max(1) as usize;
    let frames = samples.len() / channels;

    let mut resampler = FftFixedInOut::<f32>::new(from as usize, to as usize, 1024, channels)
        .map_err(|e| DecodeError::Decode(e.to_string()))?;
    let chunk = resampler.input_frames_next();

    let planar: Vec<Vec<f32>> = (0..channels)
        .map(|ch| samples.iter().skip(ch).step_by(channels).copied().collect())
        .collect();
    let mut out: Vec<Vec<f32>> = vec![Vec::with_capacity(frames * to as usize / from as usize + chunk); channels];

    let mut pos = 0;
    while pos < frames {
        let take = chunk.min(frames - pos);
        let block: Vec<Vec<f32>> = planar
            .iter()
            .map(|ch| {
                let mut block = ch[pos..pos + take].to_vec();
                block.resize(chunk, 0.0);
                block
            })
            .collect();

        let resampled = resampler
            .process(&block, None)
            .map_err(|e| DecodeError::Decode(e.to_string()))?;

        // A zero-padded tail only contributes its share of output
        let keep = if take == chunk {
            usize::MAX
        } else {
            take * to as usize / from as usize
        };
        for (dst, src) in out.iter_mut().zip(resampled) {
            dst.extend(src.into_iter().take(keep));
        }
        pos += take;
    }

    let out_frames = out.first().map_or(0, Vec::len);
    let mut interleaved = Vec::with_capacity(out_frames * channels);
    for frame in 0..out_frames {
        for ch in &out {
            interleaved.push(ch[frame]);
        }
    }
    Ok(interleaved)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::io::Write;
    use std::path::PathBuf;

    /// Write a 16-bit PCM WAV file
    pub(crate) fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: usize) {
        let data_len = (frames * channels as usize * 2) as u32;
        let mut bytes = Vec::with_capacity(44 + data_len as usize);
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVEfmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&channels.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * channels as u32 * 2).to_le_bytes());
        bytes.extend_from_slice(&(channels * 2).to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        for i in 0..frames * channels as usize {
            let v = ((i as f32 * 0.01).sin() * 8000.0) as i16;
            bytes.extend_from_slice(&v.to_le_bytes());
        }

        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(&bytes).unwrap();
    }

    pub(crate) fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("hush-test-{}-{name}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_decode_wav_at_target_rate() {
        let dir = scratch_dir("decode");
        let path = dir.join("tone.wav");
        write_wav(&path, 48000, 2, 4800);

        let buffer = SoundLoader::new(48000).load(&path).unwrap();
        assert_eq!(buffer.sample_rate(), 48000);
        assert_eq!(buffer.channels(), 2);
        assert_eq!(buffer.frames(), 4800);
    }

    #[test]
    fn test_resamples_to_target() {
        let dir = scratch_dir("resample");
        let path = dir.join("low.wav");
        write_wav(&path, 24000, 1, 24000);

        let buffer = SoundLoader::new(48000).load(&path).unwrap();
        assert_eq!(buffer.sample_rate(), 48000);
        assert_eq!(buffer.channels(), 1);
        let frames = buffer.frames() as f32;
        assert!((frames - 48000.0).abs() < 48000.0 * 0.05, "frames = {frames}");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = SoundLoader::default().load(Path::new("/definitely/not/here.wav"));
        assert!(matches!(result, Err(DecodeError::Io(_))));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let dir = scratch_dir("garbage");
        let path = dir.join("noise.wav");
        std::fs::write(&path, b"this is not audio").unwrap();

        let result = SoundLoader::default().load(&path);
        assert!(matches!(result, Err(DecodeError::Decode(_))));
    }
}
