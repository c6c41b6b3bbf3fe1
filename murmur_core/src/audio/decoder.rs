use anyhow::{Context, Result};
use std::path::Path;

use symphonia::core::{
    audio::SampleBuffer,
    codecs::{DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader, Track},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{Fft, FixedSync, Resampler};

use crate::error::MurmurError;

/// Decode an audio file to mono f32 samples at `target_rate` Hz.
///
/// Channels are averaged, then the clip is resampled if its native rate differs.
pub fn decode_to_f32_mono<P: AsRef<Path>>(path: P, target_rate: u32) -> Result<Vec<f32>> {
    let path = path.as_ref();
    let (mono, sr_in) = decode_native_mono(path)?;

    resample_mono(&mono, sr_in, target_rate)
        .with_context(|| format!("failed to resample {}", path.display()))
}

/// Duration of a recording in seconds.
///
/// Read from the container's frame count when present; otherwise the file is
/// decoded in full.
pub fn probe_duration<P: AsRef<Path>>(path: P) -> Result<f64> {
    let path = path.as_ref();
    let format = open_format(path)?;
    let track = default_track(path, format.as_ref())?;

    if let (Some(frames), Some(rate)) = (track.codec_params.n_frames, track.codec_params.sample_rate)
    {
        if rate > 0 {
            return Ok(frames as f64 / f64::from(rate));
        }
    }

    log::debug!("{}: no frame count in header, decoding", path.display());
    decoded_duration(path)
}

/// Duration of the fully decoded stream.
fn decoded_duration(path: &Path) -> Result<f64> {
    let (mono, rate) = decode_native_mono(path)?;
    Ok(mono.len() as f64 / f64::from(rate))
}

/// Exactly `length_secs` worth of samples starting at `offset_secs`.
///
/// Samples past the end of `samples` are zero.
pub fn cut_window(samples: &[f32], rate: u32, offset_secs: f64, length_secs: f64) -> Vec<f32> {
    let rate = f64::from(rate);
    let start = (offset_secs.max(0.0) * rate).round() as usize;
    let len = (length_secs * rate).round() as usize;

    let mut out = vec![0.0f32; len];
    if start < samples.len() {
        let available = (samples.len() - start).min(len);
        out[..available].copy_from_slice(&samples[start..start + available]);
    }
    out
}

fn open_format(path: &Path) -> Result<Box<dyn FormatReader>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open audio file: {}", path.display()))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    // Hint from extension (optional but helps).
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .with_context(|| {
            format!(
                "unsupported format or failed to probe container: {}",
                path.display()
            )
        })?;

    Ok(probed.format)
}

fn default_track<'a>(path: &Path, format: &'a dyn FormatReader) -> Result<&'a Track> {
    format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| {
            MurmurError::NoAudioTrack {
                path: path.to_path_buf(),
            }
            .into()
        })
}

/// Mono samples at the file's own rate.
fn decode_native_mono(path: &Path) -> Result<(Vec<f32>, u32)> {
    let mut format = open_format(path)?;
    let track = default_track(path, format.as_ref())?;
    let track_id = track.id;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("failed to create decoder for selected track")?;

    let mut interleaved_f32: Vec<f32> = Vec::new();

    // Prefer codec params, fall back to the decoded buffer spec.
    let mut input_sample_rate: Option<u32> = track.codec_params.sample_rate;
    let mut input_channels: Option<usize> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::ResetRequired) => {
                return Err(MurmurError::DecoderReset {
                    path: path.to_path_buf(),
                }
                .into());
            }
            Err(SymphoniaError::IoError(_)) => break, // end of file
            Err(e) => return Err(e).context("error reading next packet"),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::IoError(_)) => continue,
            Err(SymphoniaError::DecodeError(e)) => {
                log::warn!("{}: skipping corrupt packet: {e}", path.display());
                continue;
            }
            Err(SymphoniaError::ResetRequired) => {
                return Err(MurmurError::DecoderReset {
                    path: path.to_path_buf(),
                }
                .into());
            }
            Err(e) => return Err(e).context("unrecoverable decode error"),
        };

        input_sample_rate.get_or_insert(decoded.spec().rate);
        input_channels.get_or_insert(decoded.spec().channels.count());

        let mut sbuf = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
        sbuf.copy_interleaved_ref(decoded);

        interleaved_f32.extend_from_slice(sbuf.samples());
    }

    let sr_in = input_sample_rate.ok_or_else(|| MurmurError::UnknownStreamParameter {
        path: path.to_path_buf(),
        what: "sample rate",
    })?;
    let ch_in = input_channels.ok_or_else(|| MurmurError::UnknownStreamParameter {
        path: path.to_path_buf(),
        what: "channel count",
    })?;

    if interleaved_f32.is_empty() || ch_in == 0 {
        return Err(MurmurError::EmptyAudio {
            path: path.to_path_buf(),
        }
        .into());
    }

    Ok((downmix(interleaved_f32, ch_in), sr_in))
}

fn downmix(interleaved: Vec<f32>, channels: usize) -> Vec<f32> {
    if channels == 1 {
        return interleaved;
    }

    interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Resample a mono clip with rubato's FFT resampler.
pub fn resample_mono(mono: &[f32], sr_in: u32, sr_out: u32) -> Result<Vec<f32>> {
    if sr_in == sr_out || mono.is_empty() {
        return Ok(mono.to_vec());
    }

    // For offline processing, 1024 is a fine starting point.
    let chunk_size: usize = 1024;
    let sub_chunks: usize = 1;

    let mut resampler = Fft::<f32>::new(
        sr_in as usize,
        sr_out as usize,
        chunk_size,
        sub_chunks,
        1,                // mono
        FixedSync::Input, // fixed input chunking, output varies
    )
    .context("failed to construct FFT resampler")?;

    let input_len_frames = mono.len();
    let out_len_frames = resampler.process_all_needed_output_len(input_len_frames);

    let mut out = vec![0.0f32; out_len_frames];

    let input_adapter =
        InterleavedSlice::new(mono, 1, input_len_frames).context("bad input adapter")?;

    let mut output_adapter =
        InterleavedSlice::new_mut(&mut out, 1, out_len_frames).context("bad output adapter")?;

    let (_frames_read, frames_written) = resampler.process_all_into_buffer(
        &input_adapter,
        &mut output_adapter,
        input_len_frames,
        None,
    )?;

    out.truncate(frames_written);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_wav(path: &Path, rate: u32, channels: u16, frames: usize) {
        let spec = hound::WavSpec {
            channels,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..frames {
            let t = i as f32 / rate as f32;
            let v = (t * 220.0 * std::f32::consts::TAU).sin() * 0.5;
            for c in 0..channels {
                // second channel silent, so the mono mix is half the first
                let s = if c == 0 { v } else { 0.0 };
                writer.write_sample((s * i16::MAX as f32) as i16).unwrap();
            }
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn probe_duration_from_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("normal__a.wav");
        write_wav(&path, 4000, 1, 4000 * 5 + 2000);

        let duration = probe_duration(&path).unwrap();
        assert!((duration - 5.5).abs() < 1e-6, "{duration}");
    }

    #[test]
    fn decoded_duration_agrees_with_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("murmur__b.wav");
        write_wav(&path, 4000, 2, 4000 * 3 + 1000);

        let decoded = decoded_duration(&path).unwrap();
        assert!((decoded - 3.25).abs() < 1e-6, "{decoded}");
        assert!((decoded - probe_duration(&path).unwrap()).abs() < 1e-6);
    }

    #[test]
    fn decode_keeps_native_rate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.wav");
        write_wav(&path, 8000, 1, 8000);

        let samples = decode_to_f32_mono(&path, 8000).unwrap();
        assert_eq!(8000, samples.len());
        let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.5).abs() < 0.01, "{peak}");
    }

    #[test]
    fn decode_downmixes_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_wav(&path, 8000, 2, 4000);

        let samples = decode_to_f32_mono(&path, 8000).unwrap();
        assert_eq!(4000, samples.len());
        let peak = samples.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!((peak - 0.25).abs() < 0.01, "{peak}");
    }

    #[test]
    fn decode_resamples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.wav");
        write_wav(&path, 4000, 1, 8000);

        let samples = decode_to_f32_mono(&path, 22_050).unwrap();
        let expected = 2.0 * 22_050.0;
        let ratio = samples.len() as f64 / expected;
        assert!((ratio - 1.0).abs() < 0.05, "{} samples", samples.len());
    }

    #[test]
    fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(decode_to_f32_mono(dir.path().join("nope.wav"), 22_050).is_err());
        assert!(probe_duration(dir.path().join("nope.wav")).is_err());
    }

    #[test]
    fn cut_window_pads_and_offsets() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32).collect();

        assert_eq!(vec![2.0, 3.0, 4.0], cut_window(&samples, 1, 2.0, 3.0));
        assert_eq!(vec![8.0, 9.0, 0.0, 0.0], cut_window(&samples, 1, 8.0, 4.0));
        assert_eq!(vec![0.0; 2], cut_window(&samples, 1, 20.0, 2.0));
        assert_eq!(6, cut_window(&samples, 2, 0.4, 3.0).len());
    }
}
