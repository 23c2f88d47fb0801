//! Audio probing and decoding using symphonia
//!
//! `probe_duration` backs the library duration query and the headless
//! engine; `TrackReader` streams packets to the cpal output engine.

use crate::error::{Error, Result};
use std::fs::File;
use std::path::Path;
use std::time::Duration;
use symphonia::core::codecs::{CodecParameters, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Open a file and return its format reader plus the default audio track
fn open_format(path: &Path) -> Result<(Box<dyn FormatReader>, u32, CodecParameters)> {
    let file = File::open(path)
        .map_err(|e| Error::Decode(format!("Failed to open file {}: {}", path.display(), e)))?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

    let format = probed.format;
    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

    let track_id = track.id;
    let params = track.codec_params.clone();
    Ok((format, track_id, params))
}

/// Playback length of an audio file.
///
/// Uses the frame count from the container header when present; otherwise
/// sums packet durations (headerless MP3 streams).
pub fn probe_duration(path: &Path) -> Result<Duration> {
    let (mut format, track_id, params) = open_format(path)?;

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;
    if sample_rate == 0 {
        return Err(Error::Decode("Sample rate is zero".to_string()));
    }

    if let Some(frames) = params.n_frames {
        return Ok(Duration::from_secs_f64(frames as f64 / sample_rate as f64));
    }

    debug!("No frame count in header, scanning packets: {}", path.display());
    let mut total_ts: u64 = 0;
    loop {
        match format.next_packet() {
            Ok(packet) if packet.track_id() == track_id => total_ts += packet.dur,
            Ok(_) => continue,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break
            }
            Err(e) => return Err(Error::Decode(format!("Failed to read packet: {}", e))),
        }
    }

    let seconds = match params.time_base {
        Some(tb) => {
            let time = tb.calc_time(total_ts);
            time.seconds as f64 + time.frac
        }
        None => total_ts as f64 / sample_rate as f64,
    };
    Ok(Duration::from_secs_f64(seconds))
}

/// Packet-at-a-time decoder feeding the cpal output engine.
///
/// Frames come out as stereo f32 in [-1.0, 1.0]: mono is duplicated to both
/// channels and channels beyond the first two are dropped.
#[cfg(feature = "cpal-output")]
pub struct TrackReader {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn symphonia::core::codecs::Decoder>,
    track_id: u32,
    sample_rate: u32,
    path: std::path::PathBuf,
}

#[cfg(feature = "cpal-output")]
impl TrackReader {
    pub fn open(path: &Path) -> Result<Self> {
        use symphonia::core::codecs::DecoderOptions;

        let (format, track_id, params) = open_format(path)?;
        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        debug!("Opened {} for streaming at {} Hz", path.display(), sample_rate);
        Ok(Self {
            format,
            decoder,
            track_id,
            sample_rate,
            path: path.to_path_buf(),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Decode the next packet of the track and append its frames to `out`.
    ///
    /// Returns `false` at end of stream. Corrupt packets are skipped.
    pub fn read_frames(&mut self, out: &mut Vec<[f32; 2]>) -> Result<bool> {
        use symphonia::core::audio::SampleBuffer;
        use tracing::warn;

        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok(false)
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(e) => return Err(Error::Decode(format!("Failed to read packet: {}", e))),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping corrupt packet in {}: {}", self.path.display(), e);
                    continue;
                }
                Err(e) => return Err(Error::Decode(format!("Decode failed: {}", e))),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            if channels == 0 {
                continue;
            }

            let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            buf.copy_interleaved_ref(decoded);

            out.extend(buf.samples().chunks_exact(channels).map(|frame| {
                let right = if channels > 1 { frame[1] } else { frame[0] };
                [frame[0], right]
            }));
            return Ok(true);
        }
    }
}
