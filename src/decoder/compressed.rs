//! Compressed-format decoder backed by symphonia
//!
//! One pull decoder serves Vorbis, MP3, and FLAC: the container is probed
//! once at open, then packets are decoded on demand into a carry buffer and
//! handed out in exactly the frame counts the mixer asks for.
//!
//! Seeking decodes from the start and skips. Compressed seek tables are
//! unreliable across these formats, and the dominant seek target in this
//! engine is frame 0 (play-from-stopped, loop wrap), where re-opening the
//! reader is cheap.

use crate::audio::types::{AudioFormat, SourceBytes};
use crate::decoder::AudioDecoder;
use crate::error::{Error, Result};
use std::io::Cursor;
use std::sync::Arc;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder as CodecDecoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Cloneable byte view satisfying symphonia's `MediaSource` bounds via
/// `Cursor`.
#[derive(Clone)]
struct ByteView(Arc<SourceBytes>);

impl AsRef<[u8]> for ByteView {
    fn as_ref(&self) -> &[u8] {
        self.0.as_ref().as_ref()
    }
}

/// Pull decoder over a probed symphonia format reader.
pub struct SymphoniaDecoder {
    bytes: Arc<SourceBytes>,
    reader: Box<dyn FormatReader>,
    codec: Box<dyn CodecDecoder>,
    track_id: u32,
    format: AudioFormat,
    total_frames: i64,
    position: i64,

    /// Interleaved samples decoded but not yet handed out
    carry: Vec<f32>,
    carry_pos: usize,

    /// Reused per-packet conversion buffer and the frame capacity it was
    /// sized for
    sample_buf: Option<SampleBuffer<f32>>,
    sample_buf_frames: usize,
}

impl SymphoniaDecoder {
    /// Probe the bytes and set up a decoder for the first audio track.
    pub fn open(bytes: Arc<SourceBytes>) -> Result<Self> {
        let (reader, codec, track_id, format, total_frames) = Self::open_stream(&bytes)?;

        Ok(Self {
            bytes,
            reader,
            codec,
            track_id,
            format,
            total_frames,
            position: 0,
            carry: Vec::new(),
            carry_pos: 0,
            sample_buf: None,
            sample_buf_frames: 0,
        })
    }

    #[allow(clippy::type_complexity)]
    fn open_stream(
        bytes: &Arc<SourceBytes>,
    ) -> Result<(
        Box<dyn FormatReader>,
        Box<dyn CodecDecoder>,
        u32,
        AudioFormat,
        i64,
    )> {
        let mss = MediaSourceStream::new(
            Box::new(Cursor::new(ByteView(Arc::clone(bytes)))),
            Default::default(),
        );

        let probed = symphonia::default::get_probe()
            .format(
                &Hint::new(),
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| Error::DecodeFailed(format!("probe failed: {e}")))?;

        let reader = probed.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::DecodeFailed("no audio track found".into()))?;

        let track_id = track.id;
        let params = &track.codec_params;

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| Error::DecodeFailed("sample rate not found".into()))?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::DecodeFailed("channel count not found".into()))?;
        let bits_per_sample = params.bits_per_sample.unwrap_or(16) as u16;
        let total_frames = params.n_frames.map(|n| n as i64).unwrap_or(0);

        let format = AudioFormat {
            sample_rate,
            channels,
            bits_per_sample,
            block_align: channels * 4, // decoded as f32
        };

        let codec = symphonia::default::get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| Error::DecodeFailed(format!("failed to create decoder: {e}")))?;

        Ok((reader, codec, track_id, format, total_frames))
    }

    /// Decode packets until the carry buffer holds fresh samples.
    /// Returns `false` at end of stream or on a fatal reader error.
    fn refill(&mut self) -> bool {
        loop {
            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                // UnexpectedEof is the normal end-of-stream signal
                Err(_) => return false,
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            match self.codec.decode(&packet) {
                Ok(decoded) => {
                    if decoded.frames() == 0 {
                        continue;
                    }

                    let spec = *decoded.spec();
                    let frame_capacity = decoded.capacity();
                    if frame_capacity > self.sample_buf_frames {
                        self.sample_buf = None;
                        self.sample_buf_frames = frame_capacity;
                    }
                    let buf = self
                        .sample_buf
                        .get_or_insert_with(|| SampleBuffer::new(frame_capacity as u64, spec));

                    buf.copy_interleaved_ref(decoded);
                    self.carry.clear();
                    self.carry.extend_from_slice(buf.samples());
                    self.carry_pos = 0;
                    return true;
                }
                // Skip corrupt packets, matching the demuxer's own recovery
                Err(SymphoniaError::DecodeError(_)) => continue,
                Err(_) => return false,
            }
        }
    }

    /// Discard `frames` frames from the current position.
    fn skip_frames(&mut self, frames: i64) -> i64 {
        let channels = self.format.channels.max(1) as usize;
        let mut remaining = frames;

        while remaining > 0 {
            let carried = (self.carry.len() - self.carry_pos) / channels;
            if carried == 0 {
                if !self.refill() {
                    break;
                }
                continue;
            }
            let take = (carried as i64).min(remaining);
            self.carry_pos += take as usize * channels;
            remaining -= take;
        }

        frames - remaining
    }
}

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&mut self, out: &mut [f32], frames: usize) -> usize {
        let channels = self.format.channels.max(1) as usize;
        let wanted = (frames * channels).min(out.len() - out.len() % channels);
        let mut written = 0;

        while written < wanted {
            let carried = self.carry.len() - self.carry_pos;
            if carried == 0 {
                if !self.refill() {
                    break;
                }
                continue;
            }

            let take = carried.min(wanted - written);
            out[written..written + take]
                .copy_from_slice(&self.carry[self.carry_pos..self.carry_pos + take]);
            self.carry_pos += take;
            written += take;
        }

        let produced = written / channels;
        self.position += produced as i64;
        produced
    }

    fn seek(&mut self, frame: i64) -> bool {
        let target = if self.total_frames > 0 {
            frame.clamp(0, self.total_frames)
        } else {
            frame.max(0)
        };

        // Decode-from-start-and-skip: rebuild the reader, then discard up to
        // the target frame.
        match Self::open_stream(&self.bytes) {
            Ok((reader, codec, track_id, format, total_frames)) => {
                self.reader = reader;
                self.codec = codec;
                self.track_id = track_id;
                self.format = format;
                self.total_frames = total_frames;
                self.carry.clear();
                self.carry_pos = 0;
                self.sample_buf = None;
                self.sample_buf_frames = 0;
                self.position = self.skip_frames(target);
                true
            }
            Err(_) => false,
        }
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn supports_streaming(&self) -> bool {
        true
    }

    fn total_frames(&self) -> i64 {
        self.total_frames
    }
}
