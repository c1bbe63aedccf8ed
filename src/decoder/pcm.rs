//! WAV / raw PCM decoder
//!
//! Parses RIFF/WAVE containers and decodes integer and float PCM to
//! interleaved f32. This is the simplest decoder, used for uncompressed
//! clips and as the chain's last-resort fallback, and the only one that is
//! allocation-free on the decode path.

use crate::audio::types::{AudioFormat, SourceBytes};
use crate::decoder::AudioDecoder;
use std::sync::Arc;

/// Uncompressed PCM decoder over an owned byte buffer.
pub struct PcmDecoder {
    bytes: Arc<SourceBytes>,
    format: AudioFormat,
    is_float: bool,

    /// Offset and length of the PCM payload within `bytes`
    data_start: usize,
    data_len: usize,

    total_frames: i64,
    position: i64,
}

impl PcmDecoder {
    /// Cheap container check: RIFF/WAVE magic at the expected offsets.
    pub fn sniff(data: &[u8]) -> bool {
        data.len() >= 12 && &data[0..4] == b"RIFF" && &data[8..12] == b"WAVE"
    }

    /// Parse a RIFF/WAVE container. Returns `None` when the container is
    /// malformed (missing `fmt ` or `data`, or an unsupported format tag).
    pub fn open_wav(bytes: Arc<SourceBytes>) -> Option<Self> {
        let data = bytes.as_ref().as_ref();
        if !Self::sniff(data) || data.len() < 44 {
            return None;
        }

        let mut format = AudioFormat::default();
        let mut is_float = false;
        let mut have_fmt = false;

        // Walk the chunk list. Chunks are 2-byte aligned; odd payloads carry
        // a trailing pad byte.
        let mut pos = 12usize;
        while pos + 8 <= data.len() {
            let tag = &data[pos..pos + 4];
            let chunk_size =
                u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]])
                    as usize;
            let payload = pos + 8;

            if tag == b"fmt " {
                if chunk_size < 16 || payload + 16 > data.len() {
                    return None;
                }
                let fmt = &data[payload..payload + 16];

                let audio_format = u16::from_le_bytes([fmt[0], fmt[1]]);
                // 1 = integer PCM, 3 = IEEE float
                if audio_format != 1 && audio_format != 3 {
                    return None;
                }
                is_float = audio_format == 3;

                format.channels = u16::from_le_bytes([fmt[2], fmt[3]]);
                format.sample_rate = u32::from_le_bytes([fmt[4], fmt[5], fmt[6], fmt[7]]);
                format.bits_per_sample = u16::from_le_bytes([fmt[14], fmt[15]]);
                format.block_align = format.channels * (format.bits_per_sample / 8);
                have_fmt = true;
            } else if tag == b"data" {
                if !have_fmt || format.block_align == 0 {
                    return None;
                }
                let data_start = payload;
                let data_len = chunk_size.min(data.len().saturating_sub(data_start));
                let total_frames = (data_len / format.block_align as usize) as i64;

                return Some(Self {
                    bytes,
                    format,
                    is_float,
                    data_start,
                    data_len,
                    total_frames,
                    position: 0,
                });
            }

            pos = payload + chunk_size + (chunk_size & 1);
        }

        None
    }

    /// Treat the entire buffer as raw 16-bit stereo 44.1 kHz PCM.
    pub fn open_raw(bytes: Arc<SourceBytes>) -> Self {
        let format = AudioFormat {
            sample_rate: 44100,
            channels: 2,
            bits_per_sample: 16,
            block_align: 4,
        };
        let data_len = bytes.len();
        let total_frames = (data_len / format.block_align as usize) as i64;

        Self {
            bytes,
            format,
            is_float: false,
            data_start: 0,
            data_len,
            total_frames,
            position: 0,
        }
    }
}

impl AudioDecoder for PcmDecoder {
    fn decode(&mut self, out: &mut [f32], frames: usize) -> usize {
        if self.data_len == 0 || self.position >= self.total_frames {
            return 0;
        }

        let channels = self.format.channels as usize;
        let available = (self.total_frames - self.position) as usize;
        let n = frames.min(available).min(out.len() / channels.max(1));
        if n == 0 {
            return 0;
        }

        let samples = n * channels;
        let byte_offset =
            self.data_start + self.position as usize * self.format.block_align as usize;
        let src = &self.bytes.as_ref().as_ref()[byte_offset..];

        match (self.is_float, self.format.bits_per_sample) {
            (true, 32) => {
                for (i, slot) in out[..samples].iter_mut().enumerate() {
                    let b = i * 4;
                    *slot = f32::from_le_bytes([src[b], src[b + 1], src[b + 2], src[b + 3]]);
                }
            }
            (false, 16) => {
                const SCALE: f32 = 1.0 / 32768.0;
                for (i, slot) in out[..samples].iter_mut().enumerate() {
                    let b = i * 2;
                    *slot = i16::from_le_bytes([src[b], src[b + 1]]) as f32 * SCALE;
                }
            }
            (false, 24) => {
                const SCALE: f32 = 1.0 / 8388608.0; // 2^23
                for (i, slot) in out[..samples].iter_mut().enumerate() {
                    let b = i * 3;
                    // Sign-extend the 24-bit little-endian value
                    let raw = ((src[b + 2] as i32) << 24)
                        | ((src[b + 1] as i32) << 16)
                        | ((src[b] as i32) << 8);
                    *slot = (raw >> 8) as f32 * SCALE;
                }
            }
            _ => {
                // Unsupported depth decodes as silence rather than failing
                // the audio thread.
                out[..samples].fill(0.0);
            }
        }

        self.position += n as i64;
        n
    }

    fn seek(&mut self, frame: i64) -> bool {
        self.position = frame.clamp(0, self.total_frames);
        true
    }

    fn format(&self) -> AudioFormat {
        self.format
    }

    fn supports_streaming(&self) -> bool {
        false
    }

    fn total_frames(&self) -> i64 {
        self.total_frames
    }
}
