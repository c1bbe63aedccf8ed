//! Pre-decoded PCM decoder
//!
//! Serves clips loaded with decompress-on-load: the whole stream was decoded
//! to interleaved f32 at load time, so playback is a bounded memcpy with no
//! decode work on the audio thread.

use crate::audio::types::AudioFormat;
use crate::decoder::AudioDecoder;

/// Decoder over fully pre-decoded interleaved samples.
pub struct PreloadedDecoder {
    samples: Vec<f32>,
    format: AudioFormat,
    total_frames: i64,
    position: i64,
}

impl PreloadedDecoder {
    pub fn new(samples: Vec<f32>, source_format: AudioFormat) -> Self {
        let channels = source_format.channels.max(1);
        let total_frames = (samples.len() / channels as usize) as i64;

        Self {
            samples,
            format: AudioFormat {
                sample_rate: source_format.sample_rate,
                channels,
                bits_per_sample: 32,
                block_align: channels * 4,
            },
            total_frames,
            position: 0,
        }
    }

    /// Bytes of decoded PCM held, for memory-budget accounting.
    pub fn decoded_bytes(&self) -> usize {
        self.samples.len() * std::mem::size_of::<f32>()
    }
}

impl AudioDecoder for PreloadedDecoder {
    fn decode(&mut self, out: &mut [f32], frames: usize) -> usize {
        if self.position >= self.total_frames {
            return 0;
        }

        let channels = self.format.channels as usize;
        let available = (self.total_frames - self.position) as usize;
        let n = frames.min(available).min(out.len() / channels);
        if n == 0 {
            return 0;
        }

        let start = self.position as usize * channels;
        out[..n * channels].copy_from_slice(&self.samples[start..start + n * channels]);
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
