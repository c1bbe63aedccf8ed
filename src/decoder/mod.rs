//! Audio decoders
//!
//! The decoder contract the mixer depends on, plus the fixed set of concrete
//! decoders behind it. Dispatch is a sum type rather than a boxed trait
//! object, so the audio thread never chases a heap vtable.
//!
//! Opening runs a chain: WAV/PCM is sniffed first, then the symphonia probe
//! (Vorbis, MP3, FLAC), and finally the raw-PCM fallback that treats the
//! whole buffer as 16-bit stereo 44.1 kHz.

use crate::audio::types::{AudioFormat, SourceBytes};
use crate::error::{Error, Result};
use std::sync::Arc;

mod compressed;
mod pcm;
mod preloaded;

pub use compressed::SymphoniaDecoder;
pub use pcm::PcmDecoder;
pub use preloaded::PreloadedDecoder;

/// Capability contract every decoder satisfies.
///
/// - `decode` fills `out` with interleaved float samples at the channel
///   count reported by `format`, and may produce fewer frames than
///   requested at end of stream. Producing 0 signals EOS.
/// - `seek` repositions, clamping to `[0, total_frames]`.
/// - `total_frames` is 0 when unknown.
pub trait AudioDecoder {
    fn decode(&mut self, out: &mut [f32], frames: usize) -> usize;
    fn seek(&mut self, frame: i64) -> bool;
    fn format(&self) -> AudioFormat;
    fn supports_streaming(&self) -> bool;
    fn total_frames(&self) -> i64;
}

/// The fixed decoder set, dispatched without heap indirection.
pub enum Decoder {
    /// WAV / raw PCM
    Pcm(PcmDecoder),

    /// Vorbis, MP3, FLAC via symphonia
    Compressed(SymphoniaDecoder),

    /// Fully decoded at load time
    Preloaded(PreloadedDecoder),
}

impl Decoder {
    /// Run the open chain over the source bytes. The raw-PCM fallback means
    /// a load only fails on empty input.
    pub fn open(bytes: &Arc<SourceBytes>) -> Result<Self> {
        let data = bytes.as_ref().as_ref();
        if data.is_empty() {
            return Err(Error::InvalidParam("empty audio data".into()));
        }

        if PcmDecoder::sniff(data) {
            if let Some(pcm) = PcmDecoder::open_wav(Arc::clone(bytes)) {
                return Ok(Decoder::Pcm(pcm));
            }
        }

        if let Ok(compressed) = SymphoniaDecoder::open(Arc::clone(bytes)) {
            return Ok(Decoder::Compressed(compressed));
        }

        // Last resort: treat the buffer as raw 16-bit stereo 44.1 kHz
        Ok(Decoder::Pcm(PcmDecoder::open_raw(Arc::clone(bytes))))
    }

    /// Decode the entire remaining stream to interleaved f32, for
    /// decompress-on-load sources.
    pub fn decode_all(&mut self) -> Vec<f32> {
        let channels = self.format().channels.max(1) as usize;
        let total = self.total_frames();
        let mut samples = if total > 0 {
            Vec::with_capacity(total as usize * channels)
        } else {
            Vec::new()
        };

        const CHUNK_FRAMES: usize = 4096;
        let mut scratch = vec![0.0f32; CHUNK_FRAMES * channels];
        loop {
            let produced = self.decode(&mut scratch, CHUNK_FRAMES);
            if produced == 0 {
                break;
            }
            samples.extend_from_slice(&scratch[..produced * channels]);
        }
        samples
    }
}

impl AudioDecoder for Decoder {
    fn decode(&mut self, out: &mut [f32], frames: usize) -> usize {
        match self {
            Decoder::Pcm(d) => d.decode(out, frames),
            Decoder::Compressed(d) => d.decode(out, frames),
            Decoder::Preloaded(d) => d.decode(out, frames),
        }
    }

    fn seek(&mut self, frame: i64) -> bool {
        match self {
            Decoder::Pcm(d) => d.seek(frame),
            Decoder::Compressed(d) => d.seek(frame),
            Decoder::Preloaded(d) => d.seek(frame),
        }
    }

    fn format(&self) -> AudioFormat {
        match self {
            Decoder::Pcm(d) => d.format(),
            Decoder::Compressed(d) => d.format(),
            Decoder::Preloaded(d) => d.format(),
        }
    }

    fn supports_streaming(&self) -> bool {
        match self {
            Decoder::Pcm(d) => d.supports_streaming(),
            Decoder::Compressed(d) => d.supports_streaming(),
            Decoder::Preloaded(d) => d.supports_streaming(),
        }
    }

    fn total_frames(&self) -> i64 {
        match self {
            Decoder::Pcm(d) => d.total_frames(),
            Decoder::Compressed(d) => d.total_frames(),
            Decoder::Preloaded(d) => d.total_frames(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_rejects_empty() {
        let bytes = Arc::new(SourceBytes::new(Vec::new()));
        assert!(Decoder::open(&bytes).is_err());
    }

    #[test]
    fn test_open_garbage_falls_back_to_raw_pcm() {
        let bytes = Arc::new(SourceBytes::new(vec![0u8; 100]));
        let decoder = Decoder::open(&bytes).unwrap();

        let fmt = decoder.format();
        assert_eq!(fmt.sample_rate, 44100);
        assert_eq!(fmt.channels, 2);
        assert_eq!(fmt.bits_per_sample, 16);
        assert!(matches!(decoder, Decoder::Pcm(_)));
    }
}
