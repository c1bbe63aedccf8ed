//! Vectorized audio hot-path kernels
//!
//! The mixer's inner loops: clear, gain, mix-accumulate, peak detection,
//! constant-power panning, and PCM conversions. The vector path runs on
//! 8-lane `f32x8` blocks with a scalar tail; lane data is moved through
//! array copies, so buffers handed in by external callbacks need no special
//! alignment.

use wide::f32x8;

const LANES: usize = 8;

/// Write zeros over the whole buffer.
#[inline]
pub fn clear(buf: &mut [f32]) {
    buf.fill(0.0);
}

/// In-place gain: `buf[i] *= gain`.
pub fn apply_gain(buf: &mut [f32], gain: f32) {
    let g = f32x8::splat(gain);
    let mut chunks = buf.chunks_exact_mut(LANES);
    for chunk in &mut chunks {
        let mut lane = [0.0f32; LANES];
        lane.copy_from_slice(chunk);
        let v = f32x8::from(lane) * g;
        chunk.copy_from_slice(&v.to_array());
    }
    for v in chunks.into_remainder() {
        *v *= gain;
    }
}

/// Mix-accumulate: `dst[i] += src[i] * gain`.
///
/// Processes `min(dst.len(), src.len())` samples.
pub fn mix_add(dst: &mut [f32], src: &[f32], gain: f32) {
    let n = dst.len().min(src.len());
    let g = f32x8::splat(gain);

    let mut d_chunks = dst[..n].chunks_exact_mut(LANES);
    let mut s_chunks = src[..n].chunks_exact(LANES);
    for (d, s) in (&mut d_chunks).zip(&mut s_chunks) {
        let mut d_lane = [0.0f32; LANES];
        let mut s_lane = [0.0f32; LANES];
        d_lane.copy_from_slice(d);
        s_lane.copy_from_slice(s);
        let v = f32x8::from(d_lane) + f32x8::from(s_lane) * g;
        d.copy_from_slice(&v.to_array());
    }
    for (d, s) in d_chunks
        .into_remainder()
        .iter_mut()
        .zip(s_chunks.remainder())
    {
        *d += *s * gain;
    }
}

/// Peak detector: `max |buf[i]|` over the buffer (0.0 for an empty buffer).
pub fn peak_level(buf: &[f32]) -> f32 {
    let mut vpeak = f32x8::splat(0.0);
    let mut chunks = buf.chunks_exact(LANES);
    for chunk in &mut chunks {
        let mut lane = [0.0f32; LANES];
        lane.copy_from_slice(chunk);
        vpeak = vpeak.max(f32x8::from(lane).abs());
    }

    let mut peak = vpeak
        .to_array()
        .iter()
        .fold(0.0f32, |acc, &v| acc.max(v));
    for &v in chunks.remainder() {
        peak = peak.max(v.abs());
    }
    peak
}

/// Constant-power stereo pan over interleaved L/R frames.
///
/// `pan` ranges from -1.0 (full left) to +1.0 (full right). The sqrt curve
/// keeps `L_gain^2 + R_gain^2 == 1` across the whole range, so perceived
/// loudness stays flat through center.
pub fn apply_stereo_pan(buf: &mut [f32], pan: f32) {
    let left_gain = ((1.0 - pan) * 0.5).sqrt();
    let right_gain = ((1.0 + pan) * 0.5).sqrt();

    // Interleaved gain pattern: 4 frames per vector block
    let gains = f32x8::from([
        left_gain, right_gain, left_gain, right_gain, left_gain, right_gain, left_gain, right_gain,
    ]);

    let mut chunks = buf.chunks_exact_mut(LANES);
    for chunk in &mut chunks {
        let mut lane = [0.0f32; LANES];
        lane.copy_from_slice(chunk);
        let v = f32x8::from(lane) * gains;
        chunk.copy_from_slice(&v.to_array());
    }
    for frame in chunks.into_remainder().chunks_exact_mut(2) {
        frame[0] *= left_gain;
        frame[1] *= right_gain;
    }
}

/// Convert interleaved 16-bit signed PCM to float (scale by 1/32768).
pub fn int16_to_float(dst: &mut [f32], src: &[i16]) {
    const SCALE: f32 = 1.0 / 32768.0;
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = s as f32 * SCALE;
    }
}

/// Convert float samples to 16-bit signed PCM (clamp to [-1, 1], scale by
/// 32767, truncate).
pub fn float_to_int16(dst: &mut [i16], src: &[f32]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        let clamped = s.clamp(-1.0, 1.0);
        *d = (clamped * 32767.0) as i16;
    }
}
