//! Random numbers and sampling helpers.
//!
//! Every sample of every pixel draws from its own [`Lcg`] seeded with a
//! counter hash of `(pixel index, sample index)`, so renders are
//! reproducible and no generator state is shared between samples.

use std::f32::consts::PI;

use mbrt_math::Vec3;
use rand::RngCore;

/// Tiny Encryption Algorithm used as a counter-based hash, `N` rounds.
pub fn tea<const N: u32>(val0: u32, val1: u32) -> u32 {
    let mut v0 = val0;
    let mut v1 = val1;
    let mut s0: u32 = 0;

    for _ in 0..N {
        s0 = s0.wrapping_add(0x9e37_79b9);
        v0 = v0.wrapping_add(
            (v1 << 4).wrapping_add(0xa341_316c) ^ v1.wrapping_add(s0) ^ (v1 >> 5).wrapping_add(0xc801_3ea4),
        );
        v1 = v1.wrapping_add(
            (v0 << 4).wrapping_add(0xad90_777d) ^ v0.wrapping_add(s0) ^ (v0 >> 5).wrapping_add(0x7e95_761e),
        );
    }

    v0
}

/// Seed for sample `sample` of the pixel at linear index `pixel_index`.
pub fn pixel_seed(pixel_index: u32, sample: u32) -> u32 {
    tea::<16>(pixel_index, sample)
}

/// Linear congruential generator producing 24-bit values.
#[derive(Debug, Clone)]
pub struct Lcg {
    state: u32,
}

impl Lcg {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    /// Generator for one sample of one pixel.
    pub fn for_sample(pixel_index: u32, sample: u32) -> Self {
        Self::new(pixel_seed(pixel_index, sample))
    }

    /// Next 24-bit value.
    pub fn next_u24(&mut self) -> u32 {
        self.state = self.state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        self.state & 0x00ff_ffff
    }
}

impl RngCore for Lcg {
    // The 24 random bits sit in the high end so `gen_f32` sees them unchanged
    fn next_u32(&mut self) -> u32 {
        self.next_u24() << 8
    }

    fn next_u64(&mut self) -> u64 {
        let hi = self.next_u32() as u64;
        let lo = self.next_u32() as u64;
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_u32().to_be_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

/// Uniform float in `[0, 1)` from the top 24 bits of the next `u32`.
pub fn gen_f32(rng: &mut dyn RngCore) -> f32 {
    (rng.next_u32() >> 8) as f32 / 16_777_216.0
}

/// Cosine-weighted direction on the hemisphere around unit normal `n`.
pub fn sample_hemisphere_cosine(n: Vec3, rng: &mut dyn RngCore) -> Vec3 {
    let phi = 2.0 * PI * gen_f32(rng);
    let sin_theta_sq = gen_f32(rng);
    let sin_theta = sin_theta_sq.sqrt();

    let axis = if n.x.abs() > 0.001 { Vec3::Y } else { Vec3::X };
    let t = axis.cross(n).normalize();
    let s = n.cross(t);

    (s * phi.cos() * sin_theta + t * phi.sin() * sin_theta + n * (1.0 - sin_theta_sq).sqrt()).normalize()
}

/// Display gamma (1 / 2.2) applied per channel.
pub fn gamma_correct(color: Vec3) -> Vec3 {
    color.max(Vec3::ZERO).powf(1.0 / 2.2)
}

/// Clamp to `[0, 1]`, scale to bytes, opaque alpha.
pub fn color_to_rgba(color: Vec3) -> [u8; 4] {
    let c = color.clamp(Vec3::ZERO, Vec3::ONE) * 255.0;
    [c.x as u8, c.y as u8, c.z as u8, 255]
}
