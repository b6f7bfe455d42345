// SPDX-License-Identifier: GPL-3.0-only

//! Pixel conversion utilities shared by the stream decoders
//!
//! All functions here are stateless and per-call: the depth remap in
//! particular carries no hysteresis, no temporal filtering and no cache, so
//! repeated calls with different bounds are fully independent.

use std::borrow::Cow;

/// Reinterpret little-endian frame bytes as 16-bit pixels
///
/// Borrows when the driver buffer happens to be 2-byte aligned, copies
/// otherwise.
pub fn bytes_as_u16(data: &[u8]) -> Cow<'_, [u16]> {
    match bytemuck::try_cast_slice(data) {
        Ok(shorts) => Cow::Borrowed(shorts),
        Err(_) => Cow::Owned(bytemuck::pod_collect_to_vec(data)),
    }
}

/// Linearly map raw 16-bit depth into an 8-bit intensity ramp
///
/// Distances inside `[near, far]` map onto `[0, 255]`; values outside clamp
/// to the respective endpoint. With `invert` set, near and far are swapped
/// before mapping, reversing the ramp's direction.
pub fn remap_depth_to_range(src: &[u16], near: u16, far: u16, invert: bool) -> Vec<u8> {
    let (lo, hi) = if invert { (far, near) } else { (near, far) };
    let inv_range = 255.0 / (hi as f32 - lo as f32);

    src.iter()
        .map(|&raw| {
            let v = (raw as f32 - lo as f32) * inv_range;
            v.clamp(0.0, 255.0) as u8
        })
        .collect()
}

/// Remap raw depth into the destination plane without reallocating
pub fn remap_depth_into(src: &[u16], dst: &mut [u8], near: u16, far: u16, invert: bool) {
    let (lo, hi) = if invert { (far, near) } else { (near, far) };
    let inv_range = 255.0 / (hi as f32 - lo as f32);

    for (out, &raw) in dst.iter_mut().zip(src) {
        let v = (raw as f32 - lo as f32) * inv_range;
        *out = v.clamp(0.0, 255.0) as u8;
    }
}

/// Reduce 16-bit IR luminance to 8-bit by dropping the two low bits
///
/// Simple range reduction, not calibrated tone mapping.
pub fn ir16_to_gray8_into(src: &[u16], dst: &mut [u8]) {
    for (out, &v) in dst.iter_mut().zip(src) {
        *out = (v >> 2) as u8;
    }
}

/// Expand an 8-bit gray plane to a packed RGB triplet plane
pub fn gray8_to_rgb(src: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(src.len() * 3);
    for &gray in src {
        rgb.extend_from_slice(&[gray, gray, gray]);
    }
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remap_endpoints() {
        assert_eq!(remap_depth_to_range(&[500], 500, 4000, false), vec![0]);
        assert_eq!(remap_depth_to_range(&[4000], 500, 4000, false), vec![255]);
        assert_eq!(remap_depth_to_range(&[500], 500, 4000, true), vec![255]);
        assert_eq!(remap_depth_to_range(&[4000], 500, 4000, true), vec![0]);
    }

    #[test]
    fn test_remap_clamps_outside_bounds() {
        let out = remap_depth_to_range(&[0, 100, 9000, u16::MAX], 500, 4000, false);
        assert_eq!(out, vec![0, 0, 255, 255]);

        let inverted = remap_depth_to_range(&[0, 9000], 500, 4000, true);
        assert_eq!(inverted, vec![255, 0]);
    }

    #[test]
    fn test_remap_is_monotonic_within_range() {
        let ramp: Vec<u16> = (500..=4000).step_by(100).collect();
        let out = remap_depth_to_range(&ramp, 500, 4000, false);
        for pair in out.windows(2) {
            assert!(pair[0] <= pair[1], "remap must be monotonic in raw depth");
        }

        let reversed = remap_depth_to_range(&ramp, 500, 4000, true);
        for pair in reversed.windows(2) {
            assert!(pair[0] >= pair[1], "inverted remap must reverse the ramp");
        }
    }

    #[test]
    fn test_remap_into_matches_allocating_variant() {
        let src = [250u16, 500, 2250, 4000, 6000];
        let mut dst = vec![0u8; src.len()];
        remap_depth_into(&src, &mut dst, 500, 4000, false);
        assert_eq!(dst, remap_depth_to_range(&src, 500, 4000, false));
    }

    #[test]
    fn test_ir16_reduction_drops_two_bits() {
        let src = [0u16, 4, 1020, 1023];
        let mut dst = vec![0u8; src.len()];
        ir16_to_gray8_into(&src, &mut dst);
        assert_eq!(dst, vec![0, 1, 255, 255]);
    }

    #[test]
    fn test_bytes_as_u16_little_endian() {
        let bytes = [0x01u8, 0x02, 0xFF, 0x00];
        let shorts = bytes_as_u16(&bytes);
        assert_eq!(&*shorts, &[0x0201, 0x00FF]);
    }

    #[test]
    fn test_gray8_expansion() {
        assert_eq!(gray8_to_rgb(&[5, 9]), vec![5, 5, 5, 9, 9, 9]);
    }
}
