//! Fr32 padding.
//!
//! Every 127 bytes of payload (1016 bits) are spread over four 32-byte words
//! of 254 bits each. The two most significant bits of every word stay zero,
//! so each word is a valid element of the BLS12-381 scalar field.

/// Bytes of payload per quad.
pub const IN_QUAD: usize = 127;

/// Bytes of padded output per quad.
pub const OUT_QUAD: usize = 128;

/// Pads a single quad.
pub fn pad_quad(input: &[u8; IN_QUAD], out: &mut [u8; OUT_QUAD]) {
    for word in 0..4 {
        // each word starts 254 bits after the previous one
        let start = word * 254 / 8;
        let shift = (word * 254 % 8) as u32;
        let out = &mut out[word * 32..(word + 1) * 32];

        for (j, b) in out.iter_mut().enumerate() {
            let lo = input[start + j];
            *b = if shift == 0 {
                lo
            } else {
                let hi = input.get(start + j + 1).copied().unwrap_or(0);
                (lo >> shift) | (hi << (8 - shift))
            };
        }

        out[31] &= 0x3f;
    }
}
