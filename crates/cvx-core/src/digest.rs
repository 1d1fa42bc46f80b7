//! Image digests.
//!
//! A digest is the SHA256 of the image header (`width` and `height` as
//! little-endian `u32`, then the channel count byte) followed by its
//! samples. Two images with the same bytes but different shapes hash
//! differently.

use sha2::{Digest, Sha256};

use crate::Image;

/// SHA256 of `img`, lowercase hex.
pub fn digest(img: &Image) -> String {
    let mut hasher = Sha256::new();
    hasher.update(img.width().to_le_bytes());
    hasher.update(img.height().to_le_bytes());
    hasher.update([img.channels()]);
    hasher.update(img.data());
    hex::encode(hasher.finalize())
}

mod hex {
    const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        let bytes = bytes.as_ref();
        let mut s = String::with_capacity(bytes.len() * 2);
        for &b in bytes {
            s.push(HEX_CHARS[(b >> 4) as usize] as char);
            s.push(HEX_CHARS[(b & 0xf) as usize] as char);
        }
        s
    }
}
