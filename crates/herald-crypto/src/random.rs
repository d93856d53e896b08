//! Random secret generation.

use rand::RngCore;
use rand::rngs::OsRng;

/// Return `n_bytes` of OS randomness encoded as lowercase hex (`2 * n_bytes` chars).
pub fn random_hex(n_bytes: usize) -> String {
    let mut buf = vec![0u8; n_bytes];
    OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn length_is_twice_the_byte_count() {
        assert_eq!(random_hex(64).len(), 128);
        assert_eq!(random_hex(0), "");
    }

    #[test]
    fn values_differ() {
        assert_ne!(random_hex(16), random_hex(16));
    }
}
