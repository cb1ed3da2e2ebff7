//! Rolling hash implementation for delta transfer
//!
//! Polynomial checksum over a fixed window, updated in O(1) per byte when
//! the window slides. Indexer and matcher must agree on every constant or
//! no block will ever match.

/// Polynomial base
pub const BASE: u64 = 257;

/// Prime modulus; every digest is below it and fits in a `u32`
pub const MODULUS: u64 = 1_000_000_007;

/// Polynomial rolling checksum
///
/// `h = sum(byte[i] * BASE^(n-1-i)) mod MODULUS`, bytes taken as unsigned.
/// `BASE^(window-1)` is precomputed once so that [`roll_byte`] only needs
/// the outgoing and incoming bytes.
///
/// [`roll_byte`]: PolyRollingHash::roll_byte
#[derive(Debug, Clone)]
pub struct PolyRollingHash {
    hash: u64,
    window: usize,
    /// BASE^(window-1) mod MODULUS
    leading_power: u64,
}

impl PolyRollingHash {
    /// Create a hasher for windows of `window` bytes
    pub fn with_window(window: usize) -> Self {
        let mut leading_power = 1u64;
        for _ in 1..window {
            leading_power = (leading_power * BASE) % MODULUS;
        }

        Self {
            hash: 0,
            window,
            leading_power,
        }
    }

    /// Window length this hasher rolls over
    pub fn window(&self) -> usize {
        self.window
    }

    /// Recompute the hash from a full window of data
    pub fn update_block(&mut self, data: &[u8]) {
        self.hash = Self::checksum(data) as u64;
    }

    /// Slide the window by one byte: drop `old_byte` from the front and
    /// append `new_byte` at the back
    pub fn roll_byte(&mut self, old_byte: u8, new_byte: u8) {
        let outgoing = (old_byte as u64 * self.leading_power) % MODULUS;
        let without = (self.hash + MODULUS - outgoing) % MODULUS;
        self.hash = (without * BASE + new_byte as u64) % MODULUS;
    }

    pub fn digest(&self) -> u32 {
        self.hash as u32
    }

    pub fn reset(&mut self) {
        self.hash = 0;
    }

    /// Compute the checksum of `data` without any rolling state
    pub fn checksum(data: &[u8]) -> u32 {
        let mut hash = 0u64;
        for &byte in data {
            hash = (hash * BASE + byte as u64) % MODULUS;
        }
        hash as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checksum_known_values() {
        assert_eq!(PolyRollingHash::checksum(b""), 0);
        assert_eq!(PolyRollingHash::checksum(b"A"), 65);
        // 'A' * 257 + 'B'
        assert_eq!(PolyRollingHash::checksum(b"AB"), 65 * 257 + 66);
    }

    #[test]
    fn test_bytes_are_unsigned() {
        // 0xFF must count as 255, never as -1
        assert_eq!(PolyRollingHash::checksum(&[0xFF]), 255);
        assert_eq!(PolyRollingHash::checksum(&[0xFF, 0x80]), 255 * 257 + 128);
    }

    #[test]
    fn test_digest_below_modulus() {
        let data = vec![0xFFu8; 4096];
        assert!((PolyRollingHash::checksum(&data) as u64) < MODULUS);
    }

    #[test]
    fn test_update_block_matches_checksum() {
        let data = b"Hello, World!";
        let mut rolling = PolyRollingHash::with_window(data.len());
        rolling.update_block(data);

        assert_eq!(rolling.digest(), PolyRollingHash::checksum(data));
    }

    #[test]
    fn test_rolling_matches_full_recompute() {
        let data = b"The quick brown fox jumps over the lazy dog";

        for window in [1, 4, 8, 16] {
            let mut rolling = PolyRollingHash::with_window(window);

            for i in 0..=data.len() - window {
                if i == 0 {
                    rolling.update_block(&data[0..window]);
                } else {
                    rolling.roll_byte(data[i - 1], data[i + window - 1]);
                }

                assert_eq!(
                    rolling.digest(),
                    PolyRollingHash::checksum(&data[i..i + window]),
                    "Window {}, position {}",
                    window,
                    i
                );
            }
        }
    }

    #[test]
    fn test_rolling_high_bytes() {
        let data: Vec<u8> = (0..=255u8).rev().cycle().take(600).collect();
        let window = 32;

        let mut rolling = PolyRollingHash::with_window(window);
        rolling.update_block(&data[..window]);

        for i in 1..=data.len() - window {
            rolling.roll_byte(data[i - 1], data[i + window - 1]);
            assert_eq!(
                rolling.digest(),
                PolyRollingHash::checksum(&data[i..i + window])
            );
        }
    }

    #[test]
    fn test_reset() {
        let mut rolling = PolyRollingHash::with_window(4);
        rolling.update_block(b"test");
        assert_ne!(rolling.digest(), 0);

        rolling.reset();
        assert_eq!(rolling.digest(), 0);
        assert_eq!(rolling.window(), 4);
    }
}
