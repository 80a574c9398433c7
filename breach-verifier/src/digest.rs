use std::fmt;

use sha2::{Digest as _, Sha256};

/// The length of a credential digest in bytes (SHA-256).
pub const DIGEST_LEN: usize = 32;

/// Hex lookup table for digest display.
pub const HEX_CHARS: &[u8; 16] = b"0123456789abcdef";

/// A SHA-256 digest of a credential. The only representation of a credential
/// that is ever written to disk.
///
/// This is a membership key, not a password-storage hash: there is no salt, so
/// the same credential always produces the same digest.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Hashes raw credential bytes.
    #[inline]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hasher.finalize().into())
    }

    /// Hashes the UTF-8 encoding of a password.
    #[inline]
    pub fn of_str(password: &str) -> Self {
        Self::of_bytes(password.as_bytes())
    }

    #[inline]
    pub const fn from_bytes(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    #[inline]
    pub const fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Returns the fanout bucket of this digest: its first two bytes as a
    /// big-endian integer.
    #[inline(always)]
    pub const fn bucket(&self) -> usize {
        ((self.0[0] as usize) << 8) | self.0[1] as usize
    }
}

impl From<[u8; DIGEST_LEN]> for Digest {
    fn from(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut hex = [0u8; DIGEST_LEN * 2];
        for (i, b) in self.0.iter().enumerate() {
            hex[i * 2] = HEX_CHARS[(b >> 4) as usize];
            hex[i * 2 + 1] = HEX_CHARS[(b & 0x0f) as usize];
        }
        // SAFETY: every byte comes from HEX_CHARS, which is ASCII
        f.write_str(unsafe { std::str::from_utf8_unchecked(&hex) })
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({self})")
    }
}

/// Computes the digest of a password.
#[inline]
pub fn digest(password: &str) -> Digest {
    Digest::of_str(password)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use hex_literal::hex;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    #[test]
    fn test_sha256_known_values() {
        // sha256("password") = 5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8
        assert_eq!(
            digest("password").as_bytes(),
            &hex!("5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8")
        );
        // sha256("") = e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855
        assert_eq!(
            digest("").as_bytes(),
            &hex!("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855")
        );
    }

    #[test]
    fn test_display_is_lowercase_hex() {
        assert_eq!(
            digest("password").to_string(),
            "5e884898da28047151d0e56f8dc6292773603d0d6aabbdd62a11ef721d1542d8"
        );
    }

    #[test]
    fn test_str_and_bytes_agree() {
        assert_eq!(Digest::of_str("hunter2"), Digest::of_bytes(b"hunter2"));
    }

    #[test]
    fn test_bucket_uses_first_two_bytes() {
        let mut bytes = [0u8; DIGEST_LEN];
        bytes[0] = 0xAB;
        bytes[1] = 0xCD;
        bytes[2] = 0xFF;
        assert_eq!(Digest::from_bytes(bytes).bucket(), 0xABCD);
    }

    #[test]
    fn test_no_collisions_in_random_sample() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut passwords = HashSet::new();
        let mut digests = HashSet::new();

        while passwords.len() < 50_000 {
            let len = rng.gen_range(0..=24);
            let password: String =
                (0..len).map(|_| rng.gen_range(b'!'..=b'~') as char).collect();
            if passwords.insert(password.clone()) {
                assert!(digests.insert(digest(&password)), "collision for {password:?}");
            }
        }
    }
}
