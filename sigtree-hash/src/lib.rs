use sha3::{Digest, Keccak256};

pub const DIGEST_LEN: usize = 32; // Keccak-256 output

#[inline]
pub fn keccak256(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Hash the concatenation of `parts` in order.
#[inline]
pub fn h_concat(parts: &[&[u8]]) -> [u8; DIGEST_LEN] {
    let mut hasher = Keccak256::new();
    for p in parts {
        hasher.update(p);
    }
    hasher.finalize().into()
}

/// Sorted-pair node hash: the byte-wise smaller child is fed first, so the
/// digest is independent of which side of the tree each child sits on.
#[inline]
pub fn h_sorted_pair(a: &[u8], b: &[u8]) -> [u8; DIGEST_LEN] {
    let mut hasher = Keccak256::new();
    if a <= b {
        hasher.update(a);
        hasher.update(b);
    } else {
        hasher.update(b);
        hasher.update(a);
    }
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak256_empty_vector() {
        // Known Keccak-256 (not SHA3-256) digest of the empty string
        let d = keccak256(b"");
        assert_eq!(
            d.to_vec(),
            hex_to_bytes("c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470")
        );
    }

    #[test]
    fn h_concat_matches_manual_concat() {
        let joined = keccak256(b"abcdef");
        assert_eq!(h_concat(&[b"abc", b"def"]), joined);
        assert_eq!(h_concat(&[b"abcdef"]), joined);
    }

    #[test]
    fn sorted_pair_is_commutative() {
        let x = h_sorted_pair(b"left", b"right");
        let y = h_sorted_pair(b"right", b"left");
        assert_eq!(x, y);
        assert_ne!(x, h_sorted_pair(b"left", b"other"));
    }

    fn hex_to_bytes(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }
}
