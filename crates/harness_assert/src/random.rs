//! Random data for tests: byte buffers and strings.

use rand::Rng;

/// Create `len` random bytes.
pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..len).map(|_| rng.random::<u8>()).collect()
}

/// Create `len` random bytes, none of which equals `avoid`.
pub fn random_bytes_avoiding(len: usize, avoid: u8) -> Vec<u8> {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| loop {
            let b = rng.random::<u8>();
            if b != avoid {
                break b;
            }
        })
        .collect()
}

/// Create a string of `len` random Unicode scalar values from the Basic Multilingual Plane.
///
/// Surrogates and the noncharacters U+FFFE/U+FFFF are never produced.
pub fn random_unicode_string(len: usize) -> String {
    let mut rng = rand::rng();
    let mut out = String::with_capacity(len);
    let mut produced = 0;
    while produced < len {
        let code = rng.random_range(0u32..0xFFFE);
        if let Some(c) = char::from_u32(code) {
            out.push(c);
            produced += 1;
        }
    }
    out
}

/// Create a string of `len` random ASCII capital letters.
pub fn random_alpha_string(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len).map(|_| rng.random_range(b'A'..=b'Z') as char).collect()
}

/// Compare two byte buffers for equality.
pub fn bytes_equal(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x == y)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_random_bytes_length() {
        assert_eq!(random_bytes(1000).len(), 1000);
        assert!(random_bytes(0).is_empty());
    }

    #[test]
    fn test_random_bytes_avoiding() {
        // Not exhaustive: a thousand draws can miss the edge case, but a regression would show up quickly.
        let bytes = random_bytes_avoiding(1000, 65);
        assert_eq!(bytes.len(), 1000);
        assert!(bytes.iter().all(|&b| b != 65));
    }

    #[test]
    fn test_random_unicode_string() {
        let s = random_unicode_string(1000);
        assert_eq!(s.chars().count(), 1000);
        assert!(s.chars().all(|c| (c as u32) < 0xFFFE));
    }

    #[test]
    fn test_random_alpha_string() {
        let s = random_alpha_string(1000);
        assert_eq!(s.len(), 1000);
        assert!(s.chars().all(|c| c.is_ascii_uppercase()));
    }

    #[test]
    fn test_bytes_equal() {
        let bytes = random_bytes(64);
        let mut copy = bytes.clone();
        assert!(bytes_equal(&bytes, &copy));
        copy[10] = copy[10].wrapping_add(1);
        assert!(!bytes_equal(&bytes, &copy));
        assert!(!bytes_equal(&bytes, &bytes[..10]));
    }
}
