//! Compact non-cryptographic string digest.
//!
//! The digest is a 31-multiplier polynomial over the UTF-16 code units of the
//! input, wrapped to a signed 32-bit accumulator at every step. It is a label,
//! not a security primitive: collisions are easy to produce.

/// Digest `input` into a lowercase hexadecimal label with no fixed width.
///
/// The accumulator wraps like a two's-complement `i32`, and the absolute value
/// is taken in 64 bits so `i32::MIN` maps to `80000000` instead of overflowing.
pub fn digest(input: &str) -> String {
    let acc = input
        .encode_utf16()
        .fold(0i32, |acc, unit| {
            acc.wrapping_mul(31).wrapping_add(i32::from(unit))
        });
    format!("{:x}", i64::from(acc).abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_vectors() {
        assert_eq!(digest(""), "0");
        assert_eq!(digest("abc"), "17862");
        assert_eq!(digest("a"), "61");
    }

    #[test]
    fn test_deterministic() {
        let input = r#"{"timezone":"Europe/Paris","os":"linux"}"#;
        assert_eq!(digest(input), digest(input));
    }

    #[test]
    fn test_wraparound_stays_in_range() {
        let long = "fingerprint".repeat(500);
        let value = u64::from_str_radix(&digest(&long), 16).unwrap();
        assert!(value <= 1 << 31);
    }

    #[test]
    fn test_code_units_not_bytes() {
        // U+1F510 is one char, two UTF-16 code units, four UTF-8 bytes.
        let high = 0xD83Di32;
        let low = 0xDD10i32;
        let expected = i64::from(high.wrapping_mul(31).wrapping_add(low)).abs();
        assert_eq!(digest("\u{1F510}"), format!("{:x}", expected));
    }
}
