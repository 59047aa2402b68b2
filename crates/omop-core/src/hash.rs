//! Deterministic surrogate-key hashing.
//!
//! Keys are derived from source identifiers so that re-running a conversion
//! over the same documents yields the same keys, and so that SQL-side
//! pipelines can reproduce them with
//! `conv(substr(md5(upper(x)), 1, 13), 16, 10)`.

use md5::{Digest, Md5};

/// Number of leading hex digits kept from the digest. 13 hex digits span
/// 52 bits, so the parsed value always fits in an `i64`.
const KEY_HEX_DIGITS: usize = 13;

/// Hashes a non-empty string to a stable 52-bit surrogate key.
///
/// The input is uppercased first, so keys are case-insensitive with respect
/// to the source identifier. Empty input yields `None`, never a key.
pub fn hash_text(input: &str) -> Option<i64> {
    if input.is_empty() {
        return None;
    }
    let digest = Md5::digest(input.to_uppercase().as_bytes());
    let hex = hex::encode(digest);
    i64::from_str_radix(&hex[..KEY_HEX_DIGITS], 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_yields_no_key() {
        assert_eq!(hash_text(""), None);
    }

    #[test]
    fn matches_sql_reference_value() {
        // md5("PERSON|12345") = 4b85dc80f9536... ; first 13 hex digits in decimal.
        assert_eq!(hash_text("PERSON|12345"), Some(1_328_612_834_776_374));
    }

    #[test]
    fn case_variants_hash_identically() {
        assert_eq!(hash_text("abc"), hash_text("ABC"));
        assert_eq!(hash_text("abc"), Some(2_536_555_561_033_200));
    }

    #[test]
    fn key_fits_in_53_bits() {
        let key = hash_text("123|2020-01-02|mg").unwrap();
        assert_eq!(key, 42_755_042_096_631);
        assert!(key >= 0 && key < (1_i64 << 52));
    }
}
