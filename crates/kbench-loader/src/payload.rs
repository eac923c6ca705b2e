//! Pseudorandom payload generation.
//!
//! Payloads are generated once per run and reused for every object; byte
//! content doesn't matter to the apiserver, only size does, and generating
//! per-object would pressure the worker host.

use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng, RngCore};

/// `n` pseudorandom bytes, for Secret data.
pub fn random_bytes(n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    thread_rng().fill_bytes(&mut buf);
    buf
}

/// `n` pseudorandom alphanumeric characters, for ConfigMap data.
pub fn random_alphanumeric(n: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(n)
        .map(char::from)
        .collect()
}

/// Short random suffix so parallel workers never write the same artifact
/// name.
pub fn random_suffix() -> String {
    random_alphanumeric(7).to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes_are_exact() {
        assert_eq!(random_bytes(100).len(), 100);
        assert_eq!(random_alphanumeric(64).len(), 64);
        assert!(random_bytes(0).is_empty());
    }

    #[test]
    fn suffix_is_lowercase_alphanumeric() {
        let s = random_suffix();
        assert_eq!(s.len(), 7);
        assert!(s.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
    }
}
