use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;
use uuid::Uuid;

/// Source of collision-resistant identifiers for correlation ids and
/// listener registrations.
///
/// Uniqueness within the process lifetime is the only contract; no
/// particular format is promised.
pub trait IdSource: Send + Sync {
    fn next_id(&self) -> String;
}

/// UUIDv4-backed source used everywhere outside of tests.
pub struct UuidIdSource;

impl IdSource for UuidIdSource {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Deterministic source for tests that assert on ids.
pub struct SequentialIdSource {
    prefix: &'static str,
    counter: AtomicU64,
}

impl SequentialIdSource {
    pub fn new(prefix: &'static str) -> Self {
        Self {
            prefix,
            counter: AtomicU64::new(0),
        }
    }
}

impl IdSource for SequentialIdSource {
    fn next_id(&self) -> String {
        format!("{}-{}", self.prefix, self.counter.fetch_add(1, Ordering::Relaxed))
    }
}

/// Generates the short human-readable codes players type to join a lobby.
pub struct LobbyCodeSource {
    length: usize,
}

impl LobbyCodeSource {
    // Skips I and O, which read like digits on a projected screen.
    const ALPHABET: &'static [u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ";

    pub fn new() -> Self {
        Self { length: 6 }
    }

    pub fn generate(&self) -> String {
        let mut rng = rand::rng();
        (0..self.length)
            .map(|_| Self::ALPHABET[rng.random_range(0..Self::ALPHABET.len())] as char)
            .collect()
    }
}

impl Default for LobbyCodeSource {
    fn default() -> Self {
        Self::new()
    }
}
