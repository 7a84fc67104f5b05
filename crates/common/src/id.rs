//! Time-prefixed identifier generation.
//!
//! Identifiers look like `ev-018f2c3a9b1c0000-7d41e0aa`: a prefix naming the
//! entity kind, twelve hex digits of Unix milliseconds, a four-digit
//! per-millisecond sequence, and eight random hex digits. Within one
//! generator the ids of a given prefix sort lexicographically in creation
//! order.

use chrono::Utc;
use parking_lot::Mutex;

pub const INVESTIGATION_PREFIX: &str = "inv";
pub const EVIDENCE_PREFIX: &str = "ev";
pub const PACKAGE_PREFIX: &str = "pkg";

const MAX_SEQ: u32 = 0xffff;

#[derive(Debug, Default)]
struct GeneratorState {
    last_ms: i64,
    seq: u32,
}

/// Generates globally unique, monotonically orderable identifiers.
#[derive(Debug, Default)]
pub struct IdGenerator {
    state: Mutex<GeneratorState>,
}

impl IdGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Produce the next identifier for `prefix`.
    pub fn next(&self, prefix: &str) -> String {
        let now = Utc::now().timestamp_millis().max(0);
        let (ms, seq) = {
            let mut state = self.state.lock();
            if now > state.last_ms {
                state.last_ms = now;
                state.seq = 0;
            } else if state.seq >= MAX_SEQ {
                // Sequence space exhausted: borrow from the next millisecond.
                state.last_ms += 1;
                state.seq = 0;
            } else {
                state.seq += 1;
            }
            (state.last_ms, state.seq)
        };

        let random = uuid::Uuid::new_v4().simple().to_string();
        format!("{}-{:012x}{:04x}-{}", prefix, ms, seq, &random[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_ids_are_unique_and_ordered() {
        let gen = IdGenerator::new();
        let ids: Vec<String> = (0..500).map(|_| gen.next(EVIDENCE_PREFIX)).collect();

        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());

        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(sorted, ids);
    }

    #[test]
    fn test_id_format() {
        let gen = IdGenerator::new();
        let id = gen.next(PACKAGE_PREFIX);
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "pkg");
        assert_eq!(parts[1].len(), 16);
        assert_eq!(parts[2].len(), 8);
    }
}
