// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Human-readable session identifiers: `word-word` slugs from a fixed
//! adjective × noun pool, numeric suffixes on collision, and a base36
//! timestamp fallback when the pool runs hot.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

const ADJECTIVES: &[&str] = &[
    "amber", "bold", "brisk", "calm", "clever", "coral", "crisp", "deft",
    "dusky", "eager", "fleet", "fond", "glad", "green", "hardy", "hazel",
    "ivory", "jolly", "keen", "late", "lucid", "lunar", "mellow", "misty",
    "neat", "noble", "olive", "pale", "quick", "quiet", "rapid", "rosy",
    "rustic", "sage", "sharp", "silent", "sleek", "solar", "spry", "stark",
    "sunny", "swift", "tidy", "trim", "vivid", "warm", "wise", "young",
];

const NOUNS: &[&str] = &[
    "anchor", "aspen", "badger", "basil", "beacon", "birch", "brook", "cedar",
    "cliff", "cloud", "comet", "coral", "crane", "creek", "delta", "ember",
    "falcon", "fern", "finch", "fjord", "gale", "glade", "grove", "harbor",
    "hawk", "heron", "inlet", "iris", "lark", "lotus", "maple", "marsh",
    "meadow", "otter", "pebble", "pine", "prairie", "quartz", "raven", "reef",
    "ridge", "river", "sparrow", "spruce", "summit", "thicket", "trail", "wren",
];

/// How many random slug draws to try before falling back to a timestamp id.
const MAX_SLUG_ATTEMPTS: usize = 20;

/// Numeric suffixes tried when the bare slug is taken.
const SUFFIX_RANGE: std::ops::RangeInclusive<u32> = 2..=9;

/// Process-wide pool of live session ids. All mutation goes through the
/// registry, which serializes access.
#[derive(Debug, Default)]
pub struct IdPool {
    in_use: HashSet<String>,
}

impl IdPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generate a fresh id and mark it in use.
    pub fn generate(&mut self) -> String {
        let mut rng = rand::thread_rng();

        for _ in 0..MAX_SLUG_ATTEMPTS {
            let adj = ADJECTIVES[rng.gen_range(0..ADJECTIVES.len())];
            let noun = NOUNS[rng.gen_range(0..NOUNS.len())];
            let base = format!("{adj}-{noun}");

            if self.in_use.insert(base.clone()) {
                return base;
            }
            for n in SUFFIX_RANGE {
                let suffixed = format!("{base}-{n}");
                if self.in_use.insert(suffixed.clone()) {
                    return suffixed;
                }
            }
        }

        let fallback = fallback_id();
        self.in_use.insert(fallback.clone());
        fallback
    }

    /// Claim a specific id (reattach paths). Returns false if already live.
    pub fn claim(&mut self, id: &str) -> bool {
        self.in_use.insert(id.to_owned())
    }

    /// Return an id to the pool. Safe to call for unknown ids.
    pub fn release(&mut self, id: &str) {
        self.in_use.remove(id);
    }

    pub fn is_in_use(&self, id: &str) -> bool {
        self.in_use.contains(id)
    }

    pub fn live_count(&self) -> usize {
        self.in_use.len()
    }
}

/// `shell-<base36 millis>` fallback id.
fn fallback_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    format!("shell-{}", to_base36(millis))
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if n == 0 {
        return "0".to_owned();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
#[path = "ids_tests.rs"]
mod tests;
