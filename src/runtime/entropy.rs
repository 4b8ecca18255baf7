//! Random sources injected into generation.
//!
//! Builders never touch an RNG directly; they go through [`Entropy`], so a
//! test can substitute a seeded source or replay a recorded draw log.

use rand_chacha::ChaCha20Rng;
use rand_core::{RngCore as _, SeedableRng as _};

use crate::{Draw, DrawCursor, DrawLog};

pub trait Entropy {
    /// `true` with probability `p`.
    fn bernoulli(&mut self, p: f64) -> bool;

    /// Uniform index in `0..len`. `len` must be non-zero.
    fn index(&mut self, len: usize) -> usize;

    /// Index into `weights`, proportional to weight.
    fn weighted(&mut self, weights: &[u32]) -> usize;

    /// Uniform value in `min..=max`.
    fn range(&mut self, min: i64, max: i64) -> i64;

    /// A short random string; may contain quotes, markup and non-ASCII text.
    fn text(&mut self) -> String;
}

const INTERESTING_STRINGS: &[&str] = &[
    "",
    " ",
    "a",
    "foo",
    "<b>",
    "</div>",
    "<!--",
    "-->",
    "&amp;",
    "\"quoted\"",
    "'single'",
    "\\",
    "${x}",
    "\n",
    "\u{0}",
    "\u{2028}",
    "é",
    "\u{1F600}",
    "<script>",
];

const ALNUM: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// ChaCha20-backed source seeded from a `u64`; records every draw.
#[derive(Debug)]
pub struct SeededEntropy {
    seed: u64,
    rng: ChaCha20Rng,
    log: DrawLog,
}

impl SeededEntropy {
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: rng_from_seed(seed),
            log: DrawLog {
                seed: Some(seed),
                template: None,
                draws: Vec::new(),
            },
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn log(&self) -> &DrawLog {
        &self.log
    }

    pub fn into_log(self) -> DrawLog {
        self.log
    }

    fn unit(&mut self) -> f64 {
        (self.rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }
}

impl Entropy for SeededEntropy {
    fn bernoulli(&mut self, p: f64) -> bool {
        let hit = self.unit() < p;
        self.log.push(Draw::Bernoulli { p, hit });
        hit
    }

    fn index(&mut self, len: usize) -> usize {
        let value = if len == 0 { 0 } else { (self.rng.next_u64() % len as u64) as usize };
        self.log.push(Draw::Index { len, value });
        value
    }

    fn weighted(&mut self, weights: &[u32]) -> usize {
        let total: u64 = weights.iter().map(|w| u64::from(*w)).sum();
        let value = if total == 0 {
            0
        } else {
            let mut point = self.rng.next_u64() % total;
            let mut picked = weights.len().saturating_sub(1);
            for (idx, w) in weights.iter().enumerate() {
                if point < u64::from(*w) {
                    picked = idx;
                    break;
                }
                point -= u64::from(*w);
            }
            picked
        };
        self.log.push(Draw::Weighted { total, value });
        value
    }

    fn range(&mut self, min: i64, max: i64) -> i64 {
        let value = if max <= min {
            min
        } else {
            let span = (max as i128 - min as i128 + 1) as u128;
            (min as i128 + (u128::from(self.rng.next_u64()) % span) as i128) as i64
        };
        self.log.push(Draw::Range { min, max, value });
        value
    }

    fn text(&mut self) -> String {
        let value = if self.rng.next_u64() % 2 == 0 {
            let idx = (self.rng.next_u64() % INTERESTING_STRINGS.len() as u64) as usize;
            INTERESTING_STRINGS[idx].to_string()
        } else {
            let len = 1 + (self.rng.next_u64() % 10) as usize;
            (0..len)
                .map(|_| ALNUM[(self.rng.next_u64() % ALNUM.len() as u64) as usize] as char)
                .collect()
        };
        self.log.push(Draw::Text { value: value.clone() });
        value
    }
}

/// Replays a recorded draw log. Draws that do not match the request (kind or
/// bounds) count as divergences and fall back to the lowest legal value.
#[derive(Debug)]
pub struct ReplayEntropy<'a> {
    cursor: DrawCursor<'a>,
    divergences: usize,
}

impl<'a> ReplayEntropy<'a> {
    pub fn new(log: &'a DrawLog) -> Self {
        Self {
            cursor: DrawCursor::new(&log.draws),
            divergences: 0,
        }
    }

    pub fn divergences(&self) -> usize {
        self.divergences
    }

    pub fn remaining(&self) -> usize {
        self.cursor.remaining()
    }

    fn diverged<T>(&mut self, fallback: T) -> T {
        self.divergences = self.divergences.saturating_add(1);
        fallback
    }
}

impl Entropy for ReplayEntropy<'_> {
    fn bernoulli(&mut self, _p: f64) -> bool {
        match self.cursor.next() {
            Some(Draw::Bernoulli { hit, .. }) => *hit,
            _ => self.diverged(false),
        }
    }

    fn index(&mut self, len: usize) -> usize {
        match self.cursor.next() {
            Some(Draw::Index { value, .. }) if *value < len.max(1) => *value,
            _ => self.diverged(0),
        }
    }

    fn weighted(&mut self, weights: &[u32]) -> usize {
        match self.cursor.next() {
            Some(Draw::Weighted { value, .. }) if *value < weights.len().max(1) => *value,
            _ => self.diverged(0),
        }
    }

    fn range(&mut self, min: i64, max: i64) -> i64 {
        match self.cursor.next() {
            Some(Draw::Range { value, .. }) if (min..=max.max(min)).contains(value) => *value,
            _ => self.diverged(min),
        }
    }

    fn text(&mut self) -> String {
        match self.cursor.next() {
            Some(Draw::Text { value }) => value.clone(),
            _ => self.diverged(String::new()),
        }
    }
}

/// Alternatives paired with weights; picked proportionally to weight.
#[derive(Debug, Clone)]
pub struct WeightedList<T> {
    entries: Vec<(T, u32)>,
}

impl<T> WeightedList<T> {
    pub fn new(entries: Vec<(T, u32)>) -> Self {
        Self { entries }
    }

    pub fn pick(&self, entropy: &mut dyn Entropy) -> Option<&T> {
        if self.entries.is_empty() {
            return None;
        }
        let weights: Vec<u32> = self.entries.iter().map(|(_, w)| *w).collect();
        let idx = entropy.weighted(&weights);
        self.entries.get(idx).map(|(item, _)| item)
    }
}

pub fn gen_seed() -> u64 {
    let mut seed = [0u8; 8];
    rand_core::OsRng.fill_bytes(&mut seed);
    u64::from_le_bytes(seed)
}

fn rng_from_seed(seed: u64) -> ChaCha20Rng {
    let seed_bytes = blake3::hash(&seed.to_le_bytes()).as_bytes().to_owned();
    let mut seed32 = [0u8; 32];
    seed32.copy_from_slice(&seed_bytes[..32]);
    ChaCha20Rng::from_seed(seed32)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(e: &mut dyn Entropy) -> (bool, usize, usize, i64, String) {
        (e.bernoulli(0.5), e.index(7), e.weighted(&[1, 0, 3]), e.range(-4, 4), e.text())
    }

    #[test]
    fn same_seed_same_draws() {
        let mut a = SeededEntropy::new(42);
        let mut b = SeededEntropy::new(42);
        for _ in 0..50 {
            assert_eq!(sample(&mut a), sample(&mut b));
        }
        assert_eq!(a.log().draws, b.log().draws);
    }

    #[test]
    fn replay_reproduces_recorded_draws() {
        let mut seeded = SeededEntropy::new(9);
        let expected: Vec<_> = (0..20).map(|_| sample(&mut seeded)).collect();
        let log = seeded.into_log();

        let mut replay = ReplayEntropy::new(&log);
        let got: Vec<_> = (0..20).map(|_| sample(&mut replay)).collect();
        assert_eq!(expected, got);
        assert_eq!(replay.divergences(), 0);
        assert_eq!(replay.remaining(), 0);
    }

    #[test]
    fn replay_past_the_end_diverges_to_lowest_values() {
        let log = DrawLog::default();
        let mut replay = ReplayEntropy::new(&log);
        assert!(!replay.bernoulli(1.0));
        assert_eq!(replay.range(3, 9), 3);
        assert_eq!(replay.divergences(), 2);
    }

    #[test]
    fn degenerate_probabilities_and_weights() {
        let mut e = SeededEntropy::new(1);
        for _ in 0..200 {
            assert!(e.bernoulli(1.0));
            assert!(!e.bernoulli(0.0));
            assert_ne!(e.weighted(&[1, 0, 3]), 1);
            let v = e.range(200, 599);
            assert!((200..=599).contains(&v));
        }
        assert_eq!(e.range(5, 5), 5);
    }

    #[test]
    fn weighted_list_respects_zero_weights() {
        let list = WeightedList::new(vec![("never", 0), ("always", 5)]);
        let mut e = SeededEntropy::new(3);
        for _ in 0..100 {
            assert_eq!(list.pick(&mut e), Some(&"always"));
        }
        assert!(WeightedList::<u8>::new(Vec::new()).pick(&mut e).is_none());
    }
}
