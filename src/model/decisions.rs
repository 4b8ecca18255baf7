//! Draw logging for deterministic replay of generated snippets.

use serde::{Deserialize, Serialize};

/// One random decision taken while generating a snippet.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Draw {
    Bernoulli { p: f64, hit: bool },
    Index { len: usize, value: usize },
    Weighted { total: u64, value: usize },
    Range { min: i64, max: i64, value: i64 },
    Text { value: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrawLog {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
    pub draws: Vec<Draw>,
}

impl DrawLog {
    pub fn push(&mut self, draw: Draw) {
        self.draws.push(draw);
    }

    pub fn read_json(path: &std::path::Path) -> crate::FuzzResult<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn write_json(&self, path: &std::path::Path) -> crate::FuzzResult<()> {
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }
}

#[derive(Debug)]
pub struct DrawCursor<'a> {
    draws: &'a [Draw],
    index: usize,
}

impl<'a> DrawCursor<'a> {
    pub fn new(draws: &'a [Draw]) -> Self {
        Self { draws, index: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.draws.len().saturating_sub(self.index)
    }
}

impl<'a> Iterator for DrawCursor<'a> {
    type Item = &'a Draw;

    fn next(&mut self) -> Option<Self::Item> {
        let d = self.draws.get(self.index);
        self.index = self.index.saturating_add(1);
        d
    }
}
