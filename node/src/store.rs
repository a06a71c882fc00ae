//! The five-word replicated database.

use {log::info, omesh_consensus_om::WORD_COUNT};

/// The node's local copy of the shared word list.  Written only by the
/// consensus engine, on resolution of a root-shaped round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordStore {
    words: [String; WORD_COUNT],
}

impl Default for WordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl WordStore {
    /// A fresh store holding the placeholders `word0`..`word4`.
    pub fn new() -> Self {
        Self {
            words: std::array::from_fn(|i| format!("word{i}")),
        }
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.words.get(index).map(String::as_str)
    }

    /// Overwrite one entry.  Out-of-range writes are ignored; the engine
    /// never produces them.
    pub fn set(&mut self, index: usize, value: String) {
        if let Some(slot) = self.words.get_mut(index) {
            info!("database index {index} set to '{value}'");
            *slot = value;
        }
    }

    /// The CLI presentation: one `<i>: <word>` line per entry.
    pub fn lines(&self) -> Vec<String> {
        self.words
            .iter()
            .enumerate()
            .map(|(i, w)| format!("{i}: {w}"))
            .collect()
    }
}
