//! Chunker/Deduplicator
//!
//! Splits generated candidates into ordered, duplicate-free batches bounded by
//! a maximum size, ahead of the enrichment calls.

use crate::models::CandidateItem;
use std::collections::HashSet;

/// Items carrying the text they are deduplicated by
pub trait ItemText {
    fn item_text(&self) -> &str;
}

impl ItemText for CandidateItem {
    fn item_text(&self) -> &str {
        &self.text
    }
}

impl ItemText for String {
    fn item_text(&self) -> &str {
        self
    }
}

impl ItemText for &str {
    fn item_text(&self) -> &str {
        self
    }
}

/// Deduplicate by exact text and group into batches of at most `max_size`
///
/// Single pass in input order; the first occurrence of a text wins. The last
/// batch may be smaller than `max_size`. A `max_size` of 0 is treated as 1.
pub fn chunk_unique<T, I>(items: I, max_size: usize) -> Vec<Vec<T>>
where
    I: IntoIterator<Item = T>,
    T: ItemText,
{
    let max_size = max_size.max(1);
    let mut seen: HashSet<String> = HashSet::new();
    let mut batches = Vec::new();
    let mut current: Vec<T> = Vec::with_capacity(max_size);

    for item in items {
        if !seen.insert(item.item_text().to_string()) {
            continue;
        }
        current.push(item);
        if current.len() == max_size {
            batches.push(std::mem::replace(&mut current, Vec::with_capacity(max_size)));
        }
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}
