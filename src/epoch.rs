use rand::Rng;
use rand::seq::SliceRandom;

/// Cyclic, shuffled walk over a fixed population (valid times or store files).
///
/// The order is reshuffled at every wraparound. `consecutive_skips` lets the
/// caller detect a full pass that produced nothing usable.
#[derive(Clone, Debug)]
pub(crate) struct EpochCursor<T> {
    items: Vec<T>,
    offset: usize,
    epoch: u64,
    consecutive_skips: usize,
}

impl<T: Clone> EpochCursor<T> {
    pub fn new<R: Rng + ?Sized>(mut items: Vec<T>, rng: &mut R) -> Self {
        items.shuffle(rng);
        Self {
            items,
            offset: 0,
            epoch: 0,
            consecutive_skips: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Next item, wrapping (and reshuffling) at the end of the population.
    pub fn next_item<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Option<T> {
        if self.items.is_empty() {
            return None;
        }
        let item = self.items[self.offset].clone();
        self.offset += 1;
        if self.offset >= self.items.len() {
            self.offset = 0;
            self.epoch = self.epoch.saturating_add(1);
            self.items.shuffle(rng);
        }
        Some(item)
    }

    /// Record an unusable item. Returns `true` once a whole pass was skipped.
    pub fn record_skip(&mut self) -> bool {
        self.consecutive_skips += 1;
        self.consecutive_skips >= self.items.len()
    }

    pub fn record_use(&mut self) {
        self.consecutive_skips = 0;
    }
}
