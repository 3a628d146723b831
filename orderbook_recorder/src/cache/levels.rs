use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// Resting size at one price. Used both for updates coming off the feed and
/// for cache snapshots; a size of zero in an update removes the price.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

impl PriceLevel {
    pub fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }

    pub fn is_removal(&self) -> bool {
        self.size == 0.0
    }

    pub fn validate(&self) -> Result<()> {
        if !self.price.is_finite() || !self.size.is_finite() {
            return Err(Error::InvalidLevel(self.price, self.size));
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug)]
pub struct PriceKey {
    pub price: f64,
}

impl PriceKey {
    pub fn new(price: f64) -> Self {
        // folds -0.0 into 0.0 so both address the same level
        Self { price: price + 0.0 }
    }
}

impl PartialEq for PriceKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for PriceKey {}

impl PartialOrd for PriceKey {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriceKey {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.price.total_cmp(&other.price)
    }
}

/// Sorted price -> size set for one side of one instrument.
#[derive(Clone, Default)]
pub struct SideLevels {
    levels: BTreeMap<PriceKey, PriceLevel>,
}

impl SideLevels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upserts the level, or removes it when the size is zero.
    /// Removing a price that is not present is a no-op.
    pub fn apply(&mut self, update: PriceLevel) {
        let key = PriceKey::new(update.price);
        if update.is_removal() {
            self.levels.remove(&key);
        } else {
            self.levels
                .insert(key, PriceLevel::new(key.price, update.size));
        }
    }

    /// Checks the whole batch before touching any level, so a batch holding
    /// a non-finite value leaves the set unchanged. Values are otherwise
    /// stored as received.
    pub fn apply_batch(&mut self, updates: &[PriceLevel]) -> Result<()> {
        for update in updates {
            update.validate()?;
        }
        for update in updates {
            self.apply(*update);
        }
        Ok(())
    }

    /// Levels in ascending price order.
    pub fn levels(&self) -> Vec<PriceLevel> {
        self.levels.values().copied().collect()
    }

    #[cfg(test)]
    fn get(&self, price: f64) -> Option<f64> {
        self.levels.get(&PriceKey::new(price)).map(|l| l.size)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.levels.len()
    }
}

impl std::fmt::Debug for SideLevels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let levels: Vec<(f64, f64)> = self.levels.values().map(|l| (l.price, l.size)).collect();
        write!(f, "SideLevels({:?})", levels)
    }
}
