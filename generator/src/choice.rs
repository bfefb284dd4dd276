use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;

use crate::config::ConfigError;

/// A closed set of alternatives with integer weights, sampled with one draw.
#[derive(Debug, Clone)]
pub struct WeightedTable<T> {
    items: Vec<T>,
    index: WeightedIndex<u32>,
}

impl<T: Copy> WeightedTable<T> {
    pub fn new(table: &'static str, entries: &[(T, u32)]) -> Result<Self, ConfigError> {
        let index = WeightedIndex::new(entries.iter().map(|(_, w)| *w)).map_err(|e| {
            ConfigError::Weights {
                table,
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            items: entries.iter().map(|(item, _)| *item).collect(),
            index,
        })
    }

    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> T {
        self.items[self.index.sample(rng)]
    }
}
