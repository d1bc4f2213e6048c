use std::collections::HashMap;

use crate::hashable_point::CoordinateKey;
use crate::parsers::{RawSample, SampleSink};

/// A coordinate and how many accepted samples fell into it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightedPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub count: u64,
}

/// Visit counts per rounded coordinate plus the running maximum.
#[derive(Debug, Default)]
pub struct Aggregator {
    counts: HashMap<CoordinateKey, u64>,
    hottest: CoordinateKey,
    hottest_count: u64,
    samples: u64,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The only mutation path. The hottest coordinate moves on a strictly
    /// greater count, so the first bucket to reach a new maximum keeps it.
    pub fn update(&mut self, key: CoordinateKey) {
        let count = self.counts.entry(key).or_insert(0);
        *count += 1;
        self.samples += 1;
        if *count > self.hottest_count {
            self.hottest = key;
            self.hottest_count = *count;
        }
    }

    pub fn count(&self, key: &CoordinateKey) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &HashMap<CoordinateKey, u64> {
        &self.counts
    }

    /// `None` until the first update.
    pub fn hottest(&self) -> Option<(CoordinateKey, u64)> {
        (self.hottest_count > 0).then_some((self.hottest, self.hottest_count))
    }

    pub fn hottest_count(&self) -> u64 {
        self.hottest_count
    }

    pub fn distinct_points(&self) -> usize {
        self.counts.len()
    }

    pub fn total_samples(&self) -> u64 {
        self.samples
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn weighted_points(&self) -> Vec<WeightedPoint> {
        self.counts
            .iter()
            .map(|(key, &count)| WeightedPoint {
                latitude: key.latitude(),
                longitude: key.longitude(),
                count,
            })
            .collect()
    }
}

impl SampleSink for Aggregator {
    fn accept(&mut self, sample: RawSample) {
        self.update(CoordinateKey::from(sample.point));
    }
}
