//! Bounded result history

use std::collections::VecDeque;

use crate::models::{CollectionResult, CollectionStatus};

/// Default number of results retained
pub const DEFAULT_HISTORY_SIZE: usize = 100;

/// Fixed-capacity ring of collection results, oldest evicted first
#[derive(Debug, Clone)]
pub struct ResultHistory {
    entries: VecDeque<CollectionResult>,
    capacity: usize,
}

impl Default for ResultHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl ResultHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, result: CollectionResult) {
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(result);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Change capacity, dropping the oldest entries if it shrank
    pub fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity.max(1);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// All entries, oldest first
    pub fn iter(&self) -> impl Iterator<Item = &CollectionResult> {
        self.entries.iter()
    }

    /// The last `n` entries, oldest first
    pub fn recent(&self, n: usize) -> Vec<CollectionResult> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// Entries produced by one collector, oldest first
    pub fn for_collector(&self, name: &str) -> Vec<CollectionResult> {
        self.entries
            .iter()
            .filter(|r| r.source_name == name)
            .cloned()
            .collect()
    }

    /// Per-result success rates over the last `n` entries
    pub fn success_rate_trend(&self, n: usize) -> Vec<f64> {
        self.tail(n).map(CollectionResult::success_rate).collect()
    }

    /// Per-result throughput over the last `n` entries
    pub fn throughput_trend(&self, n: usize) -> Vec<f64> {
        self.tail(n).map(CollectionResult::items_per_second).collect()
    }

    /// Failed results among the last `n` entries
    pub fn recent_failures(&self, n: usize) -> usize {
        self.tail(n)
            .filter(|r| r.status == CollectionStatus::Failed)
            .count()
    }

    fn tail(&self, n: usize) -> impl Iterator<Item = &CollectionResult> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(name: &str, status: CollectionStatus) -> CollectionResult {
        let mut result = CollectionResult::new(name);
        result.status = status;
        result
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut history = ResultHistory::new(100);
        for i in 0..150 {
            history.push(result(&format!("feed-{i}"), CollectionStatus::Completed));
        }

        assert_eq!(history.len(), 100);
        let names: Vec<_> = history.iter().map(|r| r.source_name.clone()).collect();
        let expected: Vec<_> = (50..150).map(|i| format!("feed-{i}")).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_recent_and_for_collector() {
        let mut history = ResultHistory::new(10);
        history.push(result("a", CollectionStatus::Completed));
        history.push(result("b", CollectionStatus::Failed));
        history.push(result("a", CollectionStatus::Failed));

        let recent = history.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].source_name, "b");
        assert_eq!(recent[1].source_name, "a");

        assert_eq!(history.for_collector("a").len(), 2);
        assert_eq!(history.recent_failures(10), 2);
        assert_eq!(history.recent_failures(1), 1);
    }

    #[test]
    fn test_shrinking_capacity() {
        let mut history = ResultHistory::new(5);
        for i in 0..5 {
            history.push(result(&i.to_string(), CollectionStatus::Completed));
        }
        history.set_capacity(2);
        assert_eq!(history.len(), 2);
        assert_eq!(history.recent(5)[0].source_name, "3");
    }

    #[test]
    fn test_trends() {
        let mut history = ResultHistory::new(10);
        let mut ok = result("a", CollectionStatus::Completed);
        ok.collected_count = 3;
        ok.add_error("one bad record");
        history.push(ok);
        history.push(result("b", CollectionStatus::Failed));

        assert_eq!(history.success_rate_trend(10), vec![75.0, 0.0]);
        assert_eq!(history.throughput_trend(10), vec![0.0, 0.0]);
    }
}
