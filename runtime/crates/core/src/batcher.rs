//! Log batching.
//!
//! Coalesces high-frequency output into batches so a tight loop printing
//! thousands of lines per second costs a handful of observer updates. The
//! owner drives [`LogBatcher::tick`] on a fixed cadence; a push that reaches
//! the high-water mark flushes immediately.

use std::time::Duration;

use crate::log_entry::LogEntry;

pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_millis(50);
pub const DEFAULT_HIGH_WATER_MARK: usize = 256;

/// Ordered queue of entries delivered to a single sink, whole batches at a time.
pub struct LogBatcher<F>
where
    F: FnMut(Vec<LogEntry>),
{
    queue: Vec<LogEntry>,
    high_water_mark: usize,
    sink: F,
}

impl<F> LogBatcher<F>
where
    F: FnMut(Vec<LogEntry>),
{
    pub fn new(high_water_mark: usize, sink: F) -> Self {
        Self {
            queue: Vec::new(),
            high_water_mark: high_water_mark.max(1),
            sink,
        }
    }

    /// Queue entries, flushing if the queue reached the high-water mark.
    pub fn push(&mut self, entries: impl IntoIterator<Item = LogEntry>) {
        self.queue.extend(entries);
        if self.queue.len() >= self.high_water_mark {
            self.deliver();
        }
    }

    /// Periodic flush.
    pub fn tick(&mut self) {
        if !self.queue.is_empty() {
            self.deliver();
        }
    }

    /// Deliver whatever is queued. Called at run completion before the
    /// finished signal.
    pub fn drain_now(&mut self) {
        self.tick();
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn deliver(&mut self) {
        let batch = std::mem::take(&mut self.queue);
        (self.sink)(batch);
    }
}

impl<F> std::fmt::Debug for LogBatcher<F>
where
    F: FnMut(Vec<LogEntry>),
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBatcher")
            .field("queued", &self.queue.len())
            .field("high_water_mark", &self.high_water_mark)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_entry::LogMethod;
    use proptest::prelude::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn entries(range: std::ops::Range<usize>) -> Vec<LogEntry> {
        range
            .map(|i| LogEntry::new(LogMethod::Log, i.to_string(), None))
            .collect()
    }

    fn recording_batcher(
        high_water_mark: usize,
    ) -> (
        LogBatcher<impl FnMut(Vec<LogEntry>)>,
        Rc<RefCell<Vec<Vec<LogEntry>>>>,
    ) {
        let batches = Rc::new(RefCell::new(Vec::new()));
        let sink = batches.clone();
        let batcher = LogBatcher::new(high_water_mark, move |batch| sink.borrow_mut().push(batch));
        (batcher, batches)
    }

    #[test]
    fn test_tick_delivers_one_batch() {
        let (mut batcher, batches) = recording_batcher(100);
        batcher.push(entries(0..3));
        batcher.push(entries(3..5));
        assert!(batches.borrow().is_empty());

        batcher.tick();
        assert_eq!(batches.borrow().len(), 1);
        assert_eq!(batches.borrow()[0].len(), 5);
        assert!(batcher.is_empty());
    }

    #[test]
    fn test_empty_tick_is_silent() {
        let (mut batcher, batches) = recording_batcher(10);
        batcher.tick();
        batcher.drain_now();
        assert!(batches.borrow().is_empty());
    }

    #[test]
    fn test_high_water_mark_flushes_on_push() {
        let (mut batcher, batches) = recording_batcher(4);
        batcher.push(entries(0..3));
        assert!(batches.borrow().is_empty());
        batcher.push(entries(3..4));
        assert_eq!(batches.borrow().len(), 1);
        assert_eq!(batches.borrow()[0].len(), 4);
    }

    #[test]
    fn test_drain_now_delivers_remainder() {
        let (mut batcher, batches) = recording_batcher(1000);
        batcher.push(entries(0..7));
        batcher.drain_now();
        assert_eq!(batches.borrow().len(), 1);
        assert_eq!(batcher.len(), 0);
    }

    #[test]
    fn test_single_large_push() {
        let (mut batcher, batches) = recording_batcher(256);
        let pushed = entries(0..1000);
        let ids: Vec<String> = pushed.iter().map(|e| e.id.clone()).collect();
        batcher.push(pushed);
        batcher.drain_now();

        let delivered: Vec<String> = batches.borrow().iter().flatten().map(|e| e.id.clone()).collect();
        assert_eq!(delivered, ids);
        assert_eq!(batches.borrow().len(), 1);
    }

    #[test]
    fn test_many_single_pushes() {
        let (mut batcher, batches) = recording_batcher(256);
        let pushed = entries(0..1000);
        let ids: Vec<String> = pushed.iter().map(|e| e.id.clone()).collect();
        for entry in pushed {
            batcher.push([entry]);
        }
        batcher.drain_now();

        let delivered: Vec<String> = batches.borrow().iter().flatten().map(|e| e.id.clone()).collect();
        assert_eq!(delivered, ids);
        // 3 full batches of 256 plus the remainder
        assert_eq!(batches.borrow().len(), 4);
    }

    proptest! {
        #[test]
        fn prop_exactly_once_in_order(
            pushes in prop::collection::vec(0usize..40, 0..30),
            ticks in prop::collection::vec(any::<bool>(), 0..30),
            high_water_mark in 1usize..64,
        ) {
            let (mut batcher, batches) = recording_batcher(high_water_mark);
            let mut expected = Vec::new();
            let mut next = 0;

            for (i, size) in pushes.iter().enumerate() {
                let chunk = entries(next..next + size);
                next += size;
                expected.extend(chunk.iter().map(|e| e.id.clone()));
                batcher.push(chunk);
                if ticks.get(i).copied().unwrap_or(false) {
                    batcher.tick();
                }
            }
            batcher.drain_now();

            let delivered: Vec<String> =
                batches.borrow().iter().flatten().map(|e| e.id.clone()).collect();
            prop_assert_eq!(delivered, expected);
            prop_assert!(batches.borrow().iter().all(|b| !b.is_empty()));
        }
    }
}
