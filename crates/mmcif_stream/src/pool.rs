//! Reusable line batches for the `_atom_site` pipeline.
//!
//! A [`LineBatch`] packs many lines into one byte arena, so filling it never
//! allocates per line. Drained batches come back to a [`BufferPool`] that
//! buckets them by arena capacity in power-of-two size classes.

use std::collections::BTreeMap;

/// Rows per batch handed from producer to consumer.
pub(crate) const BATCH_ROWS: usize = 512;

/// Smallest arena worth allocating: `BATCH_ROWS` lines of a typical width.
const MIN_ARENA: usize = BATCH_ROWS * 96;

/// Pooled batches kept per size class; more than the queue can hold in flight.
const MAX_PER_CLASS: usize = 8;

#[derive(Clone, Copy, Debug)]
struct LineSpan {
    start: usize,
    end: usize,
    line: usize,
}

#[derive(Debug, Default)]
pub(crate) struct LineBatch {
    bytes: Vec<u8>,
    spans: Vec<LineSpan>,
}

impl LineBatch {
    fn with_capacity(bytes: usize) -> Self {
        Self {
            bytes: Vec::with_capacity(bytes),
            spans: Vec::with_capacity(BATCH_ROWS),
        }
    }

    pub(crate) fn push(&mut self, line_number: usize, line: &[u8]) {
        let start = self.bytes.len();
        self.bytes.extend_from_slice(line);
        self.spans.push(LineSpan {
            start,
            end: self.bytes.len(),
            line: line_number,
        });
    }

    pub(crate) fn len(&self) -> usize {
        self.spans.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    pub(crate) fn is_full(&self) -> bool {
        self.spans.len() >= BATCH_ROWS
    }

    pub(crate) fn byte_len(&self) -> usize {
        self.bytes.len()
    }

    fn capacity(&self) -> usize {
        self.bytes.capacity()
    }

    fn clear(&mut self) {
        self.bytes.clear();
        self.spans.clear();
    }

    /// Lines in file order with their 1-based line numbers.
    pub(crate) fn lines(&self) -> impl Iterator<Item = (usize, &[u8])> {
        self.spans
            .iter()
            .map(move |span| (span.line, &self.bytes[span.start..span.end]))
    }
}

#[derive(Debug, Default)]
pub(crate) struct BufferPool {
    classes: BTreeMap<u32, Vec<LineBatch>>,
    allocated: usize,
    reused: usize,
}

impl BufferPool {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Hand out an empty batch whose arena holds at least `hint` bytes when
    /// one is pooled, otherwise allocate a fresh one.
    pub(crate) fn acquire(&mut self, hint: usize) -> LineBatch {
        let wanted = ceil_class(hint);
        if let Some(batch) = self
            .classes
            .range_mut(wanted..)
            .find_map(|(_, batches)| batches.pop())
        {
            self.reused += 1;
            return batch;
        }
        self.allocated += 1;
        LineBatch::with_capacity(1 << wanted)
    }

    pub(crate) fn release(&mut self, mut batch: LineBatch) {
        batch.clear();
        let Some(class) = floor_class(batch.capacity()) else {
            return;
        };
        let bucket = self.classes.entry(class).or_default();
        if bucket.len() < MAX_PER_CLASS {
            bucket.push(batch);
        }
    }

    pub(crate) fn allocated(&self) -> usize {
        self.allocated
    }

    pub(crate) fn reused(&self) -> usize {
        self.reused
    }
}

fn ceil_class(bytes: usize) -> u32 {
    bytes.max(MIN_ARENA).next_power_of_two().trailing_zeros()
}

fn floor_class(capacity: usize) -> Option<u32> {
    (capacity > 0).then(|| usize::BITS - 1 - capacity.leading_zeros())
}
