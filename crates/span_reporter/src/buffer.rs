//! Bounded holding area for encoded spans.
//!
//! Admission is lock-free: a producer reserves a slot by CAS on the span
//! counter, then reserves its bytes by CAS on the byte counter, rolling the
//! slot back if the bytes do not fit. Only after both reservations succeed is
//! the span pushed to the queue, so the counters never under-report what the
//! queue holds.
//!
//! Drains are serialized by a mutex that also holds the carry-over span: the
//! first span stolen that did not fit the previous batch. Carrying it keeps
//! FIFO order without peeking the injector queue.

use crate::encoding::{EncodedSpan, Encoding};
use crossbeam_deque::{Injector, Steal};
use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Ordered run of encoded spans removed from the buffer in one drain
#[derive(Debug, Default)]
pub struct Batch {
    /// Spans in the order they were offered
    pub spans: Vec<EncodedSpan>,
    /// Sum of the spans' encoded sizes (without message framing)
    pub size_in_bytes: usize,
    /// Spans removed because they could not fit any batch on their own
    pub discarded: usize,
}

impl Batch {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.spans.len()
    }
}

/// Multi-producer queue bounded by span count and cumulative encoded size
pub struct BoundedBuffer {
    queue: Injector<EncodedSpan>,
    count: CachePadded<AtomicUsize>,
    bytes: CachePadded<AtomicUsize>,
    max_spans: usize,
    max_bytes: usize,
    carry: Mutex<Option<EncodedSpan>>,
}

impl BoundedBuffer {
    pub fn new(max_spans: usize, max_bytes: usize) -> Self {
        Self {
            queue: Injector::new(),
            count: CachePadded::new(AtomicUsize::new(0)),
            bytes: CachePadded::new(AtomicUsize::new(0)),
            max_spans,
            max_bytes,
            carry: Mutex::new(None),
        }
    }

    /// Adds a span unless doing so would exceed either bound.
    ///
    /// Returns `false` when the span was rejected; the buffer is unchanged.
    pub fn offer(&self, span: EncodedSpan) -> bool {
        let size = span.len();
        let max_spans = self.max_spans;
        if self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max_spans).then_some(n + 1))
            .is_err()
        {
            return false;
        }

        let max_bytes = self.max_bytes;
        if self
            .bytes
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |b| {
                b.checked_add(size).filter(|total| *total <= max_bytes)
            })
            .is_err()
        {
            self.count.fetch_sub(1, Ordering::AcqRel);
            return false;
        }

        self.queue.push(span);
        true
    }

    /// Removes the oldest spans whose summed size does not exceed `max_bytes`.
    pub fn drain(&self, max_bytes: usize) -> Batch {
        self.drain_while(|_, bytes| bytes <= max_bytes)
    }

    /// Removes the oldest spans that fit one `encoding` message of at most `max_bytes`.
    pub fn drain_message(&self, encoding: Encoding, max_bytes: usize) -> Batch {
        self.drain_while(|count, bytes| encoding.list_size_in_bytes(count, bytes) <= max_bytes)
    }

    fn drain_while(&self, fits: impl Fn(usize, usize) -> bool) -> Batch {
        let mut carry = self.carry.lock();
        let mut batch = Batch::default();

        while let Some(span) = carry.take().or_else(|| self.pop()) {
            let len = span.len();
            if fits(batch.spans.len() + 1, batch.size_in_bytes + len) {
                self.release(len);
                batch.size_in_bytes += len;
                batch.spans.push(span);
            } else if batch.spans.is_empty() {
                // Too large for any batch; would otherwise block the head forever
                self.release(len);
                batch.discarded += 1;
            } else {
                *carry = Some(span);
                break;
            }
        }
        batch
    }

    fn pop(&self) -> Option<EncodedSpan> {
        loop {
            match self.queue.steal() {
                Steal::Success(span) => return Some(span),
                Steal::Empty => return None,
                Steal::Retry => std::hint::spin_loop(),
            }
        }
    }

    /// Removes every buffered span, returning how many were removed.
    pub fn clear(&self) -> usize {
        let mut carry = self.carry.lock();
        let mut removed = 0;
        while let Some(span) = carry.take().or_else(|| self.pop()) {
            self.release(span.len());
            removed += 1;
        }
        removed
    }

    fn release(&self, len: usize) {
        self.bytes.fetch_sub(len, Ordering::AcqRel);
        self.count.fetch_sub(1, Ordering::AcqRel);
    }

    /// Number of buffered spans (snapshot)
    #[inline]
    pub fn len(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Summed encoded size of buffered spans (snapshot)
    #[inline]
    pub fn size_in_bytes(&self) -> usize {
        self.bytes.load(Ordering::Acquire)
    }

    #[inline]
    pub fn max_spans(&self) -> usize {
        self.max_spans
    }

    #[inline]
    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

impl std::fmt::Debug for BoundedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedBuffer")
            .field("len", &self.len())
            .field("size_in_bytes", &self.size_in_bytes())
            .field("max_spans", &self.max_spans)
            .field("max_bytes", &self.max_bytes)
            .finish_non_exhaustive()
    }
}
