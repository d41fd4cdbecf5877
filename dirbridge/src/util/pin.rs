use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::{BridgeError, Result};

/// Caller-supplied output memory.
///
/// Cloning an `IoBuffer` yields another reference to the same region. Writing to it from a
/// context other than the issuing one requires either a [`BufferPin`], or the buffer having been
/// supplied pre-mapped by the I/O layer.
#[derive(Clone)]
pub struct IoBuffer(Arc<IoBufferInner>);

struct IoBufferInner {
    data: Mutex<Box<[u8]>>,
    pins: AtomicUsize,
}

impl IoBuffer {
    /// Allocate a zeroed buffer of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self::from_vec(vec![0; len])
    }

    pub fn from_vec(data: Vec<u8>) -> Self {
        Self(Arc::new(IoBufferInner {
            data: Mutex::new(data.into_boxed_slice()),
            pins: AtomicUsize::new(0),
        }))
    }

    pub fn len(&self) -> usize {
        self.0.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The number of live pins on this region.
    pub fn pin_count(&self) -> usize {
        self.0.pins.load(Ordering::Acquire)
    }

    /// Copy the current contents out of the buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        self.0.data.lock().to_vec()
    }

    fn fill(&self, capacity: u32, contents: &[u8]) {
        let mut data = self.0.data.lock();
        let capacity = std::cmp::min(capacity as usize, data.len());
        data[..capacity].fill(0);
        let written = std::cmp::min(contents.len(), capacity);
        data[..written].copy_from_slice(&contents[..written]);
    }
}

impl fmt::Debug for IoBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IoBuffer")
            .field("len", &self.len())
            .field("pins", &self.pin_count())
            .finish()
    }
}

/// Budget of output bytes that may be pinned at the same time.
#[derive(Debug)]
pub struct PinBudget {
    limit: u64,
    in_use: AtomicU64,
}

impl PinBudget {
    pub fn new(limit: u64) -> Self {
        Self {
            limit,
            in_use: AtomicU64::new(0),
        }
    }

    /// Bytes currently held by live pins.
    pub fn in_use(&self) -> u64 {
        self.in_use.load(Ordering::Acquire)
    }

    fn try_acquire(&self, bytes: u64) -> bool {
        self.in_use
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                current.checked_add(bytes).filter(|total| *total <= self.limit)
            })
            .is_ok()
    }

    fn release(&self, bytes: u64) {
        self.in_use.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// A pin on an [`IoBuffer`] that keeps it addressable from another execution context.
///
/// The pin is released when it goes out of scope. It cannot be cloned, so a pin is released
/// exactly once no matter which path (completion, cancellation, failure) ends up owning it.
pub struct BufferPin {
    buffer: IoBuffer,
    length: u32,
    budget: Arc<PinBudget>,
}

impl BufferPin {
    /// Pin the first `length` bytes of `buffer`, charging them to `budget`.
    pub fn new(buffer: &IoBuffer, length: u32, budget: &Arc<PinBudget>) -> Result<Self> {
        if length as usize > buffer.len() {
            return Err(BridgeError::InvalidArgument(
                "pin length exceeds the supplied buffer",
            ));
        }
        if !budget.try_acquire(length as u64) {
            return Err(BridgeError::ResourceExhausted);
        }
        buffer.0.pins.fetch_add(1, Ordering::AcqRel);
        tracing::trace!(length, "pinned output buffer");
        Ok(Self {
            buffer: buffer.clone(),
            length,
            budget: budget.clone(),
        })
    }

    /// The number of bytes covered by this pin.
    pub fn len(&self) -> u32 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Explicitly release the pin.
    pub fn release(self) {
        drop(self)
    }
}

impl Drop for BufferPin {
    fn drop(&mut self) {
        self.buffer.0.pins.fetch_sub(1, Ordering::AcqRel);
        self.budget.release(self.length as u64);
        tracing::trace!(length = self.length, "released output buffer pin");
    }
}

impl fmt::Debug for BufferPin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferPin")
            .field("length", &self.length)
            .finish()
    }
}

/// How the completion context reaches the caller's output buffer.
#[derive(Debug)]
pub enum BufferAccess {
    /// The buffer was supplied already addressable from any context; nothing to release.
    Mapped(IoBuffer),
    /// The bridge pinned the buffer and owns the pin.
    Pinned(BufferPin),
}

impl BufferAccess {
    /// Zero the first `capacity` bytes, then copy `contents` to the start of the buffer.
    pub(crate) fn fill(&self, capacity: u32, contents: &[u8]) {
        match self {
            BufferAccess::Mapped(buffer) => buffer.fill(capacity, contents),
            BufferAccess::Pinned(pin) => pin.buffer.fill(capacity, contents),
        }
    }

    /// Whether this access owns a pin that must be released.
    pub fn owns_pin(&self) -> bool {
        matches!(self, BufferAccess::Pinned(_))
    }

    /// Give up access, releasing the pin if one is owned.
    pub fn release(self) {
        if let BufferAccess::Pinned(pin) = self {
            pin.release()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pin_is_released_once_on_drop() {
        let budget = Arc::new(PinBudget::new(1024));
        let buffer = IoBuffer::new(64);
        let pin = BufferPin::new(&buffer, 64, &budget).unwrap();
        assert_eq!(buffer.pin_count(), 1);
        assert_eq!(budget.in_use(), 64);

        pin.release();
        assert_eq!(buffer.pin_count(), 0);
        assert_eq!(budget.in_use(), 0);
    }

    #[test]
    fn pin_budget_is_enforced() {
        let budget = Arc::new(PinBudget::new(100));
        let a = IoBuffer::new(80);
        let b = IoBuffer::new(80);
        let _held = BufferPin::new(&a, 80, &budget).unwrap();
        assert_eq!(
            BufferPin::new(&b, 80, &budget).unwrap_err(),
            BridgeError::ResourceExhausted
        );
        assert_eq!(b.pin_count(), 0);
        assert_eq!(budget.in_use(), 80);
    }

    #[test]
    fn pin_cannot_exceed_region() {
        let budget = Arc::new(PinBudget::new(u64::MAX));
        let buffer = IoBuffer::new(8);
        assert!(matches!(
            BufferPin::new(&buffer, 9, &budget),
            Err(BridgeError::InvalidArgument(_))
        ));
    }

    #[test]
    fn fill_zeroes_capacity_before_copy() {
        let buffer = IoBuffer::from_vec(vec![0xAA; 8]);
        let access = BufferAccess::Mapped(buffer.clone());
        access.fill(6, &[1, 2]);
        assert_eq!(buffer.to_vec(), vec![1, 2, 0, 0, 0, 0, 0xAA, 0xAA]);
        assert!(!access.owns_pin());
    }
}
