//! Bounded accumulation buffer for the framing engine
//!
//! Provides O(1) consume operations instead of O(n) Vec::drain().

/// Fixed-capacity ring buffer with O(1) advance
///
/// Capacity is chosen at construction (device-specific), never grows.
pub struct RingBuffer {
    data: Box<[u8]>,
    head: usize, // Write position (next empty slot)
    tail: usize, // Read position (first valid byte)
    len: usize,  // Number of bytes available
}

impl RingBuffer {
    /// Create an empty buffer holding at most `capacity` bytes
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0u8; capacity.max(1)].into_boxed_slice(),
            head: 0,
            tail: 0,
            len: 0,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of bytes available to read
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Free space left
    #[inline]
    pub fn remaining(&self) -> usize {
        self.capacity() - self.len
    }

    /// Append as many bytes as fit, returning how many were accepted
    #[inline]
    pub fn extend(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.remaining());
        let cap = self.capacity();
        for &b in &bytes[..n] {
            self.data[self.head] = b;
            self.head = (self.head + 1) % cap;
        }
        self.len += n;
        n
    }

    /// Consume n bytes from the front - O(1)
    #[inline]
    pub fn advance(&mut self, n: usize) {
        let n = n.min(self.len);
        self.tail = (self.tail + n) % self.capacity();
        self.len -= n;
    }

    /// Drop everything except the last `n` bytes
    pub fn keep_last(&mut self, n: usize) {
        if self.len > n {
            self.advance(self.len - n);
        }
    }

    /// Discard all buffered bytes
    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.len = 0;
    }

    /// Read byte at logical index (handles wraparound)
    #[inline]
    pub fn get(&self, index: usize) -> Option<u8> {
        if index < self.len {
            Some(self.data[(self.tail + index) % self.capacity()])
        } else {
            None
        }
    }

    /// Buffered bytes as one slice, rotating storage if the data wraps
    pub fn make_contiguous(&mut self) -> &[u8] {
        if self.tail + self.len > self.capacity() {
            self.data.rotate_left(self.tail);
            self.tail = 0;
            self.head = self.len % self.capacity();
        }
        &self.data[self.tail..self.tail + self.len]
    }
}
