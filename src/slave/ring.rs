/// Fixed capacity FIFO of bytes.
///
/// `N` must be a power of two no larger than 256, so wrapping an index is a
/// mask. Pushing into a full buffer drops the byte and counts it; stored
/// bytes are never overwritten.
#[derive(Debug)]
pub struct RingBuffer<const N: usize> {
    buf: [u8; N],
    head: usize,
    tail: usize,
    count: usize,
    dropped: usize,
}

impl<const N: usize> RingBuffer<N> {
    const MASK: usize = {
        assert!(N.is_power_of_two() && N <= 256, "buffer size must be a power of two up to 256");
        N - 1
    };

    pub const fn new() -> Self {
        let _ = Self::MASK;
        RingBuffer {
            buf: [0; N],
            head: 0,
            tail: 0,
            count: 0,
            dropped: 0,
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == N
    }

    /// Bytes refused because the buffer was full.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Append `byte`, or hand it back if there is no room.
    pub fn push(&mut self, byte: u8) -> Result<(), u8> {
        if self.is_full() {
            self.dropped = self.dropped.saturating_add(1);
            return Err(byte);
        }
        self.buf[self.head] = byte;
        self.head = (self.head + 1) & Self::MASK;
        self.count += 1;
        Ok(())
    }

    pub fn pop(&mut self) -> Option<u8> {
        if self.is_empty() {
            return None;
        }
        let byte = self.buf[self.tail];
        self.tail = (self.tail + 1) & Self::MASK;
        self.count -= 1;
        Some(byte)
    }

    pub fn clear(&mut self) {
        self.head = 0;
        self.tail = 0;
        self.count = 0;
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}
