//! Fixed-window rolling average.
//!
//! Circular buffer of `N` integer samples with a running sum, used for
//! frame-interval (FPS) estimation.  The sum is `u64` over `u32` samples,
//! so it cannot overflow for any window that fits in memory.
//!
//! Not synchronised; the owner serialises access.

#[derive(Debug, Clone)]
pub struct RollingAverage<const N: usize> {
    ring: [u32; N],
    head: usize,
    count: usize,
    sum: u64,
}

impl<const N: usize> RollingAverage<N> {
    pub const fn new() -> Self {
        Self {
            ring: [0; N],
            head: 0,
            count: 0,
            sum: 0,
        }
    }

    /// Clear every sample, as if freshly constructed.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    /// Push a sample (overwriting the oldest once full) and return the
    /// new average.
    pub fn push(&mut self, value: u32) -> u32 {
        if N == 0 {
            return 0;
        }
        self.sum -= u64::from(self.ring[self.head]);
        self.ring[self.head] = value;
        self.sum += u64::from(value);
        self.head = (self.head + 1) % N;
        if self.count < N {
            self.count += 1;
        }
        self.average()
    }

    /// `sum / max(count, 1)`.
    pub fn average(&self) -> u32 {
        (self.sum / self.count.max(1) as u64) as u32
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<const N: usize> Default for RollingAverage<N> {
    fn default() -> Self {
        Self::new()
    }
}
