//! Thread-safe serial counter for protocol events that carry a serial.
//!
//! `Done` and `BufferComplete` events carry a 32-bit serial so the client can
//! correlate them with the request that caused them.  The server side hands
//! these out from one counter per process; the counter is shared between
//! connection tasks, hence the atomic.

use std::sync::atomic::{AtomicU32, Ordering};

/// A thread-safe, monotonically increasing serial source.
///
/// Serials start at 1 (0 is reserved as "no serial") and wrap back to 1
/// after `u32::MAX`.
///
/// # Examples
///
/// ```rust
/// use transmitter_core::protocol::SerialCounter;
///
/// let serials = SerialCounter::new();
/// assert_eq!(serials.next(), 1);
/// assert_eq!(serials.next(), 2);
/// ```
#[derive(Debug)]
pub struct SerialCounter {
    inner: AtomicU32,
}

impl SerialCounter {
    /// Creates a new counter whose first serial is 1.
    pub fn new() -> Self {
        Self {
            inner: AtomicU32::new(1),
        }
    }

    /// Returns the next serial and advances the counter, skipping 0 on wrap.
    pub fn next(&self) -> u32 {
        loop {
            let serial = self.inner.fetch_add(1, Ordering::Relaxed);
            if serial != 0 {
                return serial;
            }
        }
    }

    /// Returns the serial the next call to [`next`](Self::next) would hand out.
    pub fn current(&self) -> u32 {
        self.inner.load(Ordering::Relaxed)
    }
}

impl Default for SerialCounter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_serial_counter_starts_at_one() {
        // Arrange
        let counter = SerialCounter::new();

        // Act
        let first = counter.next();

        // Assert
        assert_eq!(first, 1);
    }

    #[test]
    fn test_serial_counter_skips_zero_on_wrap() {
        // Arrange – start the counter at the last value before overflow
        let counter = SerialCounter {
            inner: AtomicU32::new(u32::MAX),
        };

        // Act
        let last = counter.next();
        let wrapped = counter.next();

        // Assert
        assert_eq!(last, u32::MAX);
        assert_eq!(wrapped, 1, "0 is reserved and must never be handed out");
    }

    #[test]
    fn test_serial_counter_is_unique_across_threads() {
        // Arrange
        let counter = Arc::new(SerialCounter::new());

        // Act
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let c = Arc::clone(&counter);
                thread::spawn(move || (0..500).map(|_| c.next()).collect::<Vec<_>>())
            })
            .collect();
        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().expect("thread panicked"))
            .collect();

        // Assert
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 2000);
    }

    #[test]
    fn test_current_does_not_advance() {
        let counter = SerialCounter::new();
        counter.next();
        assert_eq!(counter.current(), 2);
        assert_eq!(counter.next(), 2);
    }
}
