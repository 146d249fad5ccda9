//! Closed ranges used by gating opcodes.

/// A `[start, end]` range of opcode values.
///
/// Ranges are never reordered: a range whose `start` is above its `end`
/// contains nothing, which lets `hikey < lokey` act as a hard off switch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Range<T> {
    pub start: T,
    pub end: T,
}

impl<T: PartialOrd + Copy> Range<T> {
    pub const fn new(start: T, end: T) -> Self {
        Self { start, end }
    }

    /// Inclusive membership test.
    pub fn contains_with_end(&self, value: T) -> bool {
        value >= self.start && value <= self.end
    }

    /// Half-open membership test (`end` excluded).
    pub fn contains(&self, value: T) -> bool {
        value >= self.start && value < self.end
    }

    pub fn set_start(&mut self, start: T) {
        self.start = start;
    }

    pub fn set_end(&mut self, end: T) {
        self.end = end;
    }

    /// Clamp `value` into the range. Inverted ranges clamp to `start`.
    pub fn clamp(&self, value: T) -> T {
        if value < self.start {
            self.start
        } else if value > self.end {
            if self.end < self.start {
                self.start
            } else {
                self.end
            }
        } else {
            value
        }
    }
}

impl Range<f32> {
    pub fn length(&self) -> f32 {
        self.end - self.start
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inclusive_and_half_open() {
        let range = Range::new(1, 5);
        assert!(range.contains_with_end(5));
        assert!(!range.contains(5));
        assert!(range.contains(1));
        assert!(!range.contains_with_end(0));
    }

    #[test]
    fn test_inverted_range_contains_nothing() {
        let range = Range::new(60, 50);
        for key in 0..128 {
            assert!(!range.contains_with_end(key));
        }
        assert_eq!(range.clamp(70), 60);
    }

    #[test]
    fn test_clamp() {
        let range = Range::new(0.0f32, 100.0);
        assert_eq!(range.clamp(-3.0), 0.0);
        assert_eq!(range.clamp(300.0), 100.0);
        assert_eq!(range.clamp(42.0), 42.0);
        assert_eq!(range.length(), 100.0);
    }
}
