//! An integer guaranteed to be a PowerOf2.

use core::num;

/// PowerOf2
///
/// An integral guaranteed to be non-zero and a power of 2, as used for size classes.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct PowerOf2(num::NonZeroUsize);

impl PowerOf2 {
    /// Creates a new instance of PowerOf2.
    ///
    /// Or nothing if the value is not a power of 2.
    pub fn new(value: usize) -> Option<PowerOf2> {
        if value.count_ones() == 1 {
            //  Safety:
            //  -   Value is a power of 2, as per the if check.
            Some(unsafe { PowerOf2::new_unchecked(value) })
        } else {
            None
        }
    }

    /// Creates a new instance of PowerOf2.
    ///
    /// #   Safety
    ///
    /// Assumes that the value is a power of 2.
    pub const unsafe fn new_unchecked(value: usize) -> PowerOf2 {
        //  Safety:
        //  -   A power of 2 cannot be 0.
        PowerOf2(num::NonZeroUsize::new_unchecked(value))
    }

    /// Creates the smallest PowerOf2 greater than or equal to `value`.
    ///
    /// Returns 1 for 0, and nothing if the result would not fit in a `usize`.
    pub fn ceil(value: usize) -> Option<PowerOf2> {
        value.checked_next_power_of_two()
            //  Safety:
            //  -   `checked_next_power_of_two` only ever returns powers of 2.
            .map(|value| unsafe { PowerOf2::new_unchecked(value) })
    }

    /// Returns the inner value.
    pub const fn value(&self) -> usize { self.0.get() }

    /// Returns the base 2 logarithm of the value, that is the index of its only set bit.
    pub const fn log2(&self) -> u32 { self.value().trailing_zeros() }
}

#[cfg(test)]
mod tests {

use super::*;

#[test]
fn power_of_2_new() {
    fn new(value: usize) -> Option<usize> {
        PowerOf2::new(value).map(|p| p.value())
    }

    assert_eq!(None, new(0));
    assert_eq!(Some(1), new(1));
    assert_eq!(Some(2), new(2));
    assert_eq!(None, new(3));
    assert_eq!(Some(4), new(4));
    assert_eq!(None, new(6));
    assert_eq!(Some(4096), new(4096));
    assert_eq!(None, new(4097));
}

#[test]
fn power_of_2_ceil() {
    fn ceil(value: usize) -> Option<usize> {
        PowerOf2::ceil(value).map(|p| p.value())
    }

    assert_eq!(Some(1), ceil(0));
    assert_eq!(Some(1), ceil(1));
    assert_eq!(Some(2), ceil(2));
    assert_eq!(Some(4), ceil(3));
    assert_eq!(Some(16), ceil(9));
    assert_eq!(Some(16), ceil(16));
    assert_eq!(Some(32), ceil(17));
    assert_eq!(None, ceil(usize::MAX));
}

#[test]
fn power_of_2_log2() {
    fn log2(value: usize) -> u32 { PowerOf2::new(value).expect("Power of 2").log2() }

    assert_eq!(0, log2(1));
    assert_eq!(1, log2(2));
    assert_eq!(4, log2(16));
    assert_eq!(12, log2(4096));
}

}
