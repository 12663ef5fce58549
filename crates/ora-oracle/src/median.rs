//! Median computation.
//!
//! Odd counts take the middle value. Even counts take the integer average of
//! the two central values, truncated toward zero.

use ora_types::Price;

/// Median of `prices`, or `None` for an empty slice.
///
/// # Examples
///
/// ```
/// use ora_oracle::median::median;
///
/// assert_eq!(median(&[1000, 1100]), Some(1050));
/// assert_eq!(median(&[1200, 1000, 1000]), Some(1000));
/// assert_eq!(median(&[]), None);
/// ```
pub fn median(prices: &[Price]) -> Option<Price> {
    if prices.is_empty() {
        return None;
    }
    let mut sorted = prices.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        return Some(sorted[mid]);
    }
    let (lo, hi) = (sorted[mid - 1], sorted[mid]);
    // floor((lo + hi) / 2) without overflowing
    Some(lo / 2 + hi / 2 + (lo % 2 + hi % 2) / 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single() {
        assert_eq!(median(&[42]), Some(42));
    }

    #[test]
    fn test_even_average() {
        assert_eq!(median(&[1000, 1100]), Some(1050));
        assert_eq!(median(&[1100, 1000]), Some(1050));
    }

    #[test]
    fn test_even_truncates() {
        assert_eq!(median(&[1000, 1001]), Some(1000));
        assert_eq!(median(&[1, 2, 3, 4]), Some(2));
    }

    #[test]
    fn test_odd_middle() {
        assert_eq!(median(&[1000, 1000, 1200]), Some(1000));
        assert_eq!(median(&[1400, 1000, 1000, 1400, 1000, 1000]), Some(1000));
        assert_eq!(median(&[5, 1, 3]), Some(3));
    }

    #[test]
    fn test_empty() {
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_large_values_do_not_overflow() {
        let big = u128::MAX - 1;
        assert_eq!(median(&[big, u128::MAX]), Some(u128::MAX - 1));
        assert_eq!(median(&[u128::MAX, u128::MAX]), Some(u128::MAX));
    }
}
