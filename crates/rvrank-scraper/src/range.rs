//! Price sub-ranges and the splitter that proposes them.

use serde::Serialize;

/// Fraction of the retrievable window a proposed band should be expected to
/// fill. Counts are estimates, so bands aim well below the hard cap.
pub const TARGET_FILL: f64 = 0.7;

/// Breakpoints for the first split of an unconstrained price domain, in whole
/// dollars. The final band runs from the last breakpoint to unbounded.
pub const DEFAULT_PRICE_BREAKS: &[u64] = &[
    0, 5_000, 10_000, 15_000, 20_000, 25_000, 30_000, 35_000, 40_000, 45_000, 50_000, 55_000,
    60_000, 65_000, 70_000, 75_000, 80_000, 85_000, 90_000, 95_000, 100_000, 125_000, 150_000,
    175_000, 200_000, 250_000, 300_000, 400_000, 500_000, 750_000, 1_000_000,
];

/// An inclusive price band in whole dollars. `upper = None` is unbounded above.
///
/// The listings endpoint treats both bounds inclusively, so two adjacent
/// bands share listings priced exactly at their common boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct SubRange {
    pub lower: u64,
    pub upper: Option<u64>,
}

impl SubRange {
    #[must_use]
    pub const fn new(lower: u64, upper: Option<u64>) -> Self {
        Self { lower, upper }
    }

    /// The whole price domain; queries over it carry no price filter.
    #[must_use]
    pub const fn full() -> Self {
        Self {
            lower: 0,
            upper: None,
        }
    }

    #[must_use]
    pub const fn bounded(lower: u64, upper: u64) -> Self {
        Self {
            lower,
            upper: Some(upper),
        }
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.lower == 0 && self.upper.is_none()
    }

    #[must_use]
    pub fn contains(&self, price: u64) -> bool {
        price >= self.lower && self.upper.is_none_or(|hi| price <= hi)
    }

    /// Whether the band is at least $1 wide and so can be split further.
    #[must_use]
    pub fn can_narrow(&self) -> bool {
        self.upper.is_none_or(|hi| hi > self.lower)
    }

    /// Value of the `price` query parameter, `lower:upper` with `0` and an
    /// open upper bound rendered as `*`. `None` for the full domain.
    #[must_use]
    pub fn price_param(&self) -> Option<String> {
        if self.is_full() {
            return None;
        }
        let lower = if self.lower == 0 {
            "*".to_owned()
        } else {
            self.lower.to_string()
        };
        let upper = self.upper.map_or_else(|| "*".to_owned(), |hi| hi.to_string());
        Some(format!("{lower}:{upper}"))
    }
}

impl std::fmt::Display for SubRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.upper {
            Some(hi) => write!(f, "${}-${hi}", self.lower),
            None => write!(f, "${}+", self.lower),
        }
    }
}

/// Proposes ascending, covering price bands whose expected result counts
/// stay under the retrievable window. Stateless: the collector re-invokes it
/// on any band that still overflows.
#[derive(Debug, Clone)]
pub struct RangeSplitter {
    breaks: Vec<u64>,
}

impl Default for RangeSplitter {
    fn default() -> Self {
        Self {
            breaks: DEFAULT_PRICE_BREAKS.to_vec(),
        }
    }
}

impl RangeSplitter {
    /// Uses `breaks` for the first split of the full domain instead of
    /// [`DEFAULT_PRICE_BREAKS`]. Breakpoints are sorted and deduplicated and
    /// `0` is always included.
    #[must_use]
    pub fn with_breaks(mut breaks: Vec<u64>) -> Self {
        breaks.push(0);
        breaks.sort_unstable();
        breaks.dedup();
        Self { breaks }
    }

    /// Splits `range` into ascending bands.
    ///
    /// - full domain: the breakpoint table
    /// - `[lo, hi]`: equal-width bands, each at least $1 wide
    /// - `[lo, ∞)` with `lo > 0`: doubling bands ending in an unbounded catch-all
    ///
    /// Returns `range` alone when nothing is expected or the band cannot be
    /// narrowed. Never returns an empty list.
    #[must_use]
    pub fn propose(&self, range: &SubRange, expected_total: u64, max_window: u64) -> Vec<SubRange> {
        if expected_total == 0 || !range.can_narrow() {
            return vec![*range];
        }

        if range.is_full() {
            return self.table_bands();
        }

        let bands = band_count(expected_total, max_window);
        match range.upper {
            Some(hi) => equal_width_bands(range.lower, hi, bands),
            None => doubling_bands(range.lower, bands),
        }
    }

    fn table_bands(&self) -> Vec<SubRange> {
        let mut bands: Vec<SubRange> = self
            .breaks
            .windows(2)
            .map(|pair| SubRange::bounded(pair[0], pair[1]))
            .collect();
        let last = self.breaks.last().copied().unwrap_or(0);
        bands.push(SubRange::new(last, None));
        bands
    }
}

/// `max(2, ceil(expected / (TARGET_FILL * max_window)))`.
fn band_count(expected_total: u64, max_window: u64) -> u64 {
    #[allow(clippy::cast_precision_loss)]
    let target = (TARGET_FILL * max_window as f64).max(1.0);
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let needed = (expected_total as f64 / target).ceil() as u64;
    needed.max(2)
}

fn equal_width_bands(lower: u64, upper: u64, bands: u64) -> Vec<SubRange> {
    let width = upper - lower;
    let bands = bands.min(width);
    let boundary = |i: u64| -> u64 {
        let offset = u128::from(width) * u128::from(i) / u128::from(bands);
        // offset <= width, which fits in u64
        lower + u64::try_from(offset).unwrap_or(width)
    };
    (0..bands)
        .map(|i| SubRange::bounded(boundary(i), boundary(i + 1)))
        .collect()
}

fn doubling_bands(lower: u64, bands: u64) -> Vec<SubRange> {
    let mut out = Vec::new();
    let mut lo = lower;
    for _ in 1..bands {
        let Some(hi) = lo.checked_mul(2) else { break };
        out.push(SubRange::bounded(lo, hi));
        lo = hi;
    }
    out.push(SubRange::new(lo, None));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers(bands: &[SubRange], range: &SubRange) {
        assert_eq!(bands.first().map(|b| b.lower), Some(range.lower));
        assert_eq!(bands.last().and_then(|b| b.upper), range.upper);
        for pair in bands.windows(2) {
            assert_eq!(pair[0].upper, Some(pair[1].lower), "bands must be contiguous");
            assert!(pair[0].lower < pair[1].lower, "bands must ascend");
        }
    }

    #[test]
    fn price_param_renders_open_bounds_as_star() {
        assert_eq!(SubRange::full().price_param(), None);
        assert_eq!(
            SubRange::bounded(0, 5_000).price_param().as_deref(),
            Some("*:5000")
        );
        assert_eq!(
            SubRange::bounded(5_000, 10_000).price_param().as_deref(),
            Some("5000:10000")
        );
        assert_eq!(
            SubRange::new(1_000_000, None).price_param().as_deref(),
            Some("1000000:*")
        );
    }

    #[test]
    fn contains_is_inclusive_at_both_bounds() {
        let band = SubRange::bounded(5_000, 10_000);
        assert!(band.contains(5_000));
        assert!(band.contains(10_000));
        assert!(!band.contains(4_999));
        assert!(SubRange::new(5_000, None).contains(u64::MAX));
    }

    #[test]
    fn full_domain_uses_breakpoint_table() {
        let splitter = RangeSplitter::default();
        let bands = splitter.propose(&SubRange::full(), 929, 360);
        assert_eq!(bands.len(), DEFAULT_PRICE_BREAKS.len());
        assert_eq!(bands[0], SubRange::bounded(0, 5_000));
        assert_eq!(bands[1], SubRange::bounded(5_000, 10_000));
        assert_eq!(bands.last(), Some(&SubRange::new(1_000_000, None)));
        assert_covers(&bands, &SubRange::full());
    }

    #[test]
    fn custom_breaks_always_start_at_zero() {
        let splitter = RangeSplitter::with_breaks(vec![20_000, 10_000, 10_000]);
        let bands = splitter.propose(&SubRange::full(), 1_000, 360);
        assert_eq!(
            bands,
            vec![
                SubRange::bounded(0, 10_000),
                SubRange::bounded(10_000, 20_000),
                SubRange::new(20_000, None),
            ]
        );
    }

    #[test]
    fn bounded_range_splits_into_equal_width_bands() {
        let splitter = RangeSplitter::default();
        let range = SubRange::bounded(5_000, 10_000);
        // 1000 / (0.7 * 360) = 3.97 → 4 bands
        let bands = splitter.propose(&range, 1_000, 360);
        assert_eq!(bands.len(), 4);
        assert_eq!(bands[0], SubRange::bounded(5_000, 6_250));
        assert_eq!(bands[3], SubRange::bounded(8_750, 10_000));
        assert_covers(&bands, &range);
    }

    #[test]
    fn barely_overflowing_range_still_splits_in_two() {
        let splitter = RangeSplitter::default();
        let bands = splitter.propose(&SubRange::bounded(0, 100), 361, 360);
        assert_eq!(
            bands,
            vec![SubRange::bounded(0, 50), SubRange::bounded(50, 100)]
        );
    }

    #[test]
    fn narrow_range_bands_are_at_least_one_dollar_wide() {
        let splitter = RangeSplitter::default();
        let range = SubRange::bounded(7_000, 7_003);
        let bands = splitter.propose(&range, 10_000, 360);
        assert_eq!(bands.len(), 3);
        assert!(bands.iter().all(|b| b.upper.unwrap() - b.lower >= 1));
        assert_covers(&bands, &range);
    }

    #[test]
    fn single_price_range_is_returned_unchanged() {
        let splitter = RangeSplitter::default();
        let range = SubRange::bounded(7_000, 7_000);
        assert_eq!(splitter.propose(&range, 5_000, 360), vec![range]);
    }

    #[test]
    fn unbounded_tail_splits_geometrically() {
        let splitter = RangeSplitter::default();
        let range = SubRange::new(1_000_000, None);
        // 700 / 252 = 2.78 → 3 bands
        let bands = splitter.propose(&range, 700, 360);
        assert_eq!(
            bands,
            vec![
                SubRange::bounded(1_000_000, 2_000_000),
                SubRange::bounded(2_000_000, 4_000_000),
                SubRange::new(4_000_000, None),
            ]
        );
    }

    #[test]
    fn zero_expected_volume_keeps_the_range() {
        let splitter = RangeSplitter::default();
        assert_eq!(
            splitter.propose(&SubRange::full(), 0, 360),
            vec![SubRange::full()]
        );
    }
}
