//! Range helpers shared across the structure builders.
//!
//! All ranges are closed intervals given as `(low, high)`.

/// Two closed ranges share at least one price.
#[inline]
pub fn ranges_overlap(a_low: f64, a_high: f64, b_low: f64, b_high: f64) -> bool {
    a_low <= b_high && b_low <= a_high
}

/// One range contains the other ("inclusion").
#[inline]
pub fn is_inclusion(a_low: f64, a_high: f64, b_low: f64, b_high: f64) -> bool {
    (a_high >= b_high && a_low <= b_low) || (b_high >= a_high && b_low <= a_low)
}

/// Common core `(zd, zg)` of a group of ranges: `(max(lows), min(highs))`.
///
/// Returns `None` for an empty group or when the core is empty or a single
/// price (`zd >= zg`).
pub fn common_core<I>(ranges: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut iter = ranges.into_iter();
    let (first_low, first_high) = iter.next()?;
    let (zd, zg) = iter.fold((first_low, first_high), |(zd, zg), (low, high)| {
        (zd.max(low), zg.min(high))
    });
    (zd < zg).then_some((zd, zg))
}

/// Outer envelope `(dd, gg)` of a group of ranges: `(min(lows), max(highs))`.
pub fn envelope<I>(ranges: I) -> Option<(f64, f64)>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    ranges.into_iter().fold(None, |acc, (low, high)| match acc {
        None => Some((low, high)),
        Some((dd, gg)) => Some((f64::min(dd, low), f64::max(gg, high))),
    })
}
