//! Top/bottom fractal detection over the merged bar series.
//!
//! A merged bar at position `i` is a top fractal when its high is strictly
//! above both neighbours' highs and its low is not below either neighbour's
//! low; bottoms mirror this on the low side. Fractals must alternate: a
//! same-kind candidate replaces the previous fractal only if it is more
//! extreme, otherwise it is dropped.
//!
//! A candidate centred at `i` is confirmed once `i + 1 + lag <= n - 1`, i.e.
//! its right neighbour is closed and `lag` merged bars follow it.

use serde::{Deserialize, Serialize};

use super::merge::MergedBar;
use crate::Period;

/// Fractal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FractalKind {
    Top,
    Bottom,
}

impl FractalKind {
    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            FractalKind::Top => FractalKind::Bottom,
            FractalKind::Bottom => FractalKind::Top,
        }
    }
}

/// A three-merged-bar turning point.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Fractal {
    /// Position in the fractal sequence.
    pub index: usize,
    pub kind: FractalKind,
    /// Merged bar position of the centre.
    pub center: usize,
    /// Extreme price: the centre's high for tops, its low for bottoms.
    pub value: f64,
    /// Highest high across the three merged bars.
    pub high: f64,
    /// Lowest low across the three merged bars.
    pub low: f64,
    /// Source bar carrying `value`.
    pub bar: usize,
    pub confirmed: bool,
}

impl Fractal {
    /// Merged bar positions `(left, centre, right)`.
    #[inline]
    pub fn neighbors(&self) -> (usize, usize, usize) {
        (self.center - 1, self.center, self.center + 1)
    }

    /// Same kind and strictly further out than `other`.
    #[inline]
    pub fn dominates(&self, other: &Fractal) -> bool {
        self.kind == other.kind
            && match self.kind {
                FractalKind::Top => self.value > other.value,
                FractalKind::Bottom => self.value < other.value,
            }
    }
}

/// Classify the merged bar at `center` against its two neighbours.
pub fn classify(merged: &[MergedBar], center: usize) -> Option<FractalKind> {
    if center == 0 {
        return None;
    }
    let left = merged.get(center - 1)?;
    let mid = merged.get(center)?;
    let right = merged.get(center + 1)?;

    if mid.high > left.high && mid.high > right.high && mid.low >= left.low && mid.low >= right.low {
        Some(FractalKind::Top)
    } else if mid.low < left.low && mid.low < right.low && mid.high <= left.high && mid.high <= right.high
    {
        Some(FractalKind::Bottom)
    } else {
        None
    }
}

fn candidate(merged: &[MergedBar], center: usize, confirmed: bool) -> Option<Fractal> {
    let kind = classify(merged, center)?;
    let window = &merged[center - 1..=center + 1];
    let mid = &merged[center];
    let high = window.iter().map(|m| m.high).fold(f64::NEG_INFINITY, f64::max);
    let low = window.iter().map(|m| m.low).fold(f64::INFINITY, f64::min);
    let (value, bar) = match kind {
        FractalKind::Top => (mid.high, mid.peak_bar),
        FractalKind::Bottom => (mid.low, mid.trough_bar),
    };
    Some(Fractal {
        index: 0,
        kind,
        center,
        value,
        high,
        low,
        bar,
        confirmed,
    })
}

/// Append a candidate under the alternation rule.
///
/// Returns the position of the first fractal that changed, if any did.
fn accept(fractals: &mut Vec<Fractal>, mut fractal: Fractal) -> Option<usize> {
    match fractals.last_mut() {
        Some(last) if last.kind == fractal.kind => {
            if !fractal.dominates(last) {
                return None;
            }
            fractal.index = last.index;
            *last = fractal;
            Some(last.index)
        },
        _ => {
            fractal.index = fractals.len();
            fractals.push(fractal);
            Some(fractals.len() - 1)
        },
    }
}

/// Streaming fractal detector.
///
/// Holds the confirmed fractals; the unconfirmed tail is recomputed on demand
/// by [`with_pending`](Self::with_pending).
#[derive(Debug, Clone)]
pub struct FractalDetector {
    lag: usize,
    fractals: Vec<Fractal>,
    next_center: usize,
}

impl FractalDetector {
    pub fn new(confirmation_lag: Period) -> Self {
        Self {
            lag: confirmation_lag.get(),
            fractals: Vec::new(),
            next_center: 1,
        }
    }

    /// Detect over a complete merged series (confirmed and pending).
    pub fn detect_all(merged: &[MergedBar], confirmation_lag: Period) -> Vec<Fractal> {
        let mut detector = Self::new(confirmation_lag);
        detector.advance(merged);
        detector.with_pending(merged)
    }

    /// Last centre that is confirmed for a merged series of length `len`.
    fn confirmed_bound(&self, len: usize) -> Option<usize> {
        len.checked_sub(2 + self.lag)
    }

    /// Commit every newly confirmed candidate.
    ///
    /// Returns the position of the first confirmed fractal that changed
    /// (equal to the previous confirmed count when only appends happened).
    pub fn advance(&mut self, merged: &[MergedBar]) -> usize {
        let mut first_changed = self.fractals.len();
        let Some(bound) = self.confirmed_bound(merged.len()) else {
            return first_changed;
        };
        while self.next_center <= bound {
            if let Some(f) = candidate(merged, self.next_center, true) {
                if let Some(changed) = accept(&mut self.fractals, f) {
                    first_changed = first_changed.min(changed);
                }
            }
            self.next_center += 1;
        }
        first_changed
    }

    /// Confirmed fractals.
    #[inline]
    pub fn confirmed(&self) -> &[Fractal] {
        &self.fractals
    }

    /// Confirmed fractals followed by the unconfirmed candidates at the tail.
    pub fn with_pending(&self, merged: &[MergedBar]) -> Vec<Fractal> {
        let keep = self.fractals.len().saturating_sub(1);
        let mut out = self.fractals[..keep].to_vec();
        out.extend(self.pending_tail(merged));
        out
    }

    /// The last confirmed fractal, or the candidate replacing it, followed by
    /// the unconfirmed candidates.
    ///
    /// Indices continue the confirmed sequence.
    pub fn pending_tail(&self, merged: &[MergedBar]) -> Vec<Fractal> {
        let mut tail: Vec<Fractal> = self.fractals.last().cloned().into_iter().collect();
        let last_center = merged.len().saturating_sub(2);
        for center in self.next_center..=last_center {
            if let Some(f) = candidate(merged, center, false) {
                accept(&mut tail, f);
            }
        }
        let base = self.fractals.len().saturating_sub(1);
        for (i, f) in tail.iter_mut().enumerate() {
            f.index = base + i;
        }
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::merge::BarMerger;
    use crate::Bar;

    fn series(points: &[(f64, f64)]) -> Vec<MergedBar> {
        let bars: Vec<Bar> = points
            .iter()
            .enumerate()
            .map(|(i, &(low, high))| {
                let mut b = Bar::new(i as i64, low, high, low, high, 1.0);
                b.index = i;
                b
            })
            .collect();
        BarMerger::merge_all(&bars)
    }

    fn lag(n: usize) -> Period {
        Period::new(n).unwrap()
    }

    #[test]
    fn test_too_short_series_has_no_fractals() {
        let merged = series(&[(10.0, 11.0), (11.0, 12.0)]);
        assert!(FractalDetector::detect_all(&merged, lag(1)).is_empty());
    }

    #[test]
    fn test_monotonic_series_has_no_fractals() {
        let points: Vec<(f64, f64)> = (0..10).map(|i| (10.0 + i as f64, 11.0 + i as f64)).collect();
        let merged = series(&points);
        assert!(FractalDetector::detect_all(&merged, lag(1)).is_empty());
    }

    #[test]
    fn test_top_and_bottom_alternate() {
        let merged = series(&[
            (10.0, 11.0),
            (11.0, 12.0),
            (12.0, 13.0),
            (11.0, 12.5),
            (10.0, 11.5),
            (11.0, 12.2),
            (12.0, 13.5),
        ]);
        let fractals = FractalDetector::detect_all(&merged, lag(1));
        assert_eq!(fractals.len(), 2);
        assert_eq!(fractals[0].kind, FractalKind::Top);
        assert_eq!(fractals[0].center, 2);
        assert_eq!(fractals[0].value, 13.0);
        assert_eq!(fractals[1].kind, FractalKind::Bottom);
        assert_eq!(fractals[1].center, 4);
        assert_eq!(fractals[1].value, 10.0);
        assert_eq!(fractals[1].index, 1);
    }

    #[test]
    fn test_confirmation_needs_lag_bars_past_right_neighbor() {
        let merged = series(&[(10.0, 11.0), (11.0, 12.0), (10.5, 11.5)]);
        let mut detector = FractalDetector::new(lag(1));
        detector.advance(&merged);
        assert!(detector.confirmed().is_empty());
        let all = detector.with_pending(&merged);
        assert_eq!(all.len(), 1);
        assert!(!all[0].confirmed);

        let merged = series(&[(10.0, 11.0), (11.0, 12.0), (10.5, 11.5), (9.5, 10.5)]);
        detector.advance(&merged);
        assert_eq!(detector.confirmed().len(), 1);
        assert!(detector.confirmed()[0].confirmed);
    }

    #[test]
    fn test_accept_keeps_more_extreme_same_kind() {
        let mut fractals = Vec::new();
        let top = |value: f64, center: usize| Fractal {
            index: 0,
            kind: FractalKind::Top,
            center,
            value,
            high: value,
            low: value - 1.0,
            bar: center,
            confirmed: true,
        };
        assert_eq!(accept(&mut fractals, top(10.0, 2)), Some(0));
        assert_eq!(accept(&mut fractals, top(9.0, 5)), None);
        assert_eq!(accept(&mut fractals, top(11.0, 7)), Some(0));
        assert_eq!(fractals.len(), 1);
        assert_eq!(fractals[0].center, 7);
    }

    #[test]
    fn test_neighbors() {
        let merged = series(&[(10.0, 11.0), (11.0, 12.0), (10.5, 11.5)]);
        let f = candidate(&merged, 1, false).unwrap();
        assert_eq!(f.neighbors(), (0, 1, 2));
        assert_eq!(f.high, 12.0);
        assert_eq!(f.low, 10.0);
    }
}
