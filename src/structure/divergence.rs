//! Divergence ("beichi") between lines and pivot zones.
//!
//! Momentum is measured as the area under the MACD histogram: the sum of
//! `|hist|` over the source bars a line spans. A line diverges from its
//! reference when it reaches at least as far in price while its area is
//! strictly smaller.

use serde::{Deserialize, Serialize};

use super::line::Line;
use super::pivot::{zss_is_qs, PivotZone, ZoneRelation};
use crate::Direction;

/// One MACD reading, aligned to a source bar.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MacdPoint {
    pub dif: f64,
    pub dea: f64,
    pub hist: f64,
}

/// MACD readings indexed by source bar.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MomentumSeries {
    points: Vec<MacdPoint>,
}

impl MomentumSeries {
    pub fn new(points: Vec<MacdPoint>) -> Self {
        Self { points }
    }

    /// Series with only the histogram populated.
    pub fn from_hist(hist: &[f64]) -> Self {
        Self {
            points: hist
                .iter()
                .map(|&hist| MacdPoint {
                    hist,
                    ..MacdPoint::default()
                })
                .collect(),
        }
    }

    #[inline]
    pub fn get(&self, bar: usize) -> Option<&MacdPoint> {
        self.points.get(bar)
    }

    #[inline]
    pub fn points(&self) -> &[MacdPoint] {
        &self.points
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Sum of `|hist|` over bars `from..=to` (either order). Bars past the end
    /// of the series count as zero.
    pub fn area(&self, from: usize, to: usize) -> f64 {
        let (lo, hi) = (from.min(to), from.max(to));
        self.points
            .iter()
            .skip(lo)
            .take(hi - lo + 1)
            .map(|p| p.hist.abs())
            .sum()
    }

    /// Area under `line`.
    #[inline]
    pub fn line_area(&self, line: &Line) -> f64 {
        self.area(line.start_bar, line.end_bar)
    }
}

/// `line` reaches at least as far as `reference` with strictly less area.
fn weakens(reference: &Line, line: &Line, momentum: &MomentumSeries) -> bool {
    let reaches = match line.direction {
        Direction::Up => line.high >= reference.high,
        Direction::Down => line.low <= reference.low,
    };
    reaches && momentum.line_area(line) < momentum.line_area(reference)
}

/// Consolidation divergence of `line` leaving `zone`, against the line that entered it.
///
/// `lines` is the sequence the zone was built from.
pub fn beichi_pz(
    zone: &PivotZone,
    line: &Line,
    lines: &[Line],
    momentum: &MomentumSeries,
) -> (bool, Option<Line>) {
    if line.kind != zone.kind || line.direction != zone.direction || line.index < zone.last_line {
        return (false, None);
    }
    match zone.entering(lines) {
        Some(reference) if reference.direction == line.direction && weakens(reference, line, momentum) => {
            (true, Some(reference.clone()))
        },
        _ => (false, None),
    }
}

/// Trend divergence: the last two zones of `now_line`'s kind step in its
/// direction and `now_line` is weaker than the line that led into the last zone.
///
/// On divergence returns `[reference, now_line]`.
pub fn beichi_qs(
    lines: &[Line],
    zones: &[PivotZone],
    now_line: &Line,
    momentum: &MomentumSeries,
) -> (bool, Vec<Line>) {
    let same: Vec<&PivotZone> = zones.iter().filter(|z| z.kind == now_line.kind).collect();
    let [.., prev, last] = same.as_slice() else {
        return (false, Vec::new());
    };
    if zss_is_qs(prev, last) != Some(ZoneRelation::Trend(now_line.direction)) {
        return (false, Vec::new());
    }
    if now_line.index <= last.first_line {
        return (false, Vec::new());
    }
    match last.entering(lines) {
        Some(reference) if reference.direction == now_line.direction && weakens(reference, now_line, momentum) => {
            (true, vec![reference.clone(), now_line.clone()])
        },
        _ => (false, Vec::new()),
    }
}
