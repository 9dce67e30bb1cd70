//! Directional lines: strokes and segments share one representation.

use serde::{Deserialize, Serialize};

use super::fractal::{Fractal, FractalKind};
use super::helpers::ranges_overlap;
use crate::Direction;

/// Concrete kind of a [`Line`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LineKind {
    /// Connects two alternating fractals.
    Stroke,
    /// Groups a run of strokes.
    Segment,
}

/// A stroke or a segment.
///
/// `start` and `end` index the fractal sequence. `span_start..=span_end`
/// covers the lower-level units the line is built from: merged bar positions
/// for strokes, stroke indices for segments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub kind: LineKind,
    pub index: usize,
    pub direction: Direction,
    pub start: usize,
    pub end: usize,
    pub start_value: f64,
    pub end_value: f64,
    pub high: f64,
    pub low: f64,
    /// Source bar of the start extreme.
    pub start_bar: usize,
    /// Source bar of the end extreme.
    pub end_bar: usize,
    pub span_start: usize,
    pub span_end: usize,
    pub confirmed: bool,
}

impl Line {
    /// Stroke between two opposite-kind fractals.
    pub(crate) fn stroke(index: usize, from: &Fractal, to: &Fractal) -> Self {
        let direction = match from.kind {
            FractalKind::Bottom => Direction::Up,
            FractalKind::Top => Direction::Down,
        };
        Self {
            kind: LineKind::Stroke,
            index,
            direction,
            start: from.index,
            end: to.index,
            start_value: from.value,
            end_value: to.value,
            high: from.value.max(to.value),
            low: from.value.min(to.value),
            start_bar: from.bar,
            end_bar: to.bar,
            span_start: from.center,
            span_end: to.center,
            confirmed: false,
        }
    }

    /// Segment over `strokes` (a contiguous run, first to last).
    pub(crate) fn segment(index: usize, strokes: &[Line]) -> Option<Self> {
        let first = strokes.first()?;
        let last = strokes.last()?;
        let high = strokes.iter().map(|s| s.high).fold(f64::NEG_INFINITY, f64::max);
        let low = strokes.iter().map(|s| s.low).fold(f64::INFINITY, f64::min);
        Some(Self {
            kind: LineKind::Segment,
            index,
            direction: first.direction,
            start: first.start,
            end: last.end,
            start_value: first.start_value,
            end_value: last.end_value,
            high,
            low,
            start_bar: first.start_bar,
            end_bar: last.end_bar,
            span_start: first.index,
            span_end: last.index,
            confirmed: false,
        })
    }

    #[inline]
    pub fn is_up(&self) -> bool {
        self.direction.is_up()
    }

    #[inline]
    pub fn is_down(&self) -> bool {
        self.direction.is_down()
    }

    /// Price range shares at least one point with `[low, high]`.
    #[inline]
    pub fn overlaps(&self, low: f64, high: f64) -> bool {
        ranges_overlap(self.low, self.high, low, high)
    }

    /// End point lies inside `[low, high]`.
    #[inline]
    pub fn ends_within(&self, low: f64, high: f64) -> bool {
        self.end_value >= low && self.end_value <= high
    }

    /// Price extreme in the line's own direction.
    #[inline]
    pub fn extreme(&self) -> f64 {
        match self.direction {
            Direction::Up => self.high,
            Direction::Down => self.low,
        }
    }

    /// Number of lower-level units spanned.
    #[inline]
    pub fn span_len(&self) -> usize {
        self.span_end - self.span_start + 1
    }
}
