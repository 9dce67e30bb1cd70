//! Stroke construction from confirmed fractals.
//!
//! The builder walks fractals in order through three phases:
//!
//! - **seeking start**: no fractal seen yet;
//! - **seeking end**: a start fractal is held (and replaced by any more
//!   extreme fractal of the same kind) until an opposite fractal far enough
//!   away completes the first stroke;
//! - **extending**: the last stroke's end moves to any more extreme fractal of
//!   its kind, and an opposite fractal far enough away emits the next stroke.
//!
//! An opposite fractal that comes too early but beats the last stroke's start
//! eliminates that stroke: the stroke is dropped and the one before it is
//! extended to the new extreme. Only pending strokes are ever touched; the last
//! two strokes are pending, everything before them is confirmed.

use tracing::trace;

use super::fractal::{Fractal, FractalKind};
use super::line::Line;
use super::merge::MergedBar;
use crate::Period;

/// Phase of the stroke state machine.
#[derive(Debug, Clone, PartialEq)]
enum StrokePhase {
    SeekingStart,
    SeekingEnd(Fractal),
    Extending,
}

/// Streaming stroke builder. Feed confirmed fractals with [`feed`](Self::feed).
#[derive(Debug, Clone)]
pub struct StrokeBuilder {
    min_gap: usize,
    phase: StrokePhase,
    strokes: Vec<Line>,
    frozen: usize,
    fed: usize,
}

impl StrokeBuilder {
    pub fn new(min_gap: Period) -> Self {
        Self {
            min_gap: min_gap.get(),
            phase: StrokePhase::SeekingStart,
            strokes: Vec::new(),
            frozen: 0,
            fed: 0,
        }
    }

    /// Build strokes over a complete fractal sequence.
    pub fn build(fractals: &[Fractal], merged: &[MergedBar], min_gap: Period) -> Vec<Line> {
        let mut builder = Self::new(min_gap);
        builder.feed(fractals, merged);
        builder.strokes
    }

    /// Consume every fractal not fed yet.
    ///
    /// `fractals` must extend the sequence given on previous calls.
    pub fn feed(&mut self, fractals: &[Fractal], merged: &[MergedBar]) {
        while self.fed < fractals.len() {
            self.on_fractal(&fractals[self.fed], fractals, merged);
            self.fed += 1;
        }
    }

    /// Strokes so far; the last two are pending.
    #[inline]
    pub fn strokes(&self) -> &[Line] {
        &self.strokes
    }

    /// Number of confirmed (immutable) strokes.
    #[inline]
    pub fn frozen_len(&self) -> usize {
        self.frozen
    }

    /// Number of fractals consumed.
    #[inline]
    pub fn fed(&self) -> usize {
        self.fed
    }

    fn on_fractal(&mut self, f: &Fractal, fractals: &[Fractal], merged: &[MergedBar]) {
        let Some(last) = self.strokes.last() else {
            self.seek(f, merged);
            return;
        };

        let start = &fractals[last.start];
        let end = &fractals[last.end];

        if f.kind == end.kind {
            if f.dominates(end) && self.path_clear(start, f, merged) {
                trace!(stroke = last.index, from = end.center, to = f.center, "stroke extended");
                let index = last.index;
                self.strokes[index] = Line::stroke(index, start, f);
            }
        } else if self.connects(end, f, merged) {
            let stroke = Line::stroke(self.strokes.len(), end, f);
            trace!(stroke = stroke.index, start = end.center, end = f.center, "stroke emitted");
            self.strokes.push(stroke);
            self.refreeze();
        } else if f.center < end.center + self.min_gap && f.dominates(start) {
            self.eliminate(f, fractals, merged);
        }
    }

    fn seek(&mut self, f: &Fractal, merged: &[MergedBar]) {
        match &self.phase {
            StrokePhase::SeekingEnd(start) if start.kind == f.kind => {
                if f.dominates(start) {
                    self.phase = StrokePhase::SeekingEnd(f.clone());
                }
            },
            StrokePhase::SeekingEnd(start) => {
                if self.connects(start, f, merged) {
                    self.strokes.push(Line::stroke(0, start, f));
                    self.phase = StrokePhase::Extending;
                    self.refreeze();
                }
            },
            StrokePhase::SeekingStart | StrokePhase::Extending => {
                self.phase = StrokePhase::SeekingEnd(f.clone());
            },
        }
    }

    /// Drop the last stroke and carry the one before it to `f`.
    fn eliminate(&mut self, f: &Fractal, fractals: &[Fractal], merged: &[MergedBar]) {
        let len = self.strokes.len();
        if len == 1 {
            trace!(center = f.center, "first stroke eliminated");
            self.strokes.clear();
            self.phase = StrokePhase::SeekingEnd(f.clone());
            return;
        }

        let prev_index = len - 2;
        if prev_index < self.frozen {
            return;
        }
        let prev_start = &fractals[self.strokes[prev_index].start];
        if !self.path_clear(prev_start, f, merged) {
            return;
        }
        trace!(stroke = prev_index, center = f.center, "stroke eliminated, previous extended");
        let extended = Line::stroke(prev_index, prev_start, f);
        self.strokes.pop();
        self.strokes[prev_index] = extended;
    }

    /// `from` and `to` may form a stroke.
    fn connects(&self, from: &Fractal, to: &Fractal, merged: &[MergedBar]) -> bool {
        if to.kind != from.kind.opposite() || to.center < from.center + self.min_gap {
            return false;
        }
        let ordered = match from.kind {
            FractalKind::Top => from.value > to.value,
            FractalKind::Bottom => from.value < to.value,
        };
        ordered && self.path_clear(from, to, merged)
    }

    /// The two fractals are the extremes of the merged bars between them.
    fn path_clear(&self, a: &Fractal, b: &Fractal, merged: &[MergedBar]) -> bool {
        let (lo, hi) = (a.center.min(b.center), a.center.max(b.center));
        let Some(window) = merged.get(lo..=hi) else {
            return false;
        };
        let (top, bottom) = match (a.kind, b.kind) {
            (FractalKind::Top, FractalKind::Bottom) => (a.value, b.value),
            (FractalKind::Bottom, FractalKind::Top) => (b.value, a.value),
            // same kind: only the far side is bounded
            (FractalKind::Top, FractalKind::Top) => (a.value.max(b.value), f64::NEG_INFINITY),
            (FractalKind::Bottom, FractalKind::Bottom) => (f64::INFINITY, a.value.min(b.value)),
        };
        window.iter().all(|m| m.high <= top && m.low >= bottom)
    }

    fn refreeze(&mut self) {
        let frozen = self.frozen.max(self.strokes.len().saturating_sub(2));
        for stroke in &mut self.strokes[self.frozen..frozen] {
            stroke.confirmed = true;
        }
        self.frozen = frozen;
    }
}
