//! Native structural backend: every stage implemented in this crate.
//!
//! Each stage keeps a committed state fed only with confirmed input from the
//! stage below. The unconfirmed tail is recomputed per call from a copy of that
//! state, so feeding bars one at a time ends in the same structure as feeding
//! them all at once.
//!
//! Stage arrays that an append leaves untouched are shared with the previous
//! snapshot instead of being copied again.

use std::sync::Arc;

use super::fractal::{Fractal, FractalDetector};
use super::line::LineKind;
use super::merge::BarMerger;
use super::pivot::{PivotZone, PivotZoneBuilder, ZoneRules};
use super::segment::SegmentBuilder;
use super::snapshot::StructureSnapshot;
use super::stroke::StrokeBuilder;
use crate::{Bar, ChanConfig, ChanError, Result, StructureBackend};

/// Backend computing the structure natively.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeBackend;

/// Per-pipeline stage state of [`NativeBackend`].
#[derive(Debug, Clone)]
pub struct NativeState {
    merger: BarMerger,
    fractals: FractalDetector,
    strokes: StrokeBuilder,
    segments: SegmentBuilder,
    stroke_zones: Vec<PivotZone>,
    segment_zones: Vec<PivotZone>,
    published: Option<Published>,
}

/// What the last snapshot was built from.
#[derive(Debug, Clone)]
struct Published {
    snapshot: StructureSnapshot,
    fractal_tail: Vec<Fractal>,
    strokes_fed: usize,
}

impl NativeState {
    pub fn new(config: &ChanConfig) -> Self {
        Self {
            merger: BarMerger::new(),
            fractals: FractalDetector::new(config.fractal_confirmation_lag),
            strokes: StrokeBuilder::new(config.min_stroke_gap),
            segments: SegmentBuilder::new(),
            stroke_zones: Vec::new(),
            segment_zones: Vec::new(),
            published: None,
        }
    }
}

impl StructureBackend for NativeBackend {
    type State = NativeState;

    fn name(&self) -> &'static str {
        "native"
    }

    fn init_state(&self, config: &ChanConfig) -> NativeState {
        NativeState::new(config)
    }

    fn advance(
        &self,
        state: &mut NativeState,
        bars: &[Bar],
        new_from: usize,
        config: &ChanConfig,
    ) -> Result<StructureSnapshot> {
        for bar in bars.get(new_from..).unwrap_or(&[]) {
            state.merger.push(bar);
        }
        let merged = state.merger.merged();

        let confirmed_before = state.fractals.confirmed().len();
        let first_changed = state.fractals.advance(merged);
        if first_changed < state.strokes.fed() {
            return Err(ChanError::InvariantViolation {
                stage: "fractal",
                index: first_changed,
                detail: "confirmed fractal revised after strokes consumed it".into(),
            });
        }
        let confirmed_changed =
            first_changed < confirmed_before || state.fractals.confirmed().len() != confirmed_before;

        let fractal_tail = state.fractals.pending_tail(merged);
        let fractals = match &state.published {
            Some(p) if !confirmed_changed && p.fractal_tail == fractal_tail => Arc::clone(&p.snapshot.fractals),
            _ => state.fractals.with_pending(merged).into(),
        };

        state.strokes.feed(state.fractals.confirmed(), merged);
        let snapshot = match &state.published {
            Some(p) if p.strokes_fed == state.strokes.fed() => StructureSnapshot {
                bars: Arc::from(bars),
                merged_bars: Arc::from(merged),
                fractals,
                ..p.snapshot.clone()
            },
            _ => {
                let strokes = state.strokes.strokes();
                state.segments.feed(strokes, state.strokes.frozen_len());
                let segments = state.segments.project(strokes);

                let rules = ZoneRules::from_config(config);
                let stroke_zones =
                    PivotZoneBuilder::new(LineKind::Stroke, rules).build(strokes, &state.stroke_zones);
                let segment_zones =
                    PivotZoneBuilder::new(LineKind::Segment, rules).build(&segments, &state.segment_zones);
                state.stroke_zones.clone_from(&stroke_zones);
                state.segment_zones.clone_from(&segment_zones);

                StructureSnapshot {
                    bars: Arc::from(bars),
                    merged_bars: Arc::from(merged),
                    fractals,
                    strokes: Arc::from(strokes),
                    segments: segments.into(),
                    stroke_zones: stroke_zones.into(),
                    segment_zones: segment_zones.into(),
                }
            },
        };

        state.published = Some(Published {
            snapshot: snapshot.clone(),
            fractal_tail,
            strokes_fed: state.strokes.fed(),
        });
        Ok(snapshot)
    }
}

/// Run the native pipeline over a complete bar series in one pass.
///
/// Bar indices are reassigned to their positions.
pub fn analyze(bars: &[Bar], config: &ChanConfig) -> Result<StructureSnapshot> {
    let bars: Vec<Bar> = bars
        .iter()
        .enumerate()
        .map(|(index, bar)| Bar { index, ..*bar })
        .collect();
    let mut state = NativeState::new(config);
    let snapshot = NativeBackend.advance(&mut state, &bars, 0, config)?;
    snapshot.verify(config)?;
    Ok(snapshot)
}
