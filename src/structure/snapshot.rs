//! Immutable view of one pipeline's structure after a recomputation.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::Serialize;

use super::fractal::Fractal;
use super::line::Line;
use super::merge::MergedBar;
use super::pivot::PivotZone;
use crate::{Bar, ChanConfig, ChanError, Result};

/// Every structural level at one point in time.
///
/// Readers share it behind an `Arc`; each field is itself shared so accessors
/// hand out cheap clones.
#[derive(Debug, Clone, Serialize)]
pub struct StructureSnapshot {
    pub bars: Arc<[Bar]>,
    pub merged_bars: Arc<[MergedBar]>,
    pub fractals: Arc<[Fractal]>,
    pub strokes: Arc<[Line]>,
    pub segments: Arc<[Line]>,
    pub stroke_zones: Arc<[PivotZone]>,
    pub segment_zones: Arc<[PivotZone]>,
}

impl Default for StructureSnapshot {
    fn default() -> Self {
        Self {
            bars: Arc::from(Vec::new()),
            merged_bars: Arc::from(Vec::new()),
            fractals: Arc::from(Vec::new()),
            strokes: Arc::from(Vec::new()),
            segments: Arc::from(Vec::new()),
            stroke_zones: Arc::from(Vec::new()),
            segment_zones: Arc::from(Vec::new()),
        }
    }
}

fn violation(stage: &'static str, index: usize, detail: impl Into<String>) -> ChanError {
    ChanError::InvariantViolation {
        stage,
        index,
        detail: detail.into(),
    }
}

impl StructureSnapshot {
    /// Check the structural invariants across all levels.
    ///
    /// The first violation found is returned with the offending index.
    pub fn verify(&self, config: &ChanConfig) -> Result<()> {
        self.verify_merge()?;
        self.verify_fractals()?;
        self.verify_strokes(config.min_stroke_gap.get())?;
        self.verify_segments()?;
        verify_zones("stroke_zone", &self.stroke_zones, &self.strokes)?;
        verify_zones("segment_zone", &self.segment_zones, &self.segments)
    }

    fn verify_merge(&self) -> Result<()> {
        let mut next_bar = 0;
        for (i, m) in self.merged_bars.iter().enumerate() {
            if m.index != i || m.first_bar != next_bar || m.last_bar < m.first_bar {
                return Err(violation("merge", i, "merged bars do not partition the source bars"));
            }
            next_bar = m.last_bar + 1;
        }
        if next_bar != self.bars.len() {
            return Err(violation(
                "merge",
                self.merged_bars.len(),
                format!("merged bars cover {next_bar} of {} bars", self.bars.len()),
            ));
        }
        Ok(())
    }

    fn verify_fractals(&self) -> Result<()> {
        for (i, f) in self.fractals.iter().enumerate() {
            if f.index != i || f.center + 1 >= self.merged_bars.len() {
                return Err(violation("fractal", i, "fractal out of place"));
            }
        }
        for (i, pair) in self.fractals.windows(2).enumerate() {
            if pair[0].kind == pair[1].kind {
                return Err(violation("fractal", i + 1, "adjacent fractals of the same kind"));
            }
            if pair[0].center >= pair[1].center {
                return Err(violation("fractal", i + 1, "fractal centres not increasing"));
            }
        }
        Ok(())
    }

    fn verify_strokes(&self, min_gap: usize) -> Result<()> {
        for (i, s) in self.strokes.iter().enumerate() {
            if s.index != i || s.end >= self.fractals.len() {
                return Err(violation("stroke", i, "stroke out of place"));
            }
            if s.span_end < s.span_start + min_gap {
                return Err(violation(
                    "stroke",
                    i,
                    format!("span {}..={} shorter than {min_gap}", s.span_start, s.span_end),
                ));
            }
        }
        for (i, pair) in self.strokes.windows(2).enumerate() {
            if pair[0].end != pair[1].start {
                return Err(violation("stroke", i + 1, "stroke does not start where the previous ended"));
            }
            if pair[0].direction == pair[1].direction {
                return Err(violation("stroke", i + 1, "adjacent strokes share a direction"));
            }
            if !pair[0].confirmed && pair[1].confirmed {
                return Err(violation("stroke", i + 1, "confirmed stroke after a pending one"));
            }
        }
        Ok(())
    }

    fn verify_segments(&self) -> Result<()> {
        for (i, seg) in self.segments.iter().enumerate() {
            if seg.index != i || seg.span_end >= self.strokes.len() || seg.span_end < seg.span_start {
                return Err(violation("segment", i, "segment out of place"));
            }
        }
        for (i, pair) in self.segments.windows(2).enumerate() {
            if pair[0].span_end + 1 != pair[1].span_start {
                return Err(violation("segment", i + 1, "segments are not contiguous"));
            }
            if pair[0].direction == pair[1].direction {
                return Err(violation("segment", i + 1, "adjacent segments share a direction"));
            }
        }
        Ok(())
    }
}

fn verify_zones(stage: &'static str, zones: &[PivotZone], lines: &[Line]) -> Result<()> {
    for (i, z) in zones.iter().enumerate() {
        if z.zd.partial_cmp(&z.zg) != Some(Ordering::Less) {
            return Err(violation(stage, i, format!("zd {} >= zg {}", z.zd, z.zg)));
        }
        let members = z.members(lines);
        if members.len() < 3 {
            return Err(violation(stage, i, "fewer than three member lines"));
        }
        if let Some(m) = members.iter().find(|m| !m.overlaps(z.zd, z.zg)) {
            return Err(violation(stage, i, format!("line {} misses the core", m.index)));
        }
    }
    for (i, pair) in zones.windows(2).enumerate() {
        if pair[0].last_line >= pair[1].first_line {
            return Err(violation(stage, i + 1, "zones share lines"));
        }
    }
    Ok(())
}
