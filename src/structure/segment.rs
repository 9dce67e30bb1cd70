//! Segment construction from strokes.
//!
//! A segment starts where three consecutive strokes make a higher high and a
//! higher low (rising) or a lower low and a lower high (falling). Its peak is
//! the stroke reaching furthest in the segment's direction.
//!
//! While fewer than three strokes separate the start from the peak the segment
//! is provisional: a stroke ending beyond the segment's origin either resumes
//! the previous segment or, if there is none, abandons the start. Once
//! established the segment closes at its peak when
//!
//! - the first opposing stroke after the peak ends beyond the segment's origin, or
//! - that first opposing stroke leaves a gap: its whole range lies past the
//!   opposing stroke before the peak, or
//! - a later opposing stroke (`peak + 3`, `peak + 5`, ...) ends beyond where
//!   that first opposing stroke ended.
//!
//! The next segment then starts right after the peak in the opposite direction.

use tracing::trace;

use super::line::Line;
use crate::Direction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Forming {
    start: usize,
    direction: Direction,
    peak: usize,
}

impl Forming {
    #[inline]
    fn established(&self) -> bool {
        self.peak >= self.start + 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Verdict {
    Hold,
    Close,
    Resume,
    Abandon,
}

/// Streaming segment builder over a stroke sequence.
///
/// [`feed`](Self::feed) consumes strokes up to a bound and never looks past the
/// stroke being processed, so feeding confirmed strokes only yields a state that
/// later strokes can change only by resuming the last closed segment.
#[derive(Debug, Clone, Default)]
pub struct SegmentBuilder {
    closed: Vec<Line>,
    current: Option<Forming>,
    seek: usize,
    fed: usize,
}

impl SegmentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Segments over a complete stroke sequence, confirmed flags included.
    pub fn build(strokes: &[Line]) -> Vec<Line> {
        let upto = strokes.iter().take_while(|s| s.confirmed).count();
        let mut committed = Self::new();
        committed.feed(strokes, upto);
        committed.project(strokes)
    }

    /// Consume strokes `fed..upto`.
    pub fn feed(&mut self, strokes: &[Line], upto: usize) {
        let upto = upto.min(strokes.len());
        while self.fed < upto {
            self.on_stroke(strokes, self.fed);
            self.fed += 1;
        }
    }

    /// Number of strokes consumed.
    #[inline]
    pub fn fed(&self) -> usize {
        self.fed
    }

    /// Segments that no later stroke can change.
    ///
    /// A provisional forming segment may still resume the last closed one.
    pub fn confirmed_len(&self) -> usize {
        match self.current {
            Some(cur) if !cur.established() => self.closed.len().saturating_sub(1),
            _ => self.closed.len(),
        }
    }

    /// Feed a copy of this builder with every remaining stroke and emit its
    /// segments; segments below this builder's confirmed count are flagged
    /// confirmed.
    pub fn project(&self, strokes: &[Line]) -> Vec<Line> {
        let base = self.confirmed_len();
        let mut pending = self.clone();
        pending.feed(strokes, strokes.len());
        pending.emit(strokes, base)
    }

    fn emit(&self, strokes: &[Line], base: usize) -> Vec<Line> {
        let mut out = self.closed.clone();
        for (i, seg) in out.iter_mut().enumerate() {
            seg.confirmed = i < base;
        }
        if let Some(cur) = self.current {
            if let Some(seg) = strokes
                .get(cur.start..=cur.peak)
                .and_then(|run| Line::segment(out.len(), run))
            {
                out.push(seg);
            }
        }
        out
    }

    fn on_stroke(&mut self, strokes: &[Line], k: usize) {
        loop {
            let Some(mut cur) = self.current else {
                if !self.try_start(strokes, k) {
                    return;
                }
                continue;
            };
            cur.peak = peak_of(strokes, cur.start, k, cur.direction);
            self.current = Some(cur);

            match self.judge(strokes, cur, k) {
                Verdict::Hold => return,
                Verdict::Close => {
                    if let Some(seg) = Line::segment(self.closed.len(), &strokes[cur.start..=cur.peak]) {
                        trace!(segment = seg.index, start = cur.start, end = cur.peak, "segment closed");
                        self.closed.push(seg);
                    }
                    let start = cur.peak + 1;
                    self.current = Some(Forming {
                        start,
                        direction: cur.direction.opposite(),
                        peak: start,
                    });
                },
                Verdict::Resume => {
                    let Some(prev) = self.closed.pop() else {
                        self.current = None;
                        return;
                    };
                    trace!(segment = prev.index, stroke = k, "segment resumed");
                    self.current = Some(Forming {
                        start: prev.span_start,
                        direction: prev.direction,
                        peak: prev.span_end,
                    });
                },
                Verdict::Abandon => {
                    trace!(start = cur.start, stroke = k, "segment start abandoned");
                    self.current = None;
                    self.seek = cur.start + 1;
                },
            }
        }
    }

    fn try_start(&mut self, strokes: &[Line], k: usize) -> bool {
        while self.seek + 2 <= k {
            let a = self.seek;
            if starts_segment(&strokes[a], &strokes[a + 1], &strokes[a + 2]) {
                self.current = Some(Forming {
                    start: a,
                    direction: strokes[a].direction,
                    peak: a,
                });
                return true;
            }
            self.seek += 1;
        }
        false
    }

    fn judge(&self, strokes: &[Line], cur: Forming, k: usize) -> Verdict {
        let d = cur.direction;
        let origin = strokes[cur.start].start_value;

        if !cur.established() {
            let broken = strokes[cur.start..=k].iter().any(|s| d.beyond(origin, s.end_value));
            return match (broken, self.closed.is_empty()) {
                (false, _) => Verdict::Hold,
                (true, true) => Verdict::Abandon,
                (true, false) => Verdict::Resume,
            };
        }

        let Some(first_back) = strokes.get(cur.peak + 1).filter(|_| cur.peak < k) else {
            return Verdict::Hold;
        };
        if d.beyond(origin, first_back.end_value) || leaves_gap(&strokes[cur.peak - 1], first_back, d) {
            return Verdict::Close;
        }
        let pullback = first_back.end_value;
        let broken = (cur.peak + 3..=k)
            .step_by(2)
            .any(|j| d.beyond(pullback, strokes[j].end_value));
        if broken {
            Verdict::Close
        } else {
            Verdict::Hold
        }
    }
}

/// Three strokes open a segment in the first stroke's direction.
fn starts_segment(a: &Line, b: &Line, c: &Line) -> bool {
    match a.direction {
        Direction::Up => c.high > a.high && b.low > a.low,
        Direction::Down => c.low < a.low && b.high < a.high,
    }
}

/// `back` lies wholly past the earlier opposing stroke `before` in direction `d`.
fn leaves_gap(before: &Line, back: &Line, d: Direction) -> bool {
    match d {
        Direction::Up => back.low > before.high,
        Direction::Down => back.high < before.low,
    }
}

/// Furthest-reaching stroke in direction `d` within `start..=upto`; ties keep
/// the earliest.
fn peak_of(strokes: &[Line], start: usize, upto: usize, d: Direction) -> usize {
    let mut peak = start;
    for j in (start..=upto).filter(|&j| strokes[j].direction == d) {
        if d.beyond(strokes[j].extreme(), strokes[peak].extreme()) {
            peak = j;
        }
    }
    peak
}
