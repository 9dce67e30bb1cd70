//! Pivot zones: consolidation ranges over runs of overlapping lines.
//!
//! A zone opens on the first three consecutive lines whose ranges share a
//! non-empty core `[zd, zg]` and keeps absorbing the following lines while
//! they still touch that core. It closes on the first line that misses the
//! core, or once it holds `max_lines` members.
//!
//! The line right after a zone's last member leaves the zone; the next scan
//! starts after it, so that line can enter the next zone and zones of one kind
//! never share a line. A zone with no line before it has no entering line.

use serde::Serialize;
use tracing::trace;

use super::helpers::{common_core, envelope};
use super::line::{Line, LineKind};
use crate::{ChanConfig, Direction};

/// A consolidation range.
///
/// Members are the lines `first_line..=last_line` of the sequence the zone was
/// built from; [`members`](Self::members) resolves them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PivotZone {
    pub kind: LineKind,
    pub index: usize,
    /// Direction of the line entering the zone.
    pub direction: Direction,
    /// Fractal where the first member starts.
    pub start: usize,
    /// Fractal where the last member ends.
    pub end: usize,
    pub zg: f64,
    pub zd: f64,
    pub gg: f64,
    pub dd: f64,
    pub first_line: usize,
    pub last_line: usize,
    /// Line that missed the core and closed the zone.
    pub closed_by: Option<usize>,
    /// No later line can join the zone.
    pub done: bool,
    pub confirmed: bool,
    #[serde(skip)]
    decided_at: usize,
}

impl PivotZone {
    /// Member lines resolved against the sequence the zone was built from.
    pub fn members<'a>(&self, lines: &'a [Line]) -> &'a [Line] {
        lines.get(self.first_line..=self.last_line).unwrap_or(&[])
    }

    #[inline]
    pub fn line_count(&self) -> usize {
        self.last_line - self.first_line + 1
    }

    /// The line entering the zone, if any.
    pub fn entering<'a>(&self, lines: &'a [Line]) -> Option<&'a Line> {
        self.first_line.checked_sub(1).and_then(|i| lines.get(i))
    }

    /// Core ranges share a price with `other`'s core.
    #[inline]
    pub fn core_overlaps(&self, other: &PivotZone) -> bool {
        self.zd <= other.zg && other.zd <= self.zg
    }

    /// First line the next scan may use as a member.
    #[inline]
    fn resume_at(&self) -> usize {
        self.last_line + 2
    }
}

/// Zone construction knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneRules {
    pub max_lines: usize,
    pub include_breaking_line: bool,
}

impl ZoneRules {
    pub fn from_config(config: &ChanConfig) -> Self {
        Self {
            max_lines: config.pivot_max_lines.get(),
            include_breaking_line: config.pivot_include_breaking_line,
        }
    }
}

impl Default for ZoneRules {
    fn default() -> Self {
        Self::from_config(&ChanConfig::default())
    }
}

/// How two sequential zones of one kind relate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ZoneRelation {
    /// Cores do not overlap; the later core sits in this direction.
    Trend(Direction),
    /// Cores overlap.
    Oscillation,
}

/// Classify `b` against the earlier zone `a`.
///
/// `None` when the zones differ in kind or `b` does not come after `a`.
pub fn zss_is_qs(a: &PivotZone, b: &PivotZone) -> Option<ZoneRelation> {
    if a.kind != b.kind || b.first_line <= a.last_line {
        return None;
    }
    if a.core_overlaps(b) {
        Some(ZoneRelation::Oscillation)
    } else if b.zd > a.zg {
        Some(ZoneRelation::Trend(Direction::Up))
    } else {
        Some(ZoneRelation::Trend(Direction::Down))
    }
}

/// Build every zone over `lines` from scratch.
pub fn create_zones(kind: LineKind, lines: &[Line], rules: ZoneRules) -> Vec<PivotZone> {
    PivotZoneBuilder::new(kind, rules).build(lines, &[])
}

/// Zone builder for one line kind.
#[derive(Debug, Clone, Copy)]
pub struct PivotZoneBuilder {
    kind: LineKind,
    rules: ZoneRules,
}

impl PivotZoneBuilder {
    pub fn new(kind: LineKind, rules: ZoneRules) -> Self {
        Self { kind, rules }
    }

    /// Build zones over `lines`, reusing the confirmed prefix of `prior`.
    ///
    /// `prior` must come from an earlier call on a sequence whose confirmed
    /// lines are a prefix of `lines`.
    pub fn build(&self, lines: &[Line], prior: &[PivotZone]) -> Vec<PivotZone> {
        let settled = lines.iter().position(|l| !l.confirmed).unwrap_or(lines.len());

        let mut zones: Vec<PivotZone> = prior.iter().take_while(|z| z.confirmed).cloned().collect();
        let mut cursor = zones.last().map_or(0, PivotZone::resume_at);

        while let Some(mut zone) = self.scan(lines, cursor, zones.len()) {
            zone.confirmed = zone.done && zone.decided_at < settled;
            cursor = zone.resume_at();
            zones.push(zone);
        }
        zones
    }

    fn scan(&self, lines: &[Line], from: usize, index: usize) -> Option<PivotZone> {
        let mut first = from;
        let (zd, zg) = loop {
            let group = lines.get(first..first + 3)?;
            if let Some(core) = common_core(group.iter().map(|l| (l.low, l.high))) {
                break core;
            }
            first += 1;
        };

        let mut last = first + 2;
        let mut closed_by = None;
        let mut done = false;
        let mut decided_at = last;
        loop {
            if last - first + 1 >= self.rules.max_lines {
                done = true;
                decided_at = last;
                break;
            }
            match lines.get(last + 1) {
                None => break,
                Some(line) if line.overlaps(zd, zg) => last += 1,
                Some(line) => {
                    closed_by = Some(line.index);
                    done = true;
                    decided_at = last + 1;
                    break;
                },
            }
        }

        if !self.rules.include_breaking_line
            && last - first + 1 > 3
            && !lines[last].ends_within(zd, zg)
        {
            last -= 1;
        }

        let members = &lines[first..=last];
        let (dd, gg) = envelope(members.iter().map(|l| (l.low, l.high)))?;
        trace!(kind = ?self.kind, first, last, zd, zg, done, "pivot zone");
        Some(PivotZone {
            kind: self.kind,
            index,
            direction: lines[first].direction.opposite(),
            start: lines[first].start,
            end: lines[last].end,
            zg,
            zd,
            gg,
            dd,
            first_line: first,
            last_line: last,
            closed_by,
            done,
            confirmed: false,
            decided_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::structure::fractal::{Fractal, FractalKind};

    /// Strokes through alternating pivots, first stroke rising.
    fn lines(pivots: &[f64]) -> Vec<Line> {
        let fractals: Vec<Fractal> = pivots
            .iter()
            .enumerate()
            .map(|(i, &value)| Fractal {
                index: i,
                kind: if i % 2 == 0 {
                    FractalKind::Bottom
                } else {
                    FractalKind::Top
                },
                center: i * 5,
                value,
                high: value,
                low: value,
                bar: i * 5,
                confirmed: true,
            })
            .collect();
        fractals
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let mut l = Line::stroke(i, &pair[0], &pair[1]);
                l.confirmed = true;
                l
            })
            .collect()
    }

    fn rules(max_lines: usize, include_breaking_line: bool) -> ZoneRules {
        ZoneRules {
            max_lines,
            include_breaking_line,
        }
    }

    #[test]
    fn test_three_overlapping_strokes_form_zone() {
        // [10,20], [15,20], [15,25]: core [15,20], envelope [10,25]
        let l = lines(&[10.0, 20.0, 15.0, 25.0]);
        let zones = create_zones(LineKind::Stroke, &l, ZoneRules::default());
        assert_eq!(zones.len(), 1);
        let z = &zones[0];
        assert_eq!((z.zd, z.zg, z.dd, z.gg), (15.0, 20.0, 10.0, 25.0));
        assert_eq!(z.line_count(), 3);
        assert!(!z.done);
        assert_eq!(z.direction, Direction::Down);
    }

    #[test]
    fn test_core_and_envelope_of_three_ranges() {
        let raw = |index: usize, low: f64, high: f64| Line {
            kind: LineKind::Segment,
            index,
            direction: if index % 2 == 0 { Direction::Up } else { Direction::Down },
            start: index,
            end: index + 1,
            start_value: low,
            end_value: high,
            high,
            low,
            start_bar: index,
            end_bar: index + 1,
            span_start: index,
            span_end: index,
            confirmed: true,
        };
        let l = vec![raw(0, 10.0, 20.0), raw(1, 15.0, 25.0), raw(2, 12.0, 22.0)];
        let zones = create_zones(LineKind::Segment, &l, ZoneRules::default());
        assert_eq!(zones.len(), 1);
        let z = &zones[0];
        assert_eq!((z.zd, z.zg, z.dd, z.gg), (15.0, 20.0, 10.0, 25.0));
        assert_eq!(z.members(&l).len(), 3);
        assert!(z.entering(&l).is_none());
    }

    #[test]
    fn test_zone_closes_on_first_miss() {
        let l = lines(&[10.0, 20.0, 15.0, 25.0, 18.0, 30.0, 26.0, 40.0]);
        let zones = create_zones(LineKind::Stroke, &l, ZoneRules::default());
        let z = &zones[0];
        // stroke 4 (18 -> 30) still touches [15, 20], stroke 5 (30 -> 26) misses
        assert_eq!((z.first_line, z.last_line), (0, 4));
        assert_eq!(z.closed_by, Some(5));
        assert!(z.done);
        assert!(z.confirmed);
        assert_eq!(z.gg, 30.0);
    }

    #[test]
    fn test_zones_never_share_lines() {
        let l = lines(&[
            10.0, 20.0, 15.0, 25.0, 18.0, 30.0, 26.0, 40.0, 35.0, 45.0, 38.0, 50.0, 46.0,
        ]);
        let zones = create_zones(LineKind::Stroke, &l, ZoneRules::default());
        assert!(zones.len() >= 2);
        for pair in zones.windows(2) {
            assert!(pair[0].last_line < pair[1].first_line);
        }
        for z in &zones {
            assert!(z.zd < z.zg);
            assert!(z.members(&l).iter().all(|m| m.overlaps(z.zd, z.zg)));
        }
    }

    #[test]
    fn test_max_lines_caps_zone() {
        let l = lines(&[10.0, 20.0, 12.0, 19.0, 13.0, 18.0, 14.0, 17.0]);
        let zones = create_zones(LineKind::Stroke, &l, rules(4, true));
        assert_eq!(zones[0].line_count(), 4);
        assert!(zones[0].done);
        assert_eq!(zones[0].closed_by, None);
    }

    #[test]
    fn test_breaking_line_dropped_when_excluded() {
        // stroke 3 (25 -> 16) ends inside the core, stroke 4 (16 -> 28) ends above it
        let l = lines(&[10.0, 20.0, 15.0, 25.0, 16.0, 28.0, 26.0, 40.0]);
        let with = create_zones(LineKind::Stroke, &l, rules(999, true));
        let without = create_zones(LineKind::Stroke, &l, rules(999, false));
        assert_eq!(with[0].last_line, 4);
        assert_eq!(without[0].last_line, 3);
        assert_eq!(without[0].gg, 25.0);
    }

    #[test]
    fn test_build_reuses_confirmed_prefix() {
        let mut l = lines(&[
            10.0, 20.0, 15.0, 25.0, 18.0, 30.0, 26.0, 40.0, 35.0, 45.0, 38.0,
        ]);
        let last = l.len() - 1;
        l[last].confirmed = false;
        let builder = PivotZoneBuilder::new(LineKind::Stroke, ZoneRules::default());
        let first = builder.build(&l, &[]);
        let again = builder.build(&l, &first);
        assert_eq!(first, again);
        assert!(first[0].confirmed);
        assert!(!first.last().unwrap().confirmed);
    }

    #[test]
    fn test_zone_relation() {
        let l = lines(&[
            10.0, 20.0, 15.0, 25.0, 18.0, 30.0, 26.0, 40.0, 35.0, 45.0, 38.0, 50.0, 46.0,
        ]);
        let zones = create_zones(LineKind::Stroke, &l, ZoneRules::default());
        assert_eq!(zss_is_qs(&zones[0], &zones[1]), Some(ZoneRelation::Trend(Direction::Up)));
        assert_eq!(zss_is_qs(&zones[1], &zones[0]), None);
        assert_eq!(zss_is_qs(&zones[0], &zones[0]), None);
    }

    #[test]
    fn test_touching_cores_oscillate() {
        let l = lines(&[10.0, 20.0, 15.0, 25.0]);
        let a = create_zones(LineKind::Stroke, &l, ZoneRules::default()).remove(0);
        let mut b = a.clone();
        b.first_line = a.last_line + 2;
        b.last_line = b.first_line + 2;
        // [20, 24] shares only its floor with [15, 20]
        b.zd = a.zg;
        b.zg = a.zg + 4.0;
        assert!(a.core_overlaps(&b));
        assert_eq!(zss_is_qs(&a, &b), Some(ZoneRelation::Oscillation));

        b.zd = a.zd - 6.0;
        b.zg = a.zd - 1.0;
        assert!(!a.core_overlaps(&b));
        assert_eq!(zss_is_qs(&a, &b), Some(ZoneRelation::Trend(Direction::Down)));
    }
}
