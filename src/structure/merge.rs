//! Bar merging under the inclusion relation.
//!
//! Adjacent bars where one range contains the other are folded into a single
//! [`MergedBar`]. The merged extremes follow the trend of the merged series:
//! while rising the higher high and higher low are kept, while falling the
//! lower high and lower low. The first merged bar counts as rising.
//!
//! Only the tail merged bar is ever modified, so every merged bar before it is
//! final.

use serde::Serialize;

use crate::{Bar, Direction, OHLCVExt, OHLCV};

/// One or more consecutive source bars folded together by inclusion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedBar {
    /// Position in the merged series.
    pub index: usize,
    /// Index of the first source bar.
    pub first_bar: usize,
    /// Index of the last source bar (inclusive).
    pub last_bar: usize,
    pub high: f64,
    pub low: f64,
    /// Open of the first source bar.
    pub open: f64,
    /// Close of the last source bar.
    pub close: f64,
    /// Summed volume of the source bars.
    pub volume: f64,
    /// Direction relative to the previous merged bar (`Up` for the first).
    pub direction: Direction,
    /// Source bar carrying the effective high.
    pub peak_bar: usize,
    /// Source bar carrying the effective low.
    pub trough_bar: usize,
}

impl MergedBar {
    fn open_from(bar: &Bar, index: usize, direction: Direction) -> Self {
        Self {
            index,
            first_bar: bar.index,
            last_bar: bar.index,
            high: bar.high,
            low: bar.low,
            open: bar.open,
            close: bar.close,
            volume: bar.volume,
            direction,
            peak_bar: bar.index,
            trough_bar: bar.index,
        }
    }

    /// Number of source bars folded into this merged bar.
    #[inline]
    pub fn bar_count(&self) -> usize {
        self.last_bar - self.first_bar + 1
    }

    /// Source bars folded into this merged bar.
    ///
    /// Returns an empty slice if `bars` is not the series this bar was built from.
    pub fn source_bars<'a>(&self, bars: &'a [Bar]) -> &'a [Bar] {
        bars.get(self.first_bar..=self.last_bar).unwrap_or(&[])
    }

    fn absorb(&mut self, bar: &Bar) {
        match self.direction {
            Direction::Up => {
                if bar.high > self.high {
                    self.high = bar.high;
                    self.peak_bar = bar.index;
                }
                if bar.low > self.low {
                    self.low = bar.low;
                    self.trough_bar = bar.index;
                }
            },
            Direction::Down => {
                if bar.high < self.high {
                    self.high = bar.high;
                    self.peak_bar = bar.index;
                }
                if bar.low < self.low {
                    self.low = bar.low;
                    self.trough_bar = bar.index;
                }
            },
        }
        self.last_bar = bar.index;
        self.close = bar.close;
        self.volume += bar.volume;
    }
}

impl OHLCV for MergedBar {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

/// What a single [`BarMerger::push`] did to the merged series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeStep {
    /// The bar opened a new tail merged bar.
    Opened,
    /// The bar was absorbed into the tail merged bar.
    Extended,
}

/// Streaming bar merger. Feed bars in order with [`push`](Self::push).
#[derive(Debug, Clone, Default)]
pub struct BarMerger {
    merged: Vec<MergedBar>,
}

impl BarMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge a whole bar series in one go.
    pub fn merge_all(bars: &[Bar]) -> Vec<MergedBar> {
        let mut merger = Self::new();
        for bar in bars {
            merger.push(bar);
        }
        merger.merged
    }

    /// Append one source bar.
    pub fn push(&mut self, bar: &Bar) -> MergeStep {
        let Some(tail) = self.merged.last_mut() else {
            self.merged.push(MergedBar::open_from(bar, 0, Direction::Up));
            return MergeStep::Opened;
        };

        if tail.includes(bar) {
            // Merging never flips the tail's relation to its predecessor: a
            // rising tail only gets higher, a falling tail only lower.
            tail.absorb(bar);
            return MergeStep::Extended;
        }

        let direction = if bar.high > tail.high {
            Direction::Up
        } else {
            Direction::Down
        };
        let index = self.merged.len();
        self.merged.push(MergedBar::open_from(bar, index, direction));
        MergeStep::Opened
    }

    /// The merged series; the last element is the open tail.
    #[inline]
    pub fn merged(&self) -> &[MergedBar] {
        &self.merged
    }

    /// Number of merged bars that can no longer change.
    #[inline]
    pub fn closed_len(&self) -> usize {
        self.merged.len().saturating_sub(1)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.merged.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.merged.is_empty()
    }
}
