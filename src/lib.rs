//! # chanlun - Chan Theory market-structure decomposition
//!
//! Turns an ordered OHLCV series into merged bars, fractals, strokes, segments
//! and pivot zones, keeps that hierarchy consistent as bars arrive, and answers
//! divergence queries against a caller-supplied MACD series.
//!
//! ## Quick Start
//!
//! ```rust
//! use chanlun::prelude::*;
//!
//! let engine = EngineBuilder::new("000001.SH", "d")
//!     .min_stroke_gap(4)
//!     .build()
//!     .unwrap();
//!
//! let bars: Vec<Bar> = (0..60)
//!     .map(|i| {
//!         let p = 10.0 + (i as f64 * 0.3).sin() * 3.0;
//!         Bar::new(i * 86_400, p, p + 0.2, p - 0.2, p, 1_000.0)
//!     })
//!     .collect();
//!
//! let summary = engine.process(&bars).unwrap();
//! assert_eq!(summary.total_bars, 60);
//!
//! for stroke in engine.get_strokes().iter() {
//!     println!("{:?} {} -> {}", stroke.direction, stroke.start_value, stroke.end_value);
//! }
//! ```

pub mod catalog;
pub mod params;
pub mod store;
pub mod structure;

pub mod prelude {
    pub use crate::{
        // Catalog
        catalog::{InitConfig, Market, MarketCatalog, StaticCatalog},
        // Parameters
        params::{get_flag, get_period, Configurable, ParamMeta, ParamType},
        // Parallel
        process_parallel,
        // Store
        store::ChanStore,
        // Structure
        structure::{
            FractalKind, Fractal, Line, LineKind, MacdPoint, MergedBar, MomentumSeries, NativeBackend,
            PivotZone, StructureSnapshot, ZoneRelation,
        },
        // Types
        Bar,
        ChanConfig,
        // Engine
        ChanEngine,
        // Errors
        ChanError,
        Direction,
        EngineBuilder,
        // Core traits
        OHLCVExt,
        Period,
        ProcessError,
        ProcessResult,
        ProcessSummary,
        Result,
        StructureBackend,
        OHLCV,
    };
}

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use structure::{Line, LineKind, MomentumSeries, NativeBackend, PivotZone, StructureSnapshot, ZoneRelation, ZoneRules};

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, ChanError>;

/// Errors raised while configuring or running a pipeline
#[derive(Debug, Clone, thiserror::Error)]
pub enum ChanError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid bar at index {index}: {reason}")]
    InvalidBar { index: usize, reason: &'static str },

    #[error("Timestamp at index {index} not after previous bar: {current} <= {previous}")]
    NonMonotonicTimestamp {
        index: usize,
        previous: i64,
        current: i64,
    },

    #[error("Backend {backend} unavailable: {reason}")]
    EngineUnavailable { backend: &'static str, reason: String },

    #[error("Invariant violated in {stage} at {index}: {detail}")]
    InvariantViolation {
        stage: &'static str,
        index: usize,
        detail: String,
    },

    #[error("Pipeline poisoned: {detail}")]
    Poisoned { detail: String },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Count or length (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(ChanError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait OHLCV {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    /// Required by [`ChanEngine::process`]; bars without one are rejected.
    fn timestamp(&self) -> Option<i64> {
        None
    }
}

/// Blanket impl for references to dyn OHLCV
impl OHLCV for &dyn OHLCV {
    fn open(&self) -> f64 {
        (*self).open()
    }

    fn high(&self) -> f64 {
        (*self).high()
    }

    fn low(&self) -> f64 {
        (*self).low()
    }

    fn close(&self) -> f64 {
        (*self).close()
    }

    fn volume(&self) -> f64 {
        (*self).volume()
    }

    fn timestamp(&self) -> Option<i64> {
        (*self).timestamp()
    }
}

/// Extension trait with computed properties for OHLCV data
pub trait OHLCVExt: OHLCV {
    /// One bar's range contains the other's.
    #[inline]
    fn includes<O: OHLCV + ?Sized>(&self, other: &O) -> bool {
        structure::helpers::is_inclusion(self.low(), self.high(), other.low(), other.high())
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        let values = [self.open(), self.high(), self.low(), self.close(), self.volume()];
        if values.iter().any(|v| v.is_nan()) {
            return Err(ChanError::InvalidBar {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if values.iter().any(|v| v.is_infinite()) {
            return Err(ChanError::InvalidBar {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        if values.iter().any(|v| *v < 0.0) {
            return Err(ChanError::InvalidBar {
                index: 0,
                reason: "negative price or volume",
            });
        }
        if self.high() < self.low() {
            return Err(ChanError::InvalidBar {
                index: 0,
                reason: "high < low",
            });
        }
        let range = self.low()..=self.high();
        if !range.contains(&self.open()) || !range.contains(&self.close()) {
            return Err(ChanError::InvalidBar {
                index: 0,
                reason: "open/close outside [low, high]",
            });
        }
        Ok(())
    }
}

impl<T: OHLCV> OHLCVExt for T {}

// ============================================================
// BAR & DIRECTION
// ============================================================

/// An ingested price bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Position in the pipeline's history, assigned on ingestion.
    pub index: usize,
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    pub fn new(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            index: 0,
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl OHLCV for Bar {
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

    fn timestamp(&self) -> Option<i64> {
        Some(self.timestamp)
    }
}

/// Direction of a line, a merge or a trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, Direction::Up)
    }

    #[inline]
    pub fn is_down(self) -> bool {
        matches!(self, Direction::Down)
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }

    /// `value` lies strictly past `reference` in this direction.
    #[inline]
    pub fn beyond(self, value: f64, reference: f64) -> bool {
        match self {
            Direction::Up => value > reference,
            Direction::Down => value < reference,
        }
    }
}

// ============================================================
// CONFIGURATION
// ============================================================

/// Pipeline configuration
///
/// Missing fields take their defaults when deserializing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChanConfig {
    /// Minimum merged-bar distance between a stroke's two fractal centres.
    pub min_stroke_gap: Period,
    /// Member cap for one pivot zone.
    pub pivot_max_lines: Period,
    /// Keep the last member of a zone when it ends outside the core.
    pub pivot_include_breaking_line: bool,
    /// Merged bars that must follow a fractal's right neighbour before it is confirmed.
    pub fractal_confirmation_lag: Period,
}

impl Default for ChanConfig {
    fn default() -> Self {
        Self {
            min_stroke_gap: Period::new_const(4),
            pivot_max_lines: Period::new_const(999),
            pivot_include_breaking_line: true,
            fractal_confirmation_lag: Period::new_const(1),
        }
    }
}

impl ChanConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_stroke_gap.get() < 2 {
            return Err(ChanError::InvalidConfig(format!(
                "min_stroke_gap must be >= 2, got {}",
                self.min_stroke_gap.get()
            )));
        }
        if self.pivot_max_lines.get() < 3 {
            return Err(ChanError::InvalidConfig(format!(
                "pivot_max_lines must be >= 3, got {}",
                self.pivot_max_lines.get()
            )));
        }
        if self.fractal_confirmation_lag.get() == 0 {
            return Err(ChanError::InvalidConfig("fractal_confirmation_lag must be > 0".into()));
        }
        Ok(())
    }
}

// ============================================================
// BACKEND
// ============================================================

/// Computes the structure of one pipeline.
///
/// The engine owns a backend's `State` and hands it back on every call along
/// with the full bar history; `bars[new_from..]` are the bars appended since
/// the previous call.
pub trait StructureBackend: Send + Sync {
    type State: Send;

    fn name(&self) -> &'static str;

    /// Checked once when an engine is built.
    fn ensure_available(&self) -> Result<()> {
        Ok(())
    }

    fn init_state(&self, config: &ChanConfig) -> Self::State;

    fn advance(
        &self,
        state: &mut Self::State,
        bars: &[Bar],
        new_from: usize,
        config: &ChanConfig,
    ) -> Result<StructureSnapshot>;
}

// ============================================================
// CHAN ENGINE
// ============================================================

/// Counts after one [`ChanEngine::process`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProcessSummary {
    pub appended: usize,
    pub total_bars: usize,
    pub merged_bars: usize,
    pub fractals: usize,
    pub strokes: usize,
    pub segments: usize,
    pub stroke_zones: usize,
    pub segment_zones: usize,
}

impl ProcessSummary {
    fn of(snapshot: &StructureSnapshot, appended: usize) -> Self {
        Self {
            appended,
            total_bars: snapshot.bars.len(),
            merged_bars: snapshot.merged_bars.len(),
            fractals: snapshot.fractals.len(),
            strokes: snapshot.strokes.len(),
            segments: snapshot.segments.len(),
            stroke_zones: snapshot.stroke_zones.len(),
            segment_zones: snapshot.segment_zones.len(),
        }
    }
}

struct EngineState<S> {
    bars: Vec<Bar>,
    backend: S,
    poisoned: Option<String>,
}

/// Structural pipeline for one (instrument, timeframe)
///
/// Writers are serialised; readers load the last published snapshot without
/// locking and never see a half-finished recomputation.
pub struct ChanEngine<B: StructureBackend = NativeBackend> {
    code: String,
    frequency: String,
    config: ChanConfig,
    backend: B,
    state: Mutex<EngineState<B::State>>,
    snapshot: ArcSwap<StructureSnapshot>,
    momentum: ArcSwap<MomentumSeries>,
}

impl ChanEngine<NativeBackend> {
    /// Native engine with `config`.
    pub fn new(code: impl Into<String>, frequency: impl Into<String>, config: ChanConfig) -> Result<Self> {
        EngineBuilder::new(code, frequency).config(config).build()
    }
}

impl<B: StructureBackend> ChanEngine<B> {
    fn with_backend(code: String, frequency: String, config: ChanConfig, backend: B) -> Self {
        let state = EngineState {
            bars: Vec::new(),
            backend: backend.init_state(&config),
            poisoned: None,
        };
        Self {
            code,
            frequency,
            config,
            backend,
            state: Mutex::new(state),
            snapshot: ArcSwap::from_pointee(StructureSnapshot::default()),
            momentum: ArcSwap::from_pointee(MomentumSeries::default()),
        }
    }

    // ===========================================
    // Identity
    // ===========================================

    #[inline]
    pub fn code(&self) -> &str {
        &self.code
    }

    #[inline]
    pub fn frequency(&self) -> &str {
        &self.frequency
    }

    #[inline]
    pub fn config(&self) -> &ChanConfig {
        &self.config
    }

    #[inline]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    // ===========================================
    // Ingestion
    // ===========================================

    /// Append bars and recompute the structure.
    ///
    /// The whole batch is validated first; on a validation error nothing is
    /// ingested. An invariant violation poisons the pipeline: this and every
    /// later call fail until [`reset`](Self::reset).
    pub fn process<T: OHLCV>(&self, bars: &[T]) -> Result<ProcessSummary> {
        let mut guard = self.state.lock();
        if let Some(detail) = &guard.poisoned {
            return Err(ChanError::Poisoned {
                detail: detail.clone(),
            });
        }

        let offset = guard.bars.len();
        let previous = guard.bars.last().map(|b| b.timestamp);
        let incoming = ingest(bars, offset, previous)?;
        if incoming.is_empty() {
            return Ok(ProcessSummary::of(&self.snapshot.load(), 0));
        }

        let appended = incoming.len();
        let state = &mut *guard;
        state.bars.extend(incoming);

        let outcome = self
            .backend
            .advance(&mut state.backend, &state.bars, offset, &self.config)
            .and_then(|snapshot| snapshot.verify(&self.config).map(|()| snapshot));

        match outcome {
            Ok(snapshot) => {
                let summary = ProcessSummary::of(&snapshot, appended);
                debug!(
                    code = %self.code,
                    frequency = %self.frequency,
                    appended,
                    bars = summary.total_bars,
                    merged = summary.merged_bars,
                    fractals = summary.fractals,
                    strokes = summary.strokes,
                    segments = summary.segments,
                    stroke_zones = summary.stroke_zones,
                    segment_zones = summary.segment_zones,
                    "processed bars"
                );
                self.snapshot.store(Arc::new(snapshot));
                Ok(summary)
            },
            Err(error) => {
                warn!(
                    code = %self.code,
                    frequency = %self.frequency,
                    backend = self.backend.name(),
                    %error,
                    "pipeline poisoned"
                );
                state.poisoned = Some(error.to_string());
                Err(error)
            },
        }
    }

    /// Drop all history, structure and momentum, and clear a poisoned state.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        *state = EngineState {
            bars: Vec::new(),
            backend: self.backend.init_state(&self.config),
            poisoned: None,
        };
        self.snapshot.store(Arc::new(StructureSnapshot::default()));
        self.momentum.store(Arc::new(MomentumSeries::default()));
        debug!(code = %self.code, frequency = %self.frequency, "pipeline reset");
    }

    // ===========================================
    // Accessors
    // ===========================================

    /// Current structure, shared.
    #[inline]
    pub fn snapshot(&self) -> Arc<StructureSnapshot> {
        self.snapshot.load_full()
    }

    pub fn get_bars(&self) -> Arc<[Bar]> {
        self.snapshot.load().bars.clone()
    }

    pub fn get_merged_bars(&self) -> Arc<[structure::MergedBar]> {
        self.snapshot.load().merged_bars.clone()
    }

    pub fn get_fractals(&self) -> Arc<[structure::Fractal]> {
        self.snapshot.load().fractals.clone()
    }

    pub fn get_strokes(&self) -> Arc<[Line]> {
        self.snapshot.load().strokes.clone()
    }

    pub fn get_segments(&self) -> Arc<[Line]> {
        self.snapshot.load().segments.clone()
    }

    /// Stroke-level zones, optionally only those entered in `direction`.
    pub fn get_stroke_pivot_zones(&self, direction: Option<Direction>) -> Vec<PivotZone> {
        self.snapshot
            .load()
            .stroke_zones
            .iter()
            .filter(|z| direction.map_or(true, |d| z.direction == d))
            .cloned()
            .collect()
    }

    pub fn get_segment_pivot_zones(&self) -> Arc<[PivotZone]> {
        self.snapshot.load().segment_zones.clone()
    }

    pub fn get_last_stroke_pivot_zone(&self) -> Option<PivotZone> {
        self.snapshot.load().stroke_zones.last().cloned()
    }

    pub fn get_last_segment_pivot_zone(&self) -> Option<PivotZone> {
        self.snapshot.load().segment_zones.last().cloned()
    }

    // ===========================================
    // Momentum & divergence
    // ===========================================

    /// Replace the MACD series used for divergence checks.
    pub fn set_momentum(&self, series: MomentumSeries) -> Result<()> {
        let finite = series
            .points()
            .iter()
            .all(|p| p.dif.is_finite() && p.dea.is_finite() && p.hist.is_finite());
        if !finite {
            return Err(ChanError::InvalidValue("momentum values must be finite"));
        }
        self.momentum.store(Arc::new(series));
        Ok(())
    }

    pub fn get_momentum(&self) -> Arc<MomentumSeries> {
        self.momentum.load_full()
    }

    /// Consolidation divergence of `line` against `zone`, resolved over the current
    /// strokes or segments depending on the zone's kind.
    pub fn beichi_pz(&self, zone: &PivotZone, line: &Line) -> (bool, Option<Line>) {
        let snapshot = self.snapshot.load();
        let lines = match zone.kind {
            LineKind::Stroke => &snapshot.strokes,
            LineKind::Segment => &snapshot.segments,
        };
        structure::beichi_pz(zone, line, lines, &self.momentum.load())
    }

    /// Trend divergence of `now_line` over `lines` and their `zones`.
    pub fn beichi_qs(&self, lines: &[Line], zones: &[PivotZone], now_line: &Line) -> (bool, Vec<Line>) {
        structure::beichi_qs(lines, zones, now_line, &self.momentum.load())
    }

    #[inline]
    pub fn zss_is_qs(&self, a: &PivotZone, b: &PivotZone) -> Option<ZoneRelation> {
        structure::zss_is_qs(a, b)
    }

    /// Build zones over an arbitrary line slice with explicit rules.
    pub fn create_zones(
        &self,
        kind: LineKind,
        lines: &[Line],
        max_lines: usize,
        include_breaking_line: bool,
    ) -> Result<Vec<PivotZone>> {
        if max_lines < 3 {
            return Err(ChanError::OutOfRange {
                field: "max_lines",
                value: max_lines as f64,
                min: 3.0,
                max: f64::INFINITY,
            });
        }
        let rules = ZoneRules {
            max_lines,
            include_breaking_line,
        };
        Ok(structure::create_zones(kind, lines, rules))
    }
}

/// Validate a batch and convert it into indexed bars.
fn ingest<T: OHLCV>(bars: &[T], offset: usize, mut previous: Option<i64>) -> Result<Vec<Bar>> {
    let mut out = Vec::with_capacity(bars.len());
    for (i, raw) in bars.iter().enumerate() {
        let index = offset + i;
        raw.validate().map_err(|e| match e {
            ChanError::InvalidBar { reason, .. } => ChanError::InvalidBar { index, reason },
            other => other,
        })?;
        let timestamp = raw.timestamp().ok_or(ChanError::InvalidBar {
            index,
            reason: "missing timestamp",
        })?;
        if let Some(previous) = previous {
            if timestamp <= previous {
                return Err(ChanError::NonMonotonicTimestamp {
                    index,
                    previous,
                    current: timestamp,
                });
            }
        }
        previous = Some(timestamp);
        out.push(Bar {
            index,
            timestamp,
            open: raw.open(),
            high: raw.high(),
            low: raw.low(),
            close: raw.close(),
            volume: raw.volume(),
        });
    }
    Ok(out)
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating ChanEngine instances
pub struct EngineBuilder<B: StructureBackend = NativeBackend> {
    code: String,
    frequency: String,
    config: ChanConfig,
    backend: B,
}

impl EngineBuilder<NativeBackend> {
    pub fn new(code: impl Into<String>, frequency: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            frequency: frequency.into(),
            config: ChanConfig::default(),
            backend: NativeBackend,
        }
    }
}

impl<B: StructureBackend> EngineBuilder<B> {
    /// Change structural backend
    pub fn backend<B2: StructureBackend>(self, backend: B2) -> EngineBuilder<B2> {
        EngineBuilder {
            code: self.code,
            frequency: self.frequency,
            config: self.config,
            backend,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: ChanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn min_stroke_gap(mut self, gap: usize) -> Self {
        self.config.min_stroke_gap = Period::new_const(gap);
        self
    }

    pub fn pivot_max_lines(mut self, max_lines: usize) -> Self {
        self.config.pivot_max_lines = Period::new_const(max_lines);
        self
    }

    pub fn pivot_include_breaking_line(mut self, include: bool) -> Self {
        self.config.pivot_include_breaking_line = include;
        self
    }

    pub fn fractal_confirmation_lag(mut self, lag: usize) -> Self {
        self.config.fractal_confirmation_lag = Period::new_const(lag);
        self
    }

    /// Build the engine
    pub fn build(self) -> Result<ChanEngine<B>> {
        self.config.validate()?;
        self.backend.ensure_available()?;
        Ok(ChanEngine::with_backend(
            self.code,
            self.frequency,
            self.config,
            self.backend,
        ))
    }
}

// ============================================================
// PARALLEL PROCESSING
// ============================================================

use rayon::prelude::*;

use store::ChanStore;

/// Result of processing a single pipeline
#[derive(Debug)]
pub struct ProcessResult {
    pub code: String,
    pub frequency: String,
    pub summary: ProcessSummary,
}

/// Error from processing a single pipeline
#[derive(Debug)]
pub struct ProcessError {
    pub code: String,
    pub frequency: String,
    pub error: ChanError,
}

/// Feed independent (instrument, timeframe) batches in parallel.
///
/// Pipelines are created in `store` on first use. Each key should appear at
/// most once per call; batches for the same key would race for its order.
pub fn process_parallel<'a, T, I, B>(
    store: &ChanStore<B>,
    batches: I,
) -> (Vec<ProcessResult>, Vec<ProcessError>)
where
    T: OHLCV + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a str, &'a [T])>,
    B: StructureBackend + Clone,
{
    let results: Vec<_> = batches
        .into_par_iter()
        .map(|(code, frequency, bars)| {
            store
                .get_or_create(code, frequency)
                .and_then(|engine| engine.process(bars))
                .map(|summary| ProcessResult {
                    code: code.to_string(),
                    frequency: frequency.to_string(),
                    summary,
                })
                .map_err(|error| ProcessError {
                    code: code.to_string(),
                    frequency: frequency.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(r) => successes.push(r),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
