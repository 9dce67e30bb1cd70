//! Structural decomposition stages
//!
//! Each stage consumes the output of the one before it:
//!
//! - **merge**: bars folded under the inclusion relation
//! - **fractal**: top/bottom turning points over merged bars
//! - **stroke**: lines between alternating fractals
//! - **segment**: lines grouping runs of strokes
//! - **pivot**: consolidation zones over strokes and over segments
//! - **divergence**: momentum comparisons against zones and trends
//!
//! [`pipeline`] chains them into the native backend and [`snapshot`] holds the
//! published result.

pub mod helpers;

pub mod divergence;
pub mod fractal;
pub mod line;
pub mod merge;
pub mod pipeline;
pub mod pivot;
pub mod segment;
pub mod snapshot;
pub mod stroke;

pub use divergence::{beichi_pz, beichi_qs, MacdPoint, MomentumSeries};
pub use fractal::{Fractal, FractalDetector, FractalKind};
pub use line::{Line, LineKind};
pub use merge::{BarMerger, MergeStep, MergedBar};
pub use pipeline::{analyze, NativeBackend, NativeState};
pub use pivot::{create_zones, zss_is_qs, PivotZone, PivotZoneBuilder, ZoneRelation, ZoneRules};
pub use segment::SegmentBuilder;
pub use snapshot::StructureSnapshot;
pub use stroke::StrokeBuilder;
