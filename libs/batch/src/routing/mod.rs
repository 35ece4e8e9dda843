//! Route Matcher
//!
//! Maps a Sub-Request's method and relative URL to exactly one route of the registry, or to
//! nothing. Resolution is pure; the registry is immutable once built.

pub mod descriptor;
pub mod params;
pub mod pattern;
pub mod registry;

pub use descriptor::{CommandRule, RouteDescriptor, Specificity};
pub use params::{Captured, MatchedParams};
pub use pattern::{NumericMode, RoutePattern, Segment};
pub use registry::{Resolution, RouteMatch, RouteRegistry};
