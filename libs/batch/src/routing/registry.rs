//! Route registry and resolution

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::model::Method;
use crate::routing::descriptor::{RouteDescriptor, Specificity};
use crate::routing::params::MatchedParams;
use crate::routing::pattern::{NumericMode, RoutePattern};
use crate::strategy::CommandStrategy;
use crate::url::{decompose, QueryParams};

struct RouteEntry {
    descriptor: RouteDescriptor,
    pattern: RoutePattern,
    specificity: Specificity,
    strategy: Arc<dyn CommandStrategy>,
}

/// The resolved route of one Sub-Request.
#[derive(Clone)]
pub struct RouteMatch {
    pub descriptor: RouteDescriptor,
    pub strategy: Arc<dyn CommandStrategy>,
    pub params: MatchedParams,
    pub query: QueryParams,
    pub command: Option<String>,
}

impl fmt::Debug for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteMatch")
            .field("descriptor", &self.descriptor)
            .field("params", &self.params)
            .field("query", &self.query)
            .field("command", &self.command)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum Resolution {
    Matched(RouteMatch),
    Unmatched,
}

impl Resolution {
    pub fn is_matched(&self) -> bool {
        matches!(self, Resolution::Matched(_))
    }
}

/// Immutable set of routes, validated for ambiguity when built.
pub struct RouteRegistry {
    entries: Vec<RouteEntry>,
}

impl RouteRegistry {
    /// Compile and validate the route table.
    ///
    /// Fails with [`Error::InvalidRoute`] for malformed patterns and with
    /// [`Error::AmbiguousRoutes`] when two routes of one method could claim the same path and
    /// command with equal specificity.
    pub fn new(
        entries: impl IntoIterator<Item = (RouteDescriptor, Arc<dyn CommandStrategy>)>,
    ) -> Result<Self> {
        let mut compiled: Vec<RouteEntry> = Vec::new();

        for (descriptor, strategy) in entries {
            let pattern = RoutePattern::parse(descriptor.pattern)?;
            let specificity = Specificity {
                literals: pattern.literal_count(),
                exact_length: pattern.is_exact_length(),
                discriminated: descriptor.command.is_discriminated(),
            };
            let entry = RouteEntry {
                descriptor,
                pattern,
                specificity,
                strategy,
            };

            if let Some(existing) = compiled.iter().find(|e| conflicts(e, &entry)) {
                return Err(Error::AmbiguousRoutes(format!(
                    "'{}' and '{}' can match the same request",
                    existing.descriptor, entry.descriptor
                )));
            }
            compiled.push(entry);
        }

        tracing::debug!(routes = compiled.len(), "Route registry built");
        Ok(Self { entries: compiled })
    }

    /// Resolve a Sub-Request's method and relative URL.
    pub fn resolve(&self, method: Method, relative_url: &str) -> Resolution {
        let url = decompose(relative_url);

        let found = self
            .best_match(method, &url.segments, &url.query, NumericMode::Strict)
            .or_else(|| self.best_match(method, &url.segments, &url.query, NumericMode::Lenient));

        match found {
            Some((entry, params, command)) => Resolution::Matched(RouteMatch {
                descriptor: entry.descriptor,
                strategy: entry.strategy.clone(),
                params,
                query: url.query,
                command,
            }),
            None => Resolution::Unmatched,
        }
    }

    fn best_match(
        &self,
        method: Method,
        segments: &[String],
        query: &QueryParams,
        mode: NumericMode,
    ) -> Option<(&RouteEntry, MatchedParams, Option<String>)> {
        self.entries
            .iter()
            .filter(|e| e.descriptor.method == method)
            .filter_map(|e| {
                let command = e.descriptor.command.accept(query.command())?;
                let params = e.pattern.matches(segments, mode)?;
                Some((e, params, command))
            })
            .max_by_key(|(e, _, _)| e.specificity)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &RouteDescriptor> {
        self.entries.iter().map(|e| &e.descriptor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RouteRegistry")
            .field("routes", &self.entries.len())
            .finish()
    }
}

/// Two routes conflict when one request could resolve to either of them.
///
/// Numeric placeholders only behave as tokens in the lenient pass, which runs when nothing
/// matched strictly. A pattern without numeric placeholders matches identically in both passes,
/// so the lenient comparison only applies when both patterns carry one.
fn conflicts(a: &RouteEntry, b: &RouteEntry) -> bool {
    if a.descriptor.method != b.descriptor.method
        || a.specificity != b.specificity
        || !a.descriptor.command.overlaps(&b.descriptor.command)
    {
        return false;
    }

    a.pattern.overlaps(&b.pattern, NumericMode::Strict)
        || (a.pattern.has_numeric()
            && b.pattern.has_numeric()
            && a.pattern.overlaps(&b.pattern, NumericMode::Lenient))
}
