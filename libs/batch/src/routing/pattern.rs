//! Path patterns
//!
//! Patterns are written as templates: `loans/{loanId#}/charges`, `clients/external-id/{id}`,
//! `datatables/{datatable}/{path..}`. `#` marks a numeric identifier, `..` a trailing wildcard,
//! and `external-id/{name}` the two-segment external identifier idiom.

use std::fmt;

use crate::error::{Error, Result};
use crate::routing::params::{Captured, MatchedParams};
use crate::url::strip_query_suffix;

/// Literal introducing an external identifier.
pub const EXTERNAL_ID_LITERAL: &str = "external-id";

/// Words that name a path shape and are never identifiers, even in lenient matching.
pub const RESERVED_SEGMENTS: &[&str] = &[EXTERNAL_ID_LITERAL, "template"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment {
    /// Must equal the path segment exactly.
    Literal(&'static str),
    /// Decimal identifier.
    NumericId(&'static str),
    /// `external-id/<token>`; consumes two path segments.
    ExternalId(&'static str),
    /// Any single segment.
    Token(&'static str),
    /// One or more trailing segments.
    Rest(&'static str),
}

impl Segment {
    fn literal_count(&self) -> usize {
        match self {
            Segment::Literal(_) | Segment::ExternalId(_) => 1,
            _ => 0,
        }
    }
}

/// How strictly numeric placeholders are matched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericMode {
    /// All ASCII digits after stripping a glued query suffix.
    Strict,
    /// Any token; the strategy rejects non-numeric values later.
    Lenient,
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    template: &'static str,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Compile a template.
    pub fn parse(template: &'static str) -> Result<Self> {
        let parts: Vec<&'static str> = template
            .trim_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        if parts.is_empty() {
            return Err(Error::InvalidRoute(format!(
                "pattern '{template}' has no segments"
            )));
        }

        let mut segments = Vec::with_capacity(parts.len());
        let mut i = 0;
        while i < parts.len() {
            let part = parts[i];
            let segment = match placeholder(part) {
                Some(inner) => parse_placeholder(template, inner)?,
                None if part == EXTERNAL_ID_LITERAL => {
                    match parts.get(i + 1).and_then(|next| placeholder(next)) {
                        Some(inner) if is_plain_name(inner) => {
                            i += 1;
                            Segment::ExternalId(inner)
                        }
                        _ => Segment::Literal(part),
                    }
                }
                None => Segment::Literal(part),
            };
            segments.push(segment);
            i += 1;
        }

        if let Some(pos) = segments
            .iter()
            .position(|s| matches!(s, Segment::Rest(_)))
        {
            if pos + 1 != segments.len() {
                return Err(Error::InvalidRoute(format!(
                    "pattern '{template}' has a wildcard before its last segment"
                )));
            }
        }

        Ok(Self { template, segments })
    }

    pub fn template(&self) -> &'static str {
        self.template
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn literal_count(&self) -> usize {
        self.segments.iter().map(Segment::literal_count).sum()
    }

    /// True when the pattern matches a fixed number of segments.
    pub fn is_exact_length(&self) -> bool {
        !matches!(self.segments.last(), Some(Segment::Rest(_)))
    }

    pub fn has_numeric(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::NumericId(_)))
    }

    /// Match decomposed path segments, capturing placeholders in pattern order.
    pub fn matches(&self, path: &[String], mode: NumericMode) -> Option<MatchedParams> {
        let mut params = MatchedParams::new();
        let mut i = 0;

        for segment in &self.segments {
            match *segment {
                Segment::Literal(lit) => {
                    if path.get(i)?.as_str() != lit {
                        return None;
                    }
                    i += 1;
                }
                Segment::NumericId(name) => {
                    let raw = path.get(i)?;
                    let id = strip_query_suffix(raw);
                    if mode == NumericMode::Strict && !is_decimal(id) {
                        return None;
                    }
                    if RESERVED_SEGMENTS.contains(&id) {
                        return None;
                    }
                    params.push(name, Captured::Numeric(raw.clone()));
                    i += 1;
                }
                Segment::ExternalId(name) => {
                    if path.get(i)?.as_str() != EXTERNAL_ID_LITERAL {
                        return None;
                    }
                    let raw = path.get(i + 1)?;
                    params.push(name, Captured::ExternalId(raw.clone()));
                    i += 2;
                }
                Segment::Token(name) => {
                    let raw = path.get(i)?;
                    params.push(name, Captured::Token(raw.clone()));
                    i += 1;
                }
                Segment::Rest(name) => {
                    if i >= path.len() {
                        return None;
                    }
                    params.push(name, Captured::Rest(path[i..].to_vec()));
                    i = path.len();
                }
            }
        }

        (i == path.len()).then_some(params)
    }

    /// Whether some path could match both patterns.
    pub fn overlaps(&self, other: &RoutePattern, mode: NumericMode) -> bool {
        let a = self.atoms();
        let b = other.atoms();
        let mut i = 0;

        loop {
            match (a.get(i), b.get(i)) {
                (None, None) => return true,
                (Some(Atom::Rest), Some(_)) | (Some(_), Some(Atom::Rest)) => return true,
                (Some(_), None) | (None, Some(_)) => return false,
                (Some(x), Some(y)) => {
                    if !x.compatible(y, mode) {
                        return false;
                    }
                }
            }
            i += 1;
        }
    }

    fn atoms(&self) -> Vec<Atom> {
        let mut atoms = Vec::with_capacity(self.segments.len() + 1);
        for segment in &self.segments {
            match *segment {
                Segment::Literal(lit) => atoms.push(Atom::Literal(lit)),
                Segment::NumericId(_) => atoms.push(Atom::Numeric),
                Segment::ExternalId(_) => {
                    atoms.push(Atom::Literal(EXTERNAL_ID_LITERAL));
                    atoms.push(Atom::Any);
                }
                Segment::Token(_) => atoms.push(Atom::Any),
                Segment::Rest(_) => atoms.push(Atom::Rest),
            }
        }
        atoms
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.template.trim_matches('/'))
    }
}

/// One path position as seen by the overlap check.
#[derive(Debug, Clone, Copy)]
enum Atom {
    Literal(&'static str),
    Numeric,
    Any,
    Rest,
}

impl Atom {
    fn compatible(&self, other: &Atom, mode: NumericMode) -> bool {
        match (self, other) {
            (Atom::Any, _) | (_, Atom::Any) => true,
            (Atom::Rest, _) | (_, Atom::Rest) => true,
            (Atom::Literal(a), Atom::Literal(b)) => a == b,
            (Atom::Numeric, Atom::Numeric) => true,
            (Atom::Literal(lit), Atom::Numeric) | (Atom::Numeric, Atom::Literal(lit)) => {
                mode == NumericMode::Lenient || is_decimal(lit)
            }
        }
    }
}

pub(crate) fn is_decimal(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn placeholder(part: &'static str) -> Option<&'static str> {
    part.strip_prefix('{')?.strip_suffix('}')
}

fn is_plain_name(inner: &str) -> bool {
    !inner.is_empty() && !inner.ends_with('#') && !inner.ends_with("..")
}

fn parse_placeholder(template: &str, inner: &'static str) -> Result<Segment> {
    let (segment, name) = if let Some(name) = inner.strip_suffix('#') {
        (Segment::NumericId(name), name)
    } else if let Some(name) = inner.strip_suffix("..") {
        (Segment::Rest(name), name)
    } else {
        (Segment::Token(inner), inner)
    };

    if name.is_empty() {
        return Err(Error::InvalidRoute(format!(
            "pattern '{template}' has an unnamed placeholder"
        )));
    }
    Ok(segment)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segs(path: &str) -> Vec<String> {
        path.split('/').map(String::from).collect()
    }

    #[test]
    fn parses_placeholders_and_external_ids() {
        let pattern = RoutePattern::parse("loans/external-id/{loanExternalId}/charges/{chargeId#}")
            .unwrap();
        assert_eq!(
            pattern.segments(),
            &[
                Segment::Literal("loans"),
                Segment::ExternalId("loanExternalId"),
                Segment::Literal("charges"),
                Segment::NumericId("chargeId"),
            ]
        );
        assert_eq!(pattern.literal_count(), 3);
        assert!(pattern.is_exact_length());
    }

    #[test]
    fn lenient_ids_never_take_reserved_words() {
        let pattern = RoutePattern::parse("loans/{loanId#}").unwrap();
        assert!(pattern.matches(&segs("loans/abc"), NumericMode::Lenient).is_some());
        assert!(pattern.matches(&segs("loans/external-id"), NumericMode::Lenient).is_none());
        assert!(pattern.matches(&segs("loans/template"), NumericMode::Lenient).is_none());
    }

    #[test]
    fn rejects_misplaced_wildcard_and_empty_pattern() {
        assert!(matches!(
            RoutePattern::parse("datatables/{path..}/x"),
            Err(Error::InvalidRoute(_))
        ));
        assert!(matches!(RoutePattern::parse("/"), Err(Error::InvalidRoute(_))));
        assert!(matches!(RoutePattern::parse("loans/{#}"), Err(Error::InvalidRoute(_))));
    }

    #[test]
    fn strict_numeric_requires_digits() {
        let pattern = RoutePattern::parse("loans/{loanId#}/transactions/{transactionId#}").unwrap();
        assert!(pattern
            .matches(&segs("loans/42/transactions/99"), NumericMode::Strict)
            .is_some());
        assert!(pattern
            .matches(&segs("loans/abc/transactions/99"), NumericMode::Strict)
            .is_none());
        assert!(pattern
            .matches(&segs("loans/abc/transactions/99"), NumericMode::Lenient)
            .is_some());
    }

    #[test]
    fn strict_numeric_tolerates_glued_query() {
        let pattern = RoutePattern::parse("loans/{loanId#}").unwrap();
        let params = pattern
            .matches(&segs("loans/42?command=approve"), NumericMode::Strict)
            .unwrap();
        assert_eq!(
            params.get("loanId"),
            Some(&Captured::Numeric("42?command=approve".into()))
        );
    }

    #[test]
    fn wildcard_needs_at_least_one_segment() {
        let pattern = RoutePattern::parse("datatables/{datatable}/{path..}").unwrap();
        assert!(pattern
            .matches(&segs("datatables/dt"), NumericMode::Strict)
            .is_none());
        let params = pattern
            .matches(&segs("datatables/dt/a/b"), NumericMode::Strict)
            .unwrap();
        assert_eq!(
            params.get("path"),
            Some(&Captured::Rest(vec!["a".into(), "b".into()]))
        );
    }

    #[test]
    fn overlap_depends_on_numeric_mode() {
        let numeric = RoutePattern::parse("loans/{loanId#}/charges").unwrap();
        let external = RoutePattern::parse("loans/external-id/{loanExternalId}").unwrap();
        assert!(!numeric.overlaps(&external, NumericMode::Strict));
        assert!(numeric.overlaps(&external, NumericMode::Lenient));
    }

    #[test]
    fn wildcard_overlaps_longer_patterns() {
        let rest = RoutePattern::parse("datatables/{datatable}/{path..}").unwrap();
        let entry = RoutePattern::parse("datatables/{datatable}/{appTableId#}/{id#}").unwrap();
        let short = RoutePattern::parse("datatables/{datatable}").unwrap();
        assert!(rest.overlaps(&entry, NumericMode::Strict));
        assert!(!rest.overlaps(&short, NumericMode::Strict));
    }
}
