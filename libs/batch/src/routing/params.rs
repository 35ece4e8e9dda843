//! Raw path captures

/// A raw capture, as it appeared in the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Captured {
    Numeric(String),
    ExternalId(String),
    Token(String),
    Rest(Vec<String>),
}

/// Raw captures of a matched route, in pattern order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchedParams {
    captures: Vec<(&'static str, Captured)>,
}

impl MatchedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: &'static str, value: Captured) {
        self.captures.push((name, value));
    }

    pub fn get(&self, name: &str) -> Option<&Captured> {
        self.captures
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| c)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Captured)> {
        self.captures.iter().map(|(n, c)| (*n, c))
    }

    pub fn len(&self) -> usize {
        self.captures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.captures.is_empty()
    }
}
