//! Route descriptors and specificity

use std::fmt;

use crate::catalog::Operation;
use crate::model::Method;

/// How a route treats the `command` query parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandRule {
    /// Optional; forwarded to the strategy when present.
    Ignored,
    /// Required and restricted to the listed values.
    OneOf(&'static [&'static str]),
}

impl CommandRule {
    /// Check a command against the rule.
    ///
    /// Returns `None` when the route does not accept it, otherwise the command to forward.
    /// Discriminated routes compare the trimmed value exactly against the registered ones.
    pub fn accept(&self, command: Option<&str>) -> Option<Option<String>> {
        match self {
            CommandRule::Ignored => Some(command.map(str::to_string)),
            CommandRule::OneOf(values) => {
                let command = command?.trim();
                values
                    .iter()
                    .find(|v| ***v == *command)
                    .map(|v| Some((*v).to_string()))
            }
        }
    }

    pub fn is_discriminated(&self) -> bool {
        matches!(self, CommandRule::OneOf(_))
    }

    /// Whether some command value is accepted by both rules.
    pub fn overlaps(&self, other: &CommandRule) -> bool {
        match (self, other) {
            (CommandRule::Ignored, _) | (_, CommandRule::Ignored) => true,
            (CommandRule::OneOf(a), CommandRule::OneOf(b)) => a
                .iter()
                .any(|x| b.contains(x)),
        }
    }

    pub fn values(&self) -> &'static [&'static str] {
        match self {
            CommandRule::Ignored => &[],
            CommandRule::OneOf(values) => values,
        }
    }
}

/// A routable entry: method, path template, command rule and the operation it performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub method: Method,
    pub pattern: &'static str,
    pub command: CommandRule,
    pub operation: Operation,
}

impl RouteDescriptor {
    pub const fn new(method: Method, pattern: &'static str, operation: Operation) -> Self {
        Self {
            method,
            pattern,
            command: CommandRule::Ignored,
            operation,
        }
    }

    pub const fn with_commands(mut self, commands: &'static [&'static str]) -> Self {
        self.command = CommandRule::OneOf(commands);
        self
    }
}

impl fmt::Display for RouteDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.pattern)?;
        if let CommandRule::OneOf(values) = self.command {
            write!(f, "?command={}", values.join("|"))?;
        }
        write!(f, " -> {}", self.operation)
    }
}

/// Ranking of overlapping candidates; the greater value wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Specificity {
    pub literals: usize,
    pub exact_length: bool,
    pub discriminated: bool,
}
