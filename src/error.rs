use std::{fmt::Display, path::PathBuf};

use thiserror::Error;
use uuid::Uuid;

/// Where in the source text something went wrong.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
    /// The source line containing the error, without its line terminator.
    pub excerpt: String,
}

impl Location {
    pub fn from_offset(input: &str, offset: usize) -> Self {
        let offset = offset.min(input.len());
        let before = &input[..offset];
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let line_end = input[offset..]
            .find('\n')
            .map_or(input.len(), |i| offset + i);
        let line = before.matches('\n').count() + 1;
        let column = input[line_start..offset].chars().count() + 1;
        let excerpt = input[line_start..line_end].trim_end_matches('\r').to_owned();
        Location {
            line,
            column,
            excerpt,
        }
    }

    /// Location used for nodes that were never part of the source text.
    pub(crate) fn synthesized() -> Self {
        Location {
            line: 0,
            column: 0,
            excerpt: String::new(),
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{} `{}`", self.line, self.column, self.excerpt.trim())
    }
}

/// S-expression and document grammar errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Empty input")]
    Empty,
    #[error("Unexpected end of input, list opened at {at} is never closed")]
    UnclosedList { at: Location },
    #[error("Unbalanced `)` at {at}")]
    UnbalancedClose { at: Location },
    #[error("Unterminated string at {at}")]
    UnterminatedString { at: Location },
    #[error("Invalid token {found:?} at {at}")]
    InvalidToken { found: String, at: Location },
    #[error("Expected a list at {at}")]
    ExpectedList { at: Location },
    #[error("Trailing content after the root list at {at}")]
    TrailingContent { at: Location },
    #[error("Expected {expected}, found {found} at {at}")]
    UnexpectedNode {
        expected: String,
        found: String,
        at: Location,
    },
    #[error("SExpr ({child}) not found in ({parent}) at {at}")]
    MissingChild {
        child: String,
        parent: String,
        at: Location,
    },
}

/// Errors raised by [`crate::Document`] operations
#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Reference {0} is already in use")]
    ReferenceCollision(String),
    #[error("Pin {pin} not found on {reference}")]
    PinNotFound { reference: String, pin: String },
    #[error("Component {0} not found")]
    ComponentNotFound(String),
    #[error("Library symbol {0} could not be resolved")]
    UnresolvedLibrarySymbol(String),
    #[error("Unit {unit} does not exist on {lib_id}")]
    InvalidUnit { lib_id: String, unit: u32 },
    #[error("Missing required field {0}")]
    MissingField(&'static str),
    #[error("Id {0} is already used by another element")]
    DuplicateId(Uuid),
    #[error("No tree anchor for {kind} {id}")]
    SyncConsistency { kind: &'static str, id: Uuid },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_counts_lines_and_columns() {
        let input = "(a\n  (b c)\n  d)";
        let loc = Location::from_offset(input, input.find('c').unwrap());
        assert_eq!(loc.line, 2);
        assert_eq!(loc.column, 6);
        assert_eq!(loc.excerpt, "  (b c)");
    }

    #[test]
    fn location_clamps_past_the_end() {
        let loc = Location::from_offset("(a", 10);
        assert_eq!(loc.line, 1);
        assert_eq!(loc.column, 3);
    }
}
