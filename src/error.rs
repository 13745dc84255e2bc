//! Structured error types for the repacker.
//!
//! Four variants cover the real failure sources: malformed input from the
//! upstream serializer, a graph that cannot be topologically ordered, a
//! bias that exceeds the offset it would be subtracted from, and offsets
//! that no ordering managed to shrink into their fields.

use std::fmt;

/// The unified error type returned by all public repacker API functions.
#[derive(Debug)]
pub enum RepackError {
    /// The packed object list failed validation: inverted payload anchors,
    /// a link position outside its parent's payload, or a child index out
    /// of range.
    InvalidInput(String),
    /// The object graph is disconnected or cyclic; a topological ordering
    /// covering every object does not exist.
    GraphStructure(String),
    /// A link's bias exceeded the raw offset it would be subtracted from.
    /// The upstream serializer guarantees this never happens for orderings
    /// it produced itself, so this indicates a broken input graph.
    OffsetUnderflow { parent: usize, child: usize },
    /// Emission finished, but at least one offset field could not represent
    /// its distance. Reported by the sink, never thrown by the driver.
    OverflowUnresolved { count: usize },
    /// A JSON graph description failed to parse.
    ParseError {
        source: serde_json::Error,
        hint: String,
    },
}

impl fmt::Display for RepackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepackError::InvalidInput(msg) => write!(f, "Invalid object list: {}", msg),
            RepackError::GraphStructure(msg) => write!(f, "Graph structure error: {}", msg),
            RepackError::OffsetUnderflow { parent, child } => write!(
                f,
                "Offset underflow: bias on the link {} -> {} exceeds the raw offset",
                parent, child
            ),
            RepackError::OverflowUnresolved { count } => write!(
                f,
                "{} offset field(s) still overflow after repacking",
                count
            ),
            RepackError::ParseError { source, hint } => {
                write!(f, "Failed to parse graph description: {}", source)?;
                if !hint.is_empty() {
                    write!(f, "\n  Hint: {}", hint)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for RepackError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RepackError::ParseError { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for RepackError {
    fn from(e: serde_json::Error) -> Self {
        let hint = match e.classify() {
            serde_json::error::Category::Syntax => {
                "Check for trailing commas, missing quotes, or unescaped characters.".to_string()
            }
            serde_json::error::Category::Data => {
                "The JSON is valid but doesn't match the graph description schema. Check field names and types.".to_string()
            }
            serde_json::error::Category::Eof => {
                "Unexpected end of input — is the JSON truncated?".to_string()
            }
            serde_json::error::Category::Io => String::new(),
        };
        RepackError::ParseError { source: e, hint }
    }
}
