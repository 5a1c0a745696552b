//! Structured error records collected during graph execution.
//!
//! Every failure that the engine observes — a node returning an error, a
//! parallel group member timing out, the runner hitting its iteration limit —
//! is captured as an [`ErrorEvent`] and attached to the run's execution
//! metadata. Events are plain serializable data so they can be persisted with
//! checkpoints, shipped over the event bus, or rendered for humans via
//! [`pretty_print`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::telemetry::{FormatterMode, PlainFormatter, TelemetryFormatter};

// Scopes carry node/group names as plain strings so events stay
// serde-friendly end to end.

/// An error observed during execution, with scope, cause chain, tags, and
/// free-form context.
///
/// # JSON Serialization Format
///
/// `ErrorEvent` serializes to JSON with the following structure:
///
/// ```json
/// {
///   "when": "2026-08-24T10:30:00Z",
///   "scope": {
///     "scope": "node",
///     "node": "parse",
///     "step": 1
///   },
///   "error": {
///     "message": "failed to parse input",
///     "cause": {
///       "message": "invalid JSON syntax",
///       "cause": null,
///       "details": {"line": 3, "column": 15}
///     },
///     "details": {"input_length": 1024}
///   },
///   "tags": ["validation", "retryable"],
///   "context": {
///     "file": "/tmp/input.json",
///     "user_id": 12345
///   }
/// }
/// ```
///
/// The `scope` field uses a tagged union format with a discriminator field
/// named `"scope"`. Supported scope variants are:
/// - `"node"`: Requires `node` (string) and `step` (u64)
/// - `"group"`: Requires `group` (string) and `step` (u64)
/// - `"runner"`: Requires `session` (string) and `step` (u64)
/// - `"app"`: No additional fields
///
/// # Examples
///
/// Using constructors and builders:
///
/// ```
/// use stategraph::errors::{ErrorChain, ErrorEvent};
/// use serde_json::json;
///
/// let event = ErrorEvent::node("parse", 1, ErrorChain::msg("parse error"))
///     .with_tag("validation")
///     .with_context(json!({"line": 42}));
///
/// // Serialize to JSON
/// let json_str = serde_json::to_string(&event).unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ErrorEvent {
    #[serde(default = "chrono::Utc::now")]
    pub when: DateTime<Utc>,
    #[serde(default)]
    pub scope: ErrorScope,
    #[serde(default)]
    pub error: ErrorChain,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub context: serde_json::Value,
}

impl ErrorEvent {
    /// Create a node-scoped error event.
    ///
    /// # Example
    /// ```
    /// use stategraph::errors::{ErrorChain, ErrorEvent};
    ///
    /// let err = ErrorEvent::node("my_node", 1, ErrorChain::msg("something failed"));
    /// ```
    pub fn node<S: Into<String>>(node: S, step: u64, error: ErrorChain) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Node {
                node: node.into(),
                step,
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create a group-scoped error event (parallel group failures and
    /// timeouts).
    ///
    /// # Example
    /// ```
    /// use stategraph::errors::{ErrorChain, ErrorEvent};
    ///
    /// let err = ErrorEvent::group("fan_out", 5, ErrorChain::msg("group timed out"));
    /// ```
    pub fn group<S: Into<String>>(group: S, step: u64, error: ErrorChain) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Group {
                group: group.into(),
                step,
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create a runner-scoped error event.
    ///
    /// # Example
    /// ```
    /// use stategraph::errors::{ErrorChain, ErrorEvent};
    ///
    /// let err = ErrorEvent::runner("session_123", 10, ErrorChain::msg("runtime error"));
    /// ```
    pub fn runner<S: Into<String>>(session: S, step: u64, error: ErrorChain) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::Runner {
                session: session.into(),
                step,
            },
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Create an app-scoped error event.
    ///
    /// # Example
    /// ```
    /// use stategraph::errors::{ErrorChain, ErrorEvent};
    ///
    /// let err = ErrorEvent::app(ErrorChain::msg("application startup failed"));
    /// ```
    pub fn app(error: ErrorChain) -> Self {
        Self {
            when: Utc::now(),
            scope: ErrorScope::App,
            error,
            tags: Vec::new(),
            context: serde_json::Value::Null,
        }
    }

    /// Add multiple tags to this error event.
    ///
    /// # Example
    /// ```
    /// use stategraph::errors::{ErrorChain, ErrorEvent};
    ///
    /// let err = ErrorEvent::node("my_node", 1, ErrorChain::msg("invalid input"))
    ///     .with_tags(vec!["validation".to_string(), "critical".to_string()]);
    /// ```
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Add a single tag to this error event.
    ///
    /// # Example
    /// ```
    /// use stategraph::errors::{ErrorChain, ErrorEvent};
    ///
    /// let err = ErrorEvent::node("my_node", 1, ErrorChain::msg("invalid input"))
    ///     .with_tag("validation");
    /// ```
    pub fn with_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add context metadata to this error event.
    ///
    /// # Example
    /// ```
    /// use stategraph::errors::{ErrorChain, ErrorEvent};
    /// use serde_json::json;
    ///
    /// let err = ErrorEvent::node("my_node", 1, ErrorChain::msg("invalid input"))
    ///     .with_context(json!({"field": "username", "value": ""}));
    /// ```
    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }
}

/// Where in the engine an error was observed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum ErrorScope {
    Node {
        node: String,
        step: u64,
    },
    Group {
        group: String,
        step: u64,
    },
    Runner {
        session: String,
        step: u64,
    },
    #[default]
    App,
}

/// A message with an optional chained cause, mirroring how `std::error::Error`
/// sources nest but staying serializable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorChain {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorChain>>,
    #[serde(default)]
    pub details: serde_json::Value,
}

impl Default for ErrorChain {
    fn default() -> Self {
        ErrorChain {
            message: String::new(),
            cause: None,
            details: serde_json::Value::Null,
        }
    }
}

impl std::fmt::Display for ErrorChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ErrorChain {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c as &dyn std::error::Error)
    }
}

impl ErrorChain {
    pub fn msg<M: Into<String>>(m: M) -> Self {
        ErrorChain {
            message: m.into(),
            cause: None,
            details: serde_json::Value::Null,
        }
    }

    /// Capture an existing error value, walking its `source()` chain into
    /// nested causes.
    pub fn from_error(err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = ErrorChain::msg(err.to_string());
        if let Some(src) = err.source() {
            chain.cause = Some(Box::new(ErrorChain::from_error(src)));
        }
        chain
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }

    pub fn with_cause(mut self, cause: ErrorChain) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

/// Format error events with explicit color mode control.
///
/// This function allows you to control whether ANSI color codes are included
/// in the output:
/// - [`FormatterMode::Auto`]: Auto-detects TTY capability (checks stderr)
/// - [`FormatterMode::Colored`]: Always includes color codes
/// - [`FormatterMode::Plain`]: Never includes color codes
///
/// # Examples
///
/// ```
/// use stategraph::errors::{pretty_print_with_mode, ErrorChain, ErrorEvent};
/// use stategraph::telemetry::FormatterMode;
///
/// let events = vec![
///     ErrorEvent::node("parser", 1, ErrorChain::msg("parse failed"))
/// ];
///
/// // Force plain output (no colors) for log files
/// let plain = pretty_print_with_mode(&events, FormatterMode::Plain);
/// assert!(!plain.contains("\x1b[")); // No ANSI codes
///
/// // Force colored output
/// let colored = pretty_print_with_mode(&events, FormatterMode::Colored);
/// ```
pub fn pretty_print_with_mode(events: &[ErrorEvent], mode: FormatterMode) -> String {
    let formatter = PlainFormatter::with_mode(mode);
    let renders = formatter.render_errors(events);
    let mut out = String::new();
    for (idx, render) in renders.into_iter().enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        for line in render.lines {
            out.push_str(&line);
        }
    }
    out
}

/// Format error events as human-readable text with auto-detected color
/// support.
///
/// Colors are automatically enabled when stderr is a TTY and disabled
/// otherwise. For explicit control over color output, use
/// [`pretty_print_with_mode`].
///
/// # Examples
///
/// ```
/// use stategraph::errors::{pretty_print, ErrorChain, ErrorEvent};
///
/// let events = vec![
///     ErrorEvent::node("parser", 1, ErrorChain::msg("parse failed"))
/// ];
///
/// let output = pretty_print(&events);
/// // Colors automatically detected based on stderr TTY status
/// ```
pub fn pretty_print(events: &[ErrorEvent]) -> String {
    pretty_print_with_mode(events, FormatterMode::Auto)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_constructor_sets_scope() {
        let event = ErrorEvent::node("parse", 3, ErrorChain::msg("boom"));
        assert_eq!(
            event.scope,
            ErrorScope::Node {
                node: "parse".to_string(),
                step: 3
            }
        );
        assert_eq!(event.error.message, "boom");
        assert!(event.tags.is_empty());
    }

    #[test]
    fn serde_roundtrip_preserves_chain() {
        let event = ErrorEvent::group(
            "fan_out",
            2,
            ErrorChain::msg("member failed")
                .with_cause(ErrorChain::msg("timeout").with_details(json!({"ms": 30000}))),
        )
        .with_tag("parallel")
        .with_context(json!({"members": 3}));

        let encoded = serde_json::to_string(&event).unwrap();
        let decoded: ErrorEvent = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, event);
        let cause = decoded.error.cause.as_ref().unwrap();
        assert_eq!(cause.message, "timeout");
        assert_eq!(cause.details, json!({"ms": 30000}));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let decoded: ErrorEvent = serde_json::from_str(r#"{"scope":{"scope":"app"}}"#).unwrap();
        assert_eq!(decoded.scope, ErrorScope::App);
        assert_eq!(decoded.error, ErrorChain::default());
        assert_eq!(decoded.context, serde_json::Value::Null);
    }

    #[test]
    fn from_error_walks_sources() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing file");
        let chain = ErrorChain::from_error(&io);
        assert_eq!(chain.message, "missing file");
        assert!(chain.cause.is_none());
    }
}
