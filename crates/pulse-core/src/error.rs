#![forbid(unsafe_code)]

//! Fault types raised while running collaborator code.
//!
//! A [`HandlerFault`] is never propagated out of a dispatch pass. It is
//! logged, counted and handed back to the caller inside the pass report so
//! tests and diagnostics can inspect it.

use std::any::Any;

use thiserror::Error;

/// How a piece of collaborator code failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FaultKind {
    /// The handler returned `Err`.
    #[error("returned error: {0}")]
    Error(String),
    /// The handler panicked; the payload message is preserved when it is a string.
    #[error("panicked: {0}")]
    Panic(String),
}

impl FaultKind {
    /// Build a fault from a `catch_unwind` payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "unknown panic".to_string()
        };
        Self::Panic(message)
    }

    /// True when the fault came from a panic rather than an `Err` return.
    #[inline]
    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panic(_))
    }
}

/// A failure isolated during a dispatch pass.
///
/// Carries the handler's display name and the call site (`"tick"`, `"idle"`,
/// `"single-action"`, ...) so log lines can be traced back to a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler '{handler}' failed during {site}: {kind}")]
pub struct HandlerFault {
    /// Display name of the failing handler.
    pub handler: String,
    /// Call site that was dispatching.
    pub site: &'static str,
    /// What went wrong.
    pub kind: FaultKind,
}

impl HandlerFault {
    /// Create a new fault record.
    pub fn new(handler: impl Into<String>, site: &'static str, kind: FaultKind) -> Self {
        Self {
            handler: handler.into(),
            site,
            kind,
        }
    }

    /// Short stable label for logs and counters.
    pub fn as_label(&self) -> &'static str {
        match self.kind {
            FaultKind::Error(_) => "handler_error",
            FaultKind::Panic(_) => "handler_panic",
        }
    }
}

/// Boxed error type returned by handlers.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_payload_str_is_preserved() {
        let kind = FaultKind::from_panic(Box::new("boom"));
        assert_eq!(kind, FaultKind::Panic("boom".into()));
        assert!(kind.is_panic());
    }

    #[test]
    fn panic_payload_string_is_preserved() {
        let kind = FaultKind::from_panic(Box::new(String::from("owned boom")));
        assert_eq!(kind, FaultKind::Panic("owned boom".into()));
    }

    #[test]
    fn panic_payload_other_type_is_unknown() {
        let kind = FaultKind::from_panic(Box::new(42_u32));
        assert_eq!(kind, FaultKind::Panic("unknown panic".into()));
    }

    #[test]
    fn fault_display_names_handler_and_site() {
        let fault = HandlerFault::new("status-bar", "tick", FaultKind::Error("offline".into()));
        assert_eq!(
            fault.to_string(),
            "handler 'status-bar' failed during tick: returned error: offline"
        );
        assert_eq!(fault.as_label(), "handler_error");
    }
}
