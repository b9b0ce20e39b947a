//! Error types for patch domains, ghost exchange and multigrid cycles.
//!
//! Every failure surfaces through [`Error`]. The variants follow the three fatal classes of
//! the solver: configuration errors found while building a hierarchy, protocol errors found
//! while exchanging messages, and breakdowns of an iterative solve. Transport failures are
//! carried unchanged in [`Error::Comm`].

use crate::comm::CommError;
use thiserror::Error;

/// Errors raised by domains, ghost fillers, inter-level transfers and cycles.
#[derive(Debug, Error)]
pub enum Error {
    /// The level hierarchy or patch description is inconsistent.
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the inconsistency
        message: String,
    },

    /// A message was missing, malformed or came from an unexpected sender.
    #[error("protocol error ({}): {reason}", site(.level, .domain, .patch))]
    Protocol {
        /// Multigrid level the failure was reported from, when known
        level: Option<usize>,
        /// Id of the domain whose exchange failed
        domain: usize,
        /// Destination patch id, when the failure concerns one patch
        patch: Option<usize>,
        /// What went wrong
        reason: String,
    },

    /// An iterative or coarse solve could not make progress.
    #[error("{solver} broke down{}: {reason}", level_suffix(.level))]
    SolverBreakdown {
        /// Multigrid level the failure was reported from, when known
        level: Option<usize>,
        /// Name of the failing solver
        solver: String,
        /// What went wrong
        reason: String,
    },

    /// Two vectors or a vector and a domain disagree on their layout.
    #[error("layout mismatch: expected {expected} values, got {got}")]
    Dimension {
        /// Expected number of values
        expected: usize,
        /// Actual number of values
        got: usize,
    },

    /// The communicator failed.
    #[error(transparent)]
    Comm(#[from] CommError),
}

/// A specialized `Result` type for domain and multigrid operations.
pub type Result<T> = std::result::Result<T, Error>;

fn site(level: &Option<usize>, domain: &usize, patch: &Option<usize>) -> String {
    let mut out = String::new();
    if let Some(level) = level {
        out.push_str(&format!("level {level}, "));
    }
    out.push_str(&format!("domain {domain}"));
    if let Some(patch) = patch {
        out.push_str(&format!(", patch {patch}"));
    }
    out
}

fn level_suffix(level: &Option<usize>) -> String {
    match level {
        Some(level) => format!(" on level {level}"),
        None => String::new(),
    }
}

impl Error {
    /// Build a [`Error::Configuration`].
    pub fn config(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Build a [`Error::Protocol`] for a domain and, optionally, a destination patch.
    pub fn protocol(domain: usize, patch: Option<usize>, reason: impl Into<String>) -> Self {
        Error::Protocol {
            level: None,
            domain,
            patch,
            reason: reason.into(),
        }
    }

    /// Build a [`Error::SolverBreakdown`].
    pub fn breakdown(solver: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::SolverBreakdown {
            level: None,
            solver: solver.into(),
            reason: reason.into(),
        }
    }

    /// Attach the multigrid level to protocol and breakdown errors.
    ///
    /// The innermost level wins: a level that is already set is kept.
    pub fn at_level(self, at: usize) -> Self {
        match self {
            Error::Protocol {
                level: None,
                domain,
                patch,
                reason,
            } => Error::Protocol {
                level: Some(at),
                domain,
                patch,
                reason,
            },
            Error::SolverBreakdown {
                level: None,
                solver,
                reason,
            } => Error::SolverBreakdown {
                level: Some(at),
                solver,
                reason,
            },
            other => other,
        }
    }

    /// Returns `true` for an inconsistent hierarchy or patch description.
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Error::Configuration { .. })
    }

    /// Returns `true` for a missing, malformed or misrouted message.
    pub fn is_protocol_error(&self) -> bool {
        matches!(self, Error::Protocol { .. })
    }

    /// Returns `true` when an iterative solve broke down.
    pub fn is_breakdown_error(&self) -> bool {
        matches!(self, Error::SolverBreakdown { .. })
    }

    /// Returns `true` for transport failures.
    pub fn is_comm_error(&self) -> bool {
        matches!(self, Error::Comm(_))
    }

    /// Level attached by [`Error::at_level`], if any.
    pub fn level(&self) -> Option<usize> {
        match self {
            Error::Protocol { level, .. } | Error::SolverBreakdown { level, .. } => *level,
            _ => None,
        }
    }
}
