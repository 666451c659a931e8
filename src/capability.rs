//! Injected numeric capability.
//!
//! Training and prediction ask the backend whether numeric routines can run
//! before doing any work, so a host without them degrades to typed
//! `Unavailable` errors instead of failing somewhere inside a fit.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ModelError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Availability {
    Available,
    Unavailable(String),
}

impl Availability {
    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }
}

impl fmt::Display for Availability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Availability::Available => write!(f, "available"),
            Availability::Unavailable(reason) => write!(f, "unavailable ({})", reason),
        }
    }
}

pub trait NumericBackend: Send + Sync + fmt::Debug {
    fn name(&self) -> &str;

    fn availability(&self) -> Availability;

    /// `Ok(())` when available, otherwise [`ModelError::Unavailable`]
    fn ensure_available(&self) -> Result<(), ModelError> {
        match self.availability() {
            Availability::Available => Ok(()),
            Availability::Unavailable(reason) => {
                Err(ModelError::Unavailable(format!("{}: {}", self.name(), reason)))
            }
        }
    }
}

/// Pure-Rust routines compiled into the crate
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinBackend;

impl NumericBackend for BuiltinBackend {
    fn name(&self) -> &str {
        "builtin"
    }

    fn availability(&self) -> Availability {
        Availability::Available
    }
}

/// Backend that always reports the given reason; used to run the core in a
/// degraded mode
#[derive(Debug, Clone)]
pub struct UnavailableBackend {
    reason: String,
}

impl UnavailableBackend {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl NumericBackend for UnavailableBackend {
    fn name(&self) -> &str {
        "unavailable"
    }

    fn availability(&self) -> Availability {
        Availability::Unavailable(self.reason.clone())
    }
}
