#![forbid(unsafe_code)]

use tracing::{debug, info};

use crate::model::NavSignal;

/// A detected location change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: Option<String>,
    pub to: String,
    pub signal: NavSignal,
}

/// Turns host navigation signals into at most one transition per distinct location.
#[derive(Debug, Default)]
pub struct NavigationWatcher {
    previous: Option<String>,
}

impl NavigationWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn previous(&self) -> Option<&str> {
        self.previous.as_deref()
    }

    /// Compare `location` with the last one seen. `previous` is updated before
    /// the transition is returned so renders triggered by it read as no-ops.
    pub fn observe(&mut self, signal: NavSignal, location: &str) -> Option<Transition> {
        if self.previous.as_deref() == Some(location) {
            debug!(?signal, location, "nav: location unchanged");
            return None;
        }
        let from = self.previous.replace(location.to_string());
        info!(?signal, from = from.as_deref().unwrap_or("-"), to = location, "nav: location changed");
        Some(Transition { from, to: location.to_string(), signal })
    }
}
