//! Service lifecycle status.

/// Lifecycle state of a background service.
///
/// Transitions only ever follow Stopped -> Running -> Stopping -> Stopped.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ServiceStatus {
    /// Not running; the initial and terminal state.
    #[default]
    Stopped,

    /// The background loop is active.
    Running,

    /// Stop requested; the loop has not observed it yet.
    Stopping,
}

impl ServiceStatus {
    /// Returns true while the service has a live background loop.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running | Self::Stopping)
    }
}

impl std::fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Running => write!(f, "Running"),
            Self::Stopping => write!(f, "Stopping"),
        }
    }
}
