use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure modes of network assembly, solving and scenario execution.
#[derive(Debug, Error)]
pub enum Error {
    /// No in-service bus is typed as the slack.
    #[error("network has no slack bus")]
    NoSlack,

    /// More than one in-service bus is typed as the slack.
    #[error("network has {count} slack buses, expected exactly one")]
    MultipleSlack { count: usize },

    /// Participation factors of the online units sum to zero while an
    /// imbalance must be redistributed across them.
    #[error("participation factors sum to zero, cannot redistribute {imbalance_mw:.4} MW")]
    ZeroParticipation { imbalance_mw: f64 },

    /// A disconnection time specification could not be resolved to a step.
    #[error("invalid disconnection time {spec:?}: {reason}")]
    InvalidDisconnectTime { spec: String, reason: String },

    /// The Jacobian could not be factorized at some Newton iteration.
    #[error("singular Jacobian at iteration {iterations}")]
    SingularJacobian { iterations: usize },

    /// Newton-Raphson ran out of iterations above tolerance.
    #[error("power flow did not converge in {iterations} iterations (max mismatch {max_mismatch:.3e})")]
    NonConvergence { iterations: usize, max_mismatch: f64 },

    /// Every generating unit in the island is offline.
    #[error("blackout at step {step}: no online generation")]
    Blackout { step: usize },

    /// A summary was requested from a scenario that recorded no steps.
    #[error("scenario produced no results")]
    NoResults,
}
