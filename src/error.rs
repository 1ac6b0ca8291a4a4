use thiserror::Error;

/// Failures the target calculator and the daily aggregator report.
///
/// Providers never return these to their subscribers; they publish the
/// rendered message as the `error` of their state instead.
#[derive(Debug, Error)]
pub enum PlanError {
    /// No profile document exists for the user.
    #[error("profile not found for user {uid}")]
    ProfileNotFound { uid: String },

    /// The profile exists but weight or height cannot be resolved.
    #[error("profile incomplete: {reason}")]
    ProfileIncomplete { reason: &'static str },

    /// A computation was requested with no signed-in user.
    #[error("not authenticated")]
    NotAuthenticated,

    /// The document store could not be read.
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
