use thiserror::Error;

/// Failures of duty management. Handlers map these onto HTTP 400 responses
/// with the message as-is.
#[derive(Debug, Error)]
pub enum DutyError {
    #[error(
        "Existing duty from other user is still ongoing and must be cleared first \
         before starting new duty."
    )]
    CannotStartOverOngoingDuty,

    #[error(
        "Ongoing duty hasn't reached the duty end time. Either wait for duty to \
         finish at |{duty_end}| or force clear."
    )]
    CannotClearUnfinishedDuty { duty_end: String },

    #[error("Maximum duty count handled by manager is reached. Cannot add more duty.")]
    MaxDutyCount,

    #[error("User still has an unfinished duty and cannot start another one.")]
    UnfinishedDuty,

    #[error("Duty {0} is not registered in manager.")]
    NotRegistered(i64),

    #[error(transparent)]
    Database(#[from] anyhow::Error),
}
