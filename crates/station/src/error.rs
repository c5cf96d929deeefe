use mes_core::error::CoreError;
use mes_core::types::CommandId;
use mes_db::StoreError;

/// Failure of a lifecycle command.
///
/// Every variant except [`Remote`](LifecycleError::Remote) is raised before
/// any remote write.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// The command is not allowed in the current state, or its input is
    /// invalid.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The order is active on another machine; start setup again with an
    /// override to take it.
    #[error("Order {order_code} is already in use on machine {machine_name}")]
    OrderInUse {
        order_code: String,
        machine_name: String,
    },

    /// A previous multi-step command failed part-way and must be retried or
    /// discarded first.
    #[error("Command {command_id} is pending: retry or discard it first")]
    CommandPending { command_id: CommandId },

    #[error("No pending command to retry")]
    NoPendingCommand,

    /// A remote step failed. Local state was left untouched.
    #[error("Remote step '{step}' failed, reconcile the machine manually or retry: {source}")]
    Remote {
        step: &'static str,
        #[source]
        source: StoreError,
    },
}

/// Convenience type alias for command results.
pub type LifecycleResult<T> = Result<T, LifecycleError>;

impl LifecycleError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Map a store error to [`Remote`](LifecycleError::Remote) for `step`.
    pub(crate) fn remote(step: &'static str) -> impl FnOnce(StoreError) -> Self {
        move |source| Self::Remote { step, source }
    }
}

impl From<CoreError> for LifecycleError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(msg) => Self::Validation(msg),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for LifecycleError {
    fn from(errors: validator::ValidationErrors) -> Self {
        CoreError::from(errors).into()
    }
}
