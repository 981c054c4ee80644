//! Task state machine

use taskq_foundation::Error;

/// Possible states of a task.
///
/// `Pending` moves exactly once to one of the three terminal states.
#[derive(Debug, Clone)]
pub enum TaskState<T> {
    /// Result not available yet
    Pending,

    /// Task completed successfully
    Succeeded(T),

    /// Task failed with an error
    Failed(Error),

    /// Task was canceled
    Canceled,
}

impl<T> TaskState<T> {
    /// Check if this is a terminal state (cannot transition further)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Pending)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, TaskState::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskState::Succeeded(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, TaskState::Failed(_))
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, TaskState::Canceled)
    }

    /// Get display name for the state
    pub fn display_name(&self) -> &'static str {
        match self {
            TaskState::Pending => "Pending",
            TaskState::Succeeded(_) => "Succeeded",
            TaskState::Failed(_) => "Failed",
            TaskState::Canceled => "Canceled",
        }
    }
}

impl<T> std::fmt::Display for TaskState<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}
