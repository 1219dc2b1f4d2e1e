//! Flow states and the guarded transitions between them.

use crate::types::OperationId;

/// Prefix of every failure message shown to users.
pub const FAILURE_PREFIX: &str = "Oops... ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowStatus {
    Idle,
    Running,
    Success,
    Failure,
}

impl FlowStatus {
    /// True for `Success` and `Failure`.
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Success | Self::Failure)
    }
}

/// View model of one orchestrated action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowView {
    pub status: FlowStatus,
    /// Progress note while running, outcome text once settled.
    pub message: String,
    /// Index into `steps` of the step being executed.
    pub current_step: usize,
    pub steps: Vec<String>,
    /// Backend operation the current step is waiting on.
    pub current_operation: Option<OperationId>,
    /// Number of times the sequence was started.
    pub attempts: u32,
}

impl FlowView {
    pub fn new(steps: Vec<String>) -> Self {
        Self {
            status: FlowStatus::Idle,
            message: String::new(),
            current_step: 0,
            steps,
            current_operation: None,
            attempts: 0,
        }
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn step_label(&self) -> Option<&str> {
        self.steps.get(self.current_step).map(String::as_str)
    }

    /// `Idle | Failure -> Running`. Any other state ignores the trigger.
    pub fn begin(&mut self) -> bool {
        if !matches!(self.status, FlowStatus::Idle | FlowStatus::Failure) {
            return false;
        }
        self.start();
        true
    }

    /// `Failure -> Running`, restarting from the first step.
    pub fn begin_retry(&mut self) -> bool {
        if self.status != FlowStatus::Failure {
            return false;
        }
        self.start();
        true
    }

    /// `Success | Failure -> Idle`.
    pub fn reset(&mut self) -> bool {
        if !self.status.is_settled() {
            return false;
        }
        self.status = FlowStatus::Idle;
        self.message.clear();
        self.current_step = 0;
        self.current_operation = None;
        true
    }

    pub fn enter_step(&mut self, index: usize) -> bool {
        if self.status != FlowStatus::Running {
            return false;
        }
        self.current_step = index.min(self.steps.len().saturating_sub(1));
        self.current_operation = None;
        true
    }

    pub fn track_operation(&mut self, id: OperationId) -> bool {
        if self.status != FlowStatus::Running {
            return false;
        }
        self.current_operation = Some(id);
        true
    }

    pub fn note(&mut self, message: &str) -> bool {
        if self.status != FlowStatus::Running {
            return false;
        }
        self.message = message.to_string();
        true
    }

    /// `Running -> Success`.
    pub fn succeed(&mut self, message: String) -> bool {
        if self.status != FlowStatus::Running {
            return false;
        }
        self.status = FlowStatus::Success;
        self.message = message;
        self.current_operation = None;
        true
    }

    /// `Running -> Failure`; the reason gets [`FAILURE_PREFIX`].
    pub fn fail(&mut self, reason: &str) -> bool {
        if self.status != FlowStatus::Running {
            return false;
        }
        self.status = FlowStatus::Failure;
        self.message = format!("{FAILURE_PREFIX}{reason}");
        true
    }

    fn start(&mut self) {
        self.status = FlowStatus::Running;
        self.message.clear();
        self.current_step = 0;
        self.current_operation = None;
        self.attempts += 1;
    }
}
