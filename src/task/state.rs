//! Task lifecycle state machine

use crate::error::ErrorCode;
use serde::Serialize;

/// Lifecycle state of an upload task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Idle,
    Running,
    Aborting,
    Done,
}

/// Lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEvent {
    Start,
    Stop,
    Finish,
}

impl TaskState {
    /// Apply `event`, returning the next state
    ///
    /// `aborted` is the task's abort flag, which may be raised while idle.
    /// Only `Start` can fail; `Stop` and `Finish` are idempotent.
    pub fn transition(self, event: TaskEvent, aborted: bool) -> Result<TaskState, ErrorCode> {
        match (self, event) {
            (TaskState::Idle, TaskEvent::Start) if aborted => Err(ErrorCode::TaskAlreadyAborted),
            (TaskState::Idle, TaskEvent::Start) => Ok(TaskState::Running),
            (_, TaskEvent::Start) => Err(ErrorCode::TaskAlreadyExecuted),

            (TaskState::Running, TaskEvent::Stop) => Ok(TaskState::Aborting),
            (state, TaskEvent::Stop) => Ok(state),

            (TaskState::Running | TaskState::Aborting, TaskEvent::Finish) => Ok(TaskState::Done),
            (state, TaskEvent::Finish) => Ok(state),
        }
    }
}
