use smallvec::SmallVec;

use crate::context::ContextSnapshot;
use crate::model::{Model, Thenable};
use crate::wire_format::ChunkId;

/// Thenables a component used before it suspended, replayed by call order on retry.
pub type ThenableState = SmallVec<[Thenable; 4]>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Completed,
    Aborted,
    Errored,
}

pub(crate) struct Task {
    pub id: ChunkId,
    pub status: TaskStatus,
    pub model: Model,
    pub context: ContextSnapshot,
    /// Composite key of the server components already rendered above `model`.
    pub parent_key: Option<String>,
    pub thenable_state: ThenableState,
    /// Set for tasks standing in for a promise in a data position.
    pub waiting_on: Option<Thenable>,
}

impl Task {
    pub fn new(id: ChunkId, model: Model, context: ContextSnapshot) -> Self {
        Self {
            id,
            status: TaskStatus::Pending,
            model,
            context,
            parent_key: None,
            thenable_state: ThenableState::new(),
            waiting_on: None,
        }
    }

    /// Moves the task to a terminal state. Happens once per task.
    pub fn finish(&mut self, status: TaskStatus) {
        debug_assert_eq!(self.status, TaskStatus::Pending, "task {:x} finished twice", self.id);
        self.status = status;
        tracing::trace!("Task {:x} is now {:?}", self.id, self.status);
    }
}
