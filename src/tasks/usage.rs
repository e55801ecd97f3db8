use std::time::Duration;

use serde::Serialize;

/// Resources consumed by a task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ResourceUsage {
    /// Wall-clock time of the task's own execution.
    pub wall_time: Duration,
    /// CPU time (user + system) of measured processes.
    pub cpu_time: Duration,
    /// Peak resident memory in bytes.
    pub memory_bytes: u64,
}

impl ResourceUsage {
    /// Merges a measurement taken inside the task or by one of its children.
    ///
    /// CPU time adds up; memory keeps the peak; wall time stays the task's own.
    pub fn absorb(&mut self, other: &ResourceUsage) {
        self.cpu_time += other.cpu_time;
        self.memory_bytes = self.memory_bytes.max(other.memory_bytes);
    }
}
