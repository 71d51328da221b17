use std::collections::HashMap;
use std::sync::Mutex;

use crate::{AgentMessage, PendingToolCalls};

/// Thread state as last committed by the runtime.
#[derive(Debug, Clone, Default)]
pub(crate) struct Checkpoint {
    pub(crate) messages: Vec<AgentMessage>,
    /// Tool calls suspended behind unanswered interrupts.
    pub(crate) pending: Option<PendingToolCalls>,
}

pub(crate) trait Checkpointer: Send + Sync {
    fn load(&self, thread_id: &str) -> Option<Checkpoint>;
    fn save(&self, thread_id: &str, checkpoint: Checkpoint);
}

/// Process-lifetime checkpoints, one per thread id.
#[derive(Default)]
pub(crate) struct MemoryCheckpointer {
    threads: Mutex<HashMap<String, Checkpoint>>,
}

impl Checkpointer for MemoryCheckpointer {
    fn load(&self, thread_id: &str) -> Option<Checkpoint> {
        let threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        threads.get(thread_id).cloned()
    }

    fn save(&self, thread_id: &str, checkpoint: Checkpoint) {
        let mut threads = self.threads.lock().unwrap_or_else(|e| e.into_inner());
        threads.insert(thread_id.to_string(), checkpoint);
    }
}
