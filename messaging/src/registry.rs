//! Process-wide view of which background tasks are currently running.
//!
//! Entries are keyed by connection, fed by the `nx/*RunningTasks`
//! notifications and torn down when the reporting connection goes away -
//! whether or not the peer managed to say goodbye. Constructed explicitly
//! and injected where needed so independent hubs (and tests) never share
//! state.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use crate::handler::ConnectionId;
use crate::types::{RunningTask, UpdatedTask};

#[derive(Debug, Default)]
pub struct RunningTasksRegistry {
    connections: Mutex<HashMap<ConnectionId, ConnectionTasks>>,
}

#[derive(Debug)]
struct ConnectionTasks {
    process_id: u32,
    tasks: HashMap<String, RunningTask>,
}

impl RunningTasksRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A peer began a run: create (or reset) its entry.
    pub fn started(&self, connection_id: &ConnectionId, process_id: u32) {
        debug!(%connection_id, process_id, "running tasks session started");
        self.connections.lock().unwrap().insert(
            connection_id.clone(),
            ConnectionTasks {
                process_id,
                tasks: HashMap::new(),
            },
        );
    }

    /// A peer finished its run. A connection reports at most one run at a
    /// time, so the process id on the wire is not consulted.
    pub fn ended(&self, connection_id: &ConnectionId) {
        debug!(%connection_id, "running tasks session ended");
        self.connections.lock().unwrap().remove(connection_id);
    }

    /// Merge a batch of task updates into a connection's entry. An update
    /// arriving before `started` creates the entry on the spot.
    pub fn update(&self, connection_id: &ConnectionId, process_id: u32, updates: Vec<UpdatedTask>) {
        let mut connections = self.connections.lock().unwrap();
        let entry = connections
            .entry(connection_id.clone())
            .or_insert_with(|| ConnectionTasks {
                process_id,
                tasks: HashMap::new(),
            });
        for update in updates {
            match update.task {
                Some(task) => {
                    entry.tasks.insert(update.task_id, task);
                }
                None => {
                    entry.tasks.remove(&update.task_id);
                }
            }
        }
    }

    /// Drop everything a closed connection reported. Runs for every close,
    /// so a peer that dies mid-run cannot leak tasks into the view.
    pub fn connection_closed(&self, connection_id: &ConnectionId) {
        if self
            .connections
            .lock()
            .unwrap()
            .remove(connection_id)
            .is_some()
        {
            debug!(%connection_id, "cleared running tasks for closed connection");
        }
    }

    /// Union of every live connection's tasks, keyed by task id, each task
    /// stamped with the connection that reported it.
    pub fn running_tasks_map(&self) -> HashMap<String, RunningTask> {
        let connections = self.connections.lock().unwrap();
        let mut map = HashMap::new();
        for (connection_id, entry) in connections.iter() {
            for (task_id, task) in entry.tasks.iter() {
                let mut task = task.clone();
                task.connection_id = Some(connection_id.clone());
                map.insert(task_id.clone(), task);
            }
        }
        map
    }

    /// Number of connections currently reporting a run.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    /// Process ids of every reporting connection, in no particular order.
    pub fn process_ids(&self) -> Vec<u32> {
        self.connections
            .lock()
            .unwrap()
            .values()
            .map(|entry| entry.process_id)
            .collect()
    }
}
