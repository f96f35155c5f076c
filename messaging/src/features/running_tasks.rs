//! `nx/*RunningTasks` bookkeeping and the `ide/getRunningTasks` read side.
//!
//! The close callback rides on the started-tasks registration: whatever a
//! connection reported is dropped the moment it goes away, `ended` or not.

use std::sync::Arc;

use crate::handler::{HandlerRegistration, NotificationRegistration, RequestRegistration};
use crate::registry::RunningTasksRegistry;
use crate::types::{GetRunningTasksResponse, UpdatedTask, methods};

pub fn registrations(registry: Arc<RunningTasksRegistry>) -> Vec<HandlerRegistration> {
    vec![
        started(registry.clone()),
        ended(registry.clone()),
        updated(registry.clone()),
        get_running_tasks(registry),
    ]
}

fn started(registry: Arc<RunningTasksRegistry>) -> HandlerRegistration {
    let close_registry = registry.clone();
    NotificationRegistration::new(methods::NX_STARTED_RUNNING_TASKS, move |connection_id| {
        let registry = registry.clone();
        move |process_id: u32| registry.started(&connection_id, process_id)
    })
    .on_close(move |connection_id| close_registry.connection_closed(connection_id))
    .into()
}

fn ended(registry: Arc<RunningTasksRegistry>) -> HandlerRegistration {
    NotificationRegistration::new(methods::NX_ENDED_RUNNING_TASKS, move |connection_id| {
        let registry = registry.clone();
        move |_process_id: u32| registry.ended(&connection_id)
    })
    .into()
}

fn updated(registry: Arc<RunningTasksRegistry>) -> HandlerRegistration {
    NotificationRegistration::new(methods::NX_UPDATE_RUNNING_TASKS, move |connection_id| {
        let registry = registry.clone();
        move |(process_id, updates): (u32, Vec<UpdatedTask>)| {
            registry.update(&connection_id, process_id, updates)
        }
    })
    .into()
}

fn get_running_tasks(registry: Arc<RunningTasksRegistry>) -> HandlerRegistration {
    RequestRegistration::new(methods::IDE_GET_RUNNING_TASKS, move |_connection_id| {
        let registry = registry.clone();
        move |_: ()| {
            let running_tasks = registry.running_tasks_map();
            async move { Ok(GetRunningTasksResponse { running_tasks }) }
        }
    })
    .into()
}
