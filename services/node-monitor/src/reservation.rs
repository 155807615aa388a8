//! Data model for reservations and per-job accounting.

use std::net::SocketAddr;

use darter_proto::{
    EnqueueTaskReservationsRequest, HostPort, ResourceVector, TaskLaunchSpec, UserGroupInfo,
};

/// A claim on this worker for a future task whose spec is not yet known
/// locally. Created at intake, owned by the admission policy until released,
/// then by the puller, the runnable queue, and finally a launcher worker.
#[derive(Debug, Clone)]
pub struct TaskReservation {
    pub request_id: String,
    pub app_id: String,
    pub user: UserGroupInfo,
    pub estimated_resources: ResourceVector,
    pub scheduler_address: HostPort,
    pub app_backend_address: SocketAddr,

    /// Ids of the last task launched in the slot this reservation fills.
    /// Empty when the reservation was released into an empty slot. Carried
    /// through to the launch audit record to attribute slot-fill latency.
    pub previous_request_id: String,
    pub previous_task_id: String,

    /// Populated by the task puller on a successful `GetTask`.
    pub task_spec: Option<TaskLaunchSpec>,
}

impl TaskReservation {
    pub fn new(
        request: &EnqueueTaskReservationsRequest,
        app_backend_address: SocketAddr,
    ) -> Self {
        Self {
            request_id: request.request_id.clone(),
            app_id: request.app_id.clone(),
            user: request.user.clone(),
            estimated_resources: request.estimated_resources,
            scheduler_address: request.scheduler_address.clone(),
            app_backend_address,
            previous_request_id: String::new(),
            previous_task_id: String::new(),
            task_spec: None,
        }
    }
}

/// Accounting for the not-yet-terminal reservations of one job.
#[derive(Debug, Clone)]
pub struct JobResourceInfo {
    /// Reservations of this job that have not reached a terminal state.
    pub remaining_tasks: i32,

    /// Per-reservation claim; equal to the job's `estimated_resources`.
    pub resources: ResourceVector,
}

impl JobResourceInfo {
    pub fn new(remaining_tasks: i32, resources: ResourceVector) -> Self {
        Self {
            remaining_tasks,
            resources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reservation_starts_with_empty_slot_history() {
        let request = EnqueueTaskReservationsRequest {
            app_id: "app".to_string(),
            user: UserGroupInfo {
                user: "alice".to_string(),
                group: "eng".to_string(),
            },
            request_id: "r1".to_string(),
            scheduler_address: HostPort::new("10.0.0.1", 20507),
            estimated_resources: ResourceVector::new(1024, 1),
            num_tasks: 2,
        };

        let reservation = TaskReservation::new(&request, "127.0.0.1:40001".parse().unwrap());
        assert_eq!(reservation.request_id, "r1");
        assert_eq!(reservation.previous_request_id, "");
        assert_eq!(reservation.previous_task_id, "");
        assert!(reservation.task_spec.is_none());
    }
}
