//! Audit log events.
//!
//! Emitted under the `audit` target with stable `event` names so downstream
//! tooling can attribute placement latency across schedulers, node monitors,
//! and backends. Names are part of the operational contract; do not rename.

use tracing::{debug, info};

pub(crate) fn reservation_enqueued(host: &str, request_id: &str, queued_reservations: usize) {
    info!(
        target: "audit",
        event = "reservation_enqueued",
        host,
        request_id,
        queued_reservations,
    );
}

pub(crate) fn get_task(request_id: &str, host: &str) {
    debug!(
        target: "audit",
        event = "node_monitor_get_task",
        request_id,
        host,
    );
}

pub(crate) fn get_task_no_task(request_id: &str, previous_request_id: &str, previous_task_id: &str) {
    info!(
        target: "audit",
        event = "node_monitor_get_task_no_task",
        request_id,
        previous_request_id,
        previous_task_id,
    );
}

pub(crate) fn task_launch(
    request_id: &str,
    host: &str,
    task_id: &str,
    previous_request_id: &str,
    previous_task_id: &str,
) {
    info!(
        target: "audit",
        event = "node_monitor_task_launch",
        request_id,
        host,
        task_id,
        previous_request_id,
        previous_task_id,
    );
}

pub(crate) fn task_completed(request_id: &str, task_id: &str) {
    info!(
        target: "audit",
        event = "task_completed",
        request_id,
        task_id,
    );
}
