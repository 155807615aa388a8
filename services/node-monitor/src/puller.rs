//! Task puller.
//!
//! Converts a released reservation into a ready-to-launch record by calling
//! `GetTask` on the scheduler that issued the reservation. Each fetch runs
//! in its own task; the accounting lock is never held across the RPC.
//!
//! Transport errors are never retried here: the reservation is retired
//! through the completion pathway and the scheduler's placement logic is
//! responsible for reserving a slot elsewhere.

use std::net::SocketAddr;
use std::sync::Arc;

use darter_proto::{Request, Response};
use tracing::{debug, warn};

use crate::audit;
use crate::monitor::NodeMonitor;
use crate::reservation::TaskReservation;

/// Starts fetching the task spec for a released reservation.
pub(crate) fn spawn(monitor: Arc<NodeMonitor>, reservation: TaskReservation) {
    tokio::spawn(async move {
        fetch_task(monitor, reservation).await;
    });
}

async fn fetch_task(monitor: Arc<NodeMonitor>, mut reservation: TaskReservation) {
    debug!(
        request_id = %reservation.request_id,
        previous_task_id = %reservation.previous_task_id,
        "Attempting to get task for reservation"
    );

    // Schedulers serve GetTask on the well-known port, not the port that
    // accepted the placement request.
    let scheduler = match resolve_scheduler(&reservation, monitor.get_task_port()).await {
        Some(addr) => addr,
        None => {
            warn!(
                scheduler = %reservation.scheduler_address.host,
                request_id = %reservation.request_id,
                "Unresolvable scheduler address"
            );
            monitor.no_task_for_reservation(reservation);
            return;
        }
    };

    let mut client = match monitor.scheduler_clients().borrow(scheduler).await {
        Ok(client) => client,
        Err(e) => {
            warn!(
                error = %e,
                scheduler = %scheduler,
                request_id = %reservation.request_id,
                "Unable to reach scheduler for getTask"
            );
            monitor.no_task_for_reservation(reservation);
            return;
        }
    };

    audit::get_task(&reservation.request_id, &monitor.internal().host);
    let request = Request::GetTask {
        request_id: reservation.request_id.clone(),
        node_monitor: monitor.internal().clone(),
    };

    match client.call(request).await {
        Ok(Response::Tasks(mut specs)) => {
            monitor.scheduler_clients().give_back(client);

            if specs.is_empty() {
                debug!(request_id = %reservation.request_id, "No task returned for reservation");
                monitor.no_task_for_reservation(reservation);
                return;
            }
            if specs.len() > 1 {
                warn!(
                    request_id = %reservation.request_id,
                    count = specs.len(),
                    "Received multiple task launch specs; using the first"
                );
            }
            reservation.task_spec = Some(specs.swap_remove(0));
            monitor.enqueue_runnable(reservation).await;
        }
        Ok(other) => {
            // Error or unexpected record; the connection is not trusted
            // again, so the client is dropped instead of returned.
            warn!(
                request_id = %reservation.request_id,
                scheduler = %scheduler,
                response = ?other,
                "Unexpected getTask response"
            );
            monitor.no_task_for_reservation(reservation);
        }
        Err(e) => {
            warn!(
                error = %e,
                request_id = %reservation.request_id,
                scheduler = %scheduler,
                "getTask RPC failed"
            );
            monitor.no_task_for_reservation(reservation);
        }
    }
}

async fn resolve_scheduler(reservation: &TaskReservation, port: u16) -> Option<SocketAddr> {
    tokio::net::lookup_host((reservation.scheduler_address.host.as_str(), port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
}
