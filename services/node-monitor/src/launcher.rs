//! Launcher pool.
//!
//! A fixed set of workers that block on the runnable queue and dispatch each
//! fetched task to its application backend via `LaunchTask`. Each worker
//! keeps its own cached backend connections, so even when every worker talks
//! to the same backend the pool holds at most one connection per backend per
//! worker.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use darter_proto::{FullTaskId, Request, Response, RpcClient};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::audit;
use crate::monitor::NodeMonitor;
use crate::reservation::TaskReservation;

/// Spawns `workers` launcher workers draining the runnable queue.
pub fn start(
    monitor: Arc<NodeMonitor>,
    runnable_rx: mpsc::Receiver<TaskReservation>,
    workers: usize,
) -> Vec<JoinHandle<()>> {
    let runnable_rx = Arc::new(Mutex::new(runnable_rx));
    (0..workers)
        .map(|worker_id| {
            let monitor = Arc::clone(&monitor);
            let runnable_rx = Arc::clone(&runnable_rx);
            tokio::spawn(run_worker(worker_id, monitor, runnable_rx))
        })
        .collect()
}

async fn run_worker(
    worker_id: usize,
    monitor: Arc<NodeMonitor>,
    runnable_rx: Arc<Mutex<mpsc::Receiver<TaskReservation>>>,
) {
    let mut backend_clients: HashMap<SocketAddr, RpcClient> = HashMap::new();

    loop {
        let reservation = { runnable_rx.lock().await.recv().await };
        let Some(reservation) = reservation else {
            debug!(worker_id, "Runnable queue closed; launcher worker exiting");
            break;
        };

        // The claim moves from the runnable queue to in_use at dequeue.
        monitor.task_dequeued(&reservation.estimated_resources);

        launch(&monitor, &mut backend_clients, reservation).await;
    }
}

async fn launch(
    monitor: &NodeMonitor,
    backend_clients: &mut HashMap<SocketAddr, RpcClient>,
    reservation: TaskReservation,
) {
    let Some(spec) = reservation.task_spec else {
        error!(
            request_id = %reservation.request_id,
            "Reservation reached the launcher without a task spec"
        );
        return;
    };
    let task_id = spec.task_id.clone();
    let backend = reservation.app_backend_address;

    let client = match backend_clients.entry(backend) {
        Entry::Occupied(entry) => entry.into_mut(),
        Entry::Vacant(entry) => match RpcClient::connect(backend).await {
            Ok(client) => entry.insert(client),
            Err(e) => {
                error!(
                    error = %e,
                    backend = %backend,
                    request_id = %reservation.request_id,
                    "Unable to connect to application backend"
                );
                return;
            }
        },
    };

    let request = Request::LaunchTask {
        message: spec.message,
        task_id: FullTaskId {
            task_id: task_id.clone(),
            request_id: reservation.request_id.clone(),
            app_id: reservation.app_id.clone(),
            scheduler: reservation.scheduler_address.clone(),
        },
        user: reservation.user.clone(),
        estimated_resources: reservation.estimated_resources,
    };

    match client.call(request).await {
        Ok(Response::Ack) => {
            audit::task_launch(
                &reservation.request_id,
                &monitor.internal().host,
                &task_id,
                &reservation.previous_request_id,
                &reservation.previous_task_id,
            );
            debug!(
                request_id = %reservation.request_id,
                task_id = %task_id,
                backend = %backend,
                "Launched task on application backend"
            );
        }
        Ok(other) => {
            error!(
                request_id = %reservation.request_id,
                task_id = %task_id,
                backend = %backend,
                response = ?other,
                "Unexpected launchTask response"
            );
            backend_clients.remove(&backend);
        }
        Err(e) => {
            // Not retried; the backend either reports completion later or
            // the reservation leaks and the scheduler times it out.
            error!(
                error = %e,
                request_id = %reservation.request_id,
                task_id = %task_id,
                backend = %backend,
                "launchTask RPC failed"
            );
            backend_clients.remove(&backend);
        }
    }
}
