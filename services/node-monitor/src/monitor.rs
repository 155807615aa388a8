//! The node monitor core: reservation intake, accounting, and the
//! completion pathway.
//!
//! One mutex owns the consistency group {admission policy, per-job
//! accounting, `in_use`, runnable-queue claims}. Critical sections never
//! await; released reservations are handed to the task puller only after
//! the lock is dropped.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, Weak};

use anyhow::{bail, Context, Result};
use darter_proto::{
    ClientPool, EnqueueTaskReservationsRequest, FullTaskId, HostPort, ResourceUsage,
    ResourceVector,
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::audit;
use crate::config::{Config, PolicyKind};
use crate::policy::{AdmissionPolicy, BoundedPolicy, FifoPolicy};
use crate::puller;
use crate::reservation::{JobResourceInfo, TaskReservation};

/// Bound on the runnable queue; the natural backpressure point between
/// pulling task specs and launching them.
const RUNNABLE_QUEUE_CAPACITY: usize = 1024;

struct MonitorState {
    policy: Box<dyn AdmissionPolicy>,

    /// Per-job accounting, keyed by request id.
    resources_per_request: HashMap<String, JobResourceInfo>,

    /// Resources consumed by tasks between dequeue-for-launch and
    /// completion.
    in_use: ResourceVector,

    /// Sum of claims of reservations currently on the runnable queue.
    /// Counted separately from `in_use`, which is debited at dequeue.
    runnable_reserved: ResourceVector,
}

pub struct NodeMonitor {
    capacity: ResourceVector,

    /// Address advertised to schedulers for the `GetTask` callback.
    internal: HostPort,

    /// Port on which schedulers serve `GetTask`.
    get_task_port: u16,

    state: Mutex<MonitorState>,

    /// Local application backends, keyed by app id.
    backends: Mutex<HashMap<String, SocketAddr>>,

    /// Pooled connections to schedulers, shared by all puller tasks.
    scheduler_clients: ClientPool,

    runnable_tx: mpsc::Sender<TaskReservation>,

    /// Back-reference handed to spawned puller tasks.
    self_ref: Weak<NodeMonitor>,
}

impl NodeMonitor {
    /// Builds the monitor and returns the runnable-queue receiver for the
    /// launcher pool to drain.
    pub fn new(config: &Config) -> (Arc<Self>, mpsc::Receiver<TaskReservation>) {
        let policy: Box<dyn AdmissionPolicy> = match config.policy {
            PolicyKind::Fifo => Box::new(FifoPolicy),
            PolicyKind::Bounded => Box::new(BoundedPolicy::new(config.capacity)),
        };

        let (runnable_tx, runnable_rx) = mpsc::channel(RUNNABLE_QUEUE_CAPACITY);

        let monitor = Arc::new_cyclic(|self_ref| Self {
            capacity: config.capacity,
            internal: HostPort::new(config.hostname.clone(), config.port),
            get_task_port: config.get_task_port,
            state: Mutex::new(MonitorState {
                policy,
                resources_per_request: HashMap::new(),
                in_use: ResourceVector::none(),
                runnable_reserved: ResourceVector::none(),
            }),
            backends: Mutex::new(config.app_backends.iter().cloned().collect()),
            scheduler_clients: ClientPool::new(),
            runnable_tx,
            self_ref: self_ref.clone(),
        });

        (monitor, runnable_rx)
    }

    /// Hands reservations released by the policy to the task puller.
    fn release_to_puller(&self, released: Vec<TaskReservation>) {
        if released.is_empty() {
            return;
        }
        let Some(monitor) = self.self_ref.upgrade() else {
            return;
        };
        for reservation in released {
            puller::spawn(Arc::clone(&monitor), reservation);
        }
    }

    pub fn internal(&self) -> &HostPort {
        &self.internal
    }

    pub fn get_task_port(&self) -> u16 {
        self.get_task_port
    }

    pub(crate) fn scheduler_clients(&self) -> &ClientPool {
        &self.scheduler_clients
    }

    /// Serves `EnqueueTaskReservations`: registers per-job accounting and
    /// hands each reservation to the admission policy. Success carries no
    /// placement guarantee.
    pub fn submit_reservations(&self, request: EnqueueTaskReservationsRequest) -> Result<()> {
        if request.app_id.is_empty() {
            bail!("enqueueTaskReservations: missing appId");
        }
        if request.num_tasks < 1 {
            bail!(
                "enqueueTaskReservations: numTasks must be at least 1, got {}",
                request.num_tasks
            );
        }
        let backend = self.resolve_backend(&request.app_id)?;

        let released = {
            let mut state = self.state.lock().unwrap();

            let info = JobResourceInfo::new(request.num_tasks, request.estimated_resources);
            if state
                .resources_per_request
                .insert(request.request_id.clone(), info)
                .is_some()
            {
                // Scheduler-side protocol error; the counter is overwritten.
                warn!(
                    request_id = %request.request_id,
                    "Duplicate reservation request id; overwriting accounting record"
                );
            }
            debug!(
                request_id = %request.request_id,
                num_tasks = request.num_tasks,
                "Added resource accounting for request"
            );

            let mut released = Vec::new();
            for _ in 0..request.num_tasks {
                let reservation = TaskReservation::new(&request, backend);
                let outcome = state.policy.handle_submit(reservation);
                audit::reservation_enqueued(
                    &self.internal.host,
                    &request.request_id,
                    outcome.queued_depth,
                );
                if let Some(reservation) = outcome.released {
                    released.push(reservation);
                }
            }
            released
        };

        self.release_to_puller(released);
        Ok(())
    }

    /// Serves `TasksFinished` from application backends.
    pub fn tasks_finished(&self, tasks: Vec<FullTaskId>) {
        for task in tasks {
            audit::task_completed(&task.request_id, &task.task_id);
            self.task_completed(&task.request_id, &task.request_id, &task.task_id);
        }
    }

    /// The completion pathway, invoked exactly once for every reservation
    /// released by the policy: on backend completion, on an empty `GetTask`
    /// response, or on a scheduler transport error. Settles accounting and
    /// lets the policy release further reservations into the freed slot.
    pub fn task_completed(
        &self,
        request_id: &str,
        last_task_request_id: &str,
        last_task_id: &str,
    ) {
        let released = {
            let mut state = self.state.lock().unwrap();

            // A missing record is an invariant violation; synthesize a
            // one-task record rather than crash a long-running daemon.
            let info = state
                .resources_per_request
                .entry(request_id.to_string())
                .or_insert_with(|| {
                    error!(request_id, "Missing resource accounting for request");
                    JobResourceInfo::new(1, ResourceVector::none())
                });
            info.remaining_tasks -= 1;
            let (remaining, freed) = (info.remaining_tasks, info.resources);
            if remaining <= 0 {
                debug!(request_id, "Deleting resource accounting for request");
                state.resources_per_request.remove(request_id);
            }

            state.in_use.subtract_from(&freed);
            state
                .policy
                .handle_task_completed(&freed, last_task_request_id, last_task_id)
        };

        self.release_to_puller(released);
    }

    /// Reports that the puller got no task (or no scheduler) for a released
    /// reservation, and retires it through the completion pathway.
    pub(crate) fn no_task_for_reservation(&self, reservation: TaskReservation) {
        audit::get_task_no_task(
            &reservation.request_id,
            &reservation.previous_request_id,
            &reservation.previous_task_id,
        );
        self.task_completed(
            &reservation.request_id,
            &reservation.previous_request_id,
            &reservation.previous_task_id,
        );
    }

    /// Puts a fetched reservation on the runnable queue, claiming its
    /// resources under `runnable_reserved`. Blocks when the queue is full;
    /// a reservation waiting for a slot is not yet counted as queued.
    pub(crate) async fn enqueue_runnable(&self, reservation: TaskReservation) {
        let permit = match self.runnable_tx.reserve().await {
            Ok(permit) => permit,
            Err(_) => {
                error!(
                    request_id = %reservation.request_id,
                    "Runnable queue closed; dropping reservation"
                );
                return;
            }
        };

        {
            let mut state = self.state.lock().unwrap();
            state
                .runnable_reserved
                .add_to(&reservation.estimated_resources);
        }
        permit.send(reservation);
    }

    /// Called by a launcher worker immediately after dequeuing a
    /// reservation: its claim moves from the runnable queue to `in_use`.
    pub fn task_dequeued(&self, estimated: &ResourceVector) {
        let mut state = self.state.lock().unwrap();
        state.runnable_reserved.subtract_from(estimated);
        state.in_use.add_to(estimated);
    }

    /// Serves `GetResourceUsage` for load reporting.
    pub fn resource_usage(&self, app_id: &str) -> ResourceUsage {
        let state = self.state.lock().unwrap();
        ResourceUsage {
            resources: state.in_use,
            queue_length: state.policy.queue_depth(app_id) as i32,
        }
    }

    /// Free resources: capacity minus running tasks minus reservations
    /// already holding a runnable-queue slot.
    pub fn free_resources(&self) -> ResourceVector {
        let state = self.state.lock().unwrap();
        self.capacity
            .minus(&state.in_use)
            .minus(&state.runnable_reserved)
    }

    /// Number of jobs with live accounting (for load reporting and tests).
    pub fn active_requests(&self) -> usize {
        self.state.lock().unwrap().resources_per_request.len()
    }

    /// Serves `RegisterBackend`: makes `app_id` launchable on this worker.
    pub async fn register_backend(&self, app_id: String, backend: &HostPort) -> Result<()> {
        let addr = tokio::net::lookup_host((backend.host.as_str(), backend.port))
            .await
            .ok()
            .and_then(|mut addrs| addrs.next())
            .with_context(|| format!("unresolvable backend address {backend}"))?;

        info!(app_id = %app_id, backend = %addr, "Registered application backend");
        self.backends.lock().unwrap().insert(app_id, addr);
        Ok(())
    }

    fn resolve_backend(&self, app_id: &str) -> Result<SocketAddr> {
        self.backends
            .lock()
            .unwrap()
            .get(app_id)
            .copied()
            .with_context(|| format!("no registered backend for app {app_id}"))
    }
}
