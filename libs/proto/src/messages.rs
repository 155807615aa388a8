//! Wire message definitions.
//!
//! Records are encoded with bincode inside length-delimited frames (see
//! [`crate::codec`]). Peers agree on field order, so fields here must keep
//! their declaration order; new fields go at the end of a record and new
//! operations at the end of the [`Request`]/[`Response`] enums.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Network address of a peer as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Quantity of resources on a worker, or claimed by a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceVector {
    pub memory_bytes: i64,
    pub cpu_cores: i32,
}

impl ResourceVector {
    pub const fn new(memory_bytes: i64, cpu_cores: i32) -> Self {
        Self {
            memory_bytes,
            cpu_cores,
        }
    }

    /// The empty vector.
    pub const fn none() -> Self {
        Self::new(0, 0)
    }

    pub fn add_to(&mut self, other: &ResourceVector) {
        self.memory_bytes += other.memory_bytes;
        self.cpu_cores += other.cpu_cores;
    }

    /// Component-wise subtraction, saturating at zero. Usage accounting never
    /// goes negative even when a credit arrives for a task that was never
    /// debited (e.g. a reservation that completed without launching).
    pub fn subtract_from(&mut self, other: &ResourceVector) {
        self.memory_bytes = (self.memory_bytes - other.memory_bytes).max(0);
        self.cpu_cores = (self.cpu_cores - other.cpu_cores).max(0);
    }

    pub fn plus(&self, other: &ResourceVector) -> ResourceVector {
        ResourceVector::new(
            self.memory_bytes + other.memory_bytes,
            self.cpu_cores + other.cpu_cores,
        )
    }

    /// Component-wise subtraction, saturating at zero.
    pub fn minus(&self, other: &ResourceVector) -> ResourceVector {
        ResourceVector::new(
            (self.memory_bytes - other.memory_bytes).max(0),
            (self.cpu_cores - other.cpu_cores).max(0),
        )
    }

    /// Whether this vector fits component-wise within `capacity`.
    pub fn fits_within(&self, capacity: &ResourceVector) -> bool {
        self.memory_bytes <= capacity.memory_bytes && self.cpu_cores <= capacity.cpu_cores
    }
}

impl fmt::Display for ResourceVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mem={} cpu={}", self.memory_bytes, self.cpu_cores)
    }
}

/// Identity a task runs under, passed through to the backend unmodified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserGroupInfo {
    pub user: String,
    pub group: String,
}

/// The concrete payload and identity of a task, fetched from the scheduler
/// on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLaunchSpec {
    pub task_id: String,
    pub message: Vec<u8>,
}

/// Globally unique task identity, as reported to and by backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FullTaskId {
    pub task_id: String,
    pub request_id: String,
    pub app_id: String,
    /// Scheduler that placed the reservation this task filled.
    pub scheduler: HostPort,
}

/// One intake call, carrying `num_tasks` reservations for a single job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueTaskReservationsRequest {
    pub app_id: String,
    pub user: UserGroupInfo,
    pub request_id: String,
    pub scheduler_address: HostPort,
    pub estimated_resources: ResourceVector,
    pub num_tasks: i32,
}

/// Load report for one application on a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub resources: ResourceVector,
    pub queue_length: i32,
}

/// Operations peers may invoke on each other. The node monitor serves the
/// first four; schedulers serve `GetTask`; backends serve `LaunchTask`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Request {
    EnqueueTaskReservations(EnqueueTaskReservationsRequest),
    TasksFinished {
        tasks: Vec<FullTaskId>,
    },
    GetResourceUsage {
        app_id: String,
    },
    RegisterBackend {
        app_id: String,
        backend: HostPort,
    },
    GetTask {
        request_id: String,
        node_monitor: HostPort,
    },
    LaunchTask {
        message: Vec<u8>,
        task_id: FullTaskId,
        user: UserGroupInfo,
        estimated_resources: ResourceVector,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Response {
    Ack,
    Tasks(Vec<TaskLaunchSpec>),
    ResourceUsage(ResourceUsage),
    Error { message: String },
}
