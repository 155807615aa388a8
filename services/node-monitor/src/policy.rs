//! Pluggable admission policies.
//!
//! A policy decides when a submitted reservation may start fetching its task
//! spec. It runs entirely under the monitor's accounting lock and must be
//! deterministic for a fixed input sequence; released reservations are
//! handed to the task puller by the caller after the lock is dropped.

use std::collections::VecDeque;

use darter_proto::ResourceVector;

use crate::reservation::TaskReservation;

/// Outcome of handing one reservation to the policy.
pub struct Submitted {
    /// The reservation, when it may start fetching its task spec right away.
    pub released: Option<TaskReservation>,

    /// Depth of the policy queue after the submit, for the audit record.
    pub queued_depth: usize,
}

/// Decision rule converting submitted reservations into release events.
pub trait AdmissionPolicy: Send {
    /// Hand one reservation to the policy: release it or retain it.
    fn handle_submit(&mut self, reservation: TaskReservation) -> Submitted;

    /// A task of some job finished and its accounting has been settled.
    /// `freed` is that job's per-reservation claim. Reservations released
    /// here must carry the finishing task's ids as their previous ids so the
    /// launch audit record can attribute slot-fill latency.
    fn handle_task_completed(
        &mut self,
        freed: &ResourceVector,
        last_task_request_id: &str,
        last_task_id: &str,
    ) -> Vec<TaskReservation>;

    /// Number of retained reservations for `app_id`, for load reporting.
    fn queue_depth(&self, app_id: &str) -> usize;
}

/// Unbounded FIFO: every reservation is released the moment it is submitted.
pub struct FifoPolicy;

impl AdmissionPolicy for FifoPolicy {
    fn handle_submit(&mut self, reservation: TaskReservation) -> Submitted {
        Submitted {
            released: Some(reservation),
            queued_depth: 0,
        }
    }

    fn handle_task_completed(
        &mut self,
        _freed: &ResourceVector,
        _last_task_request_id: &str,
        _last_task_id: &str,
    ) -> Vec<TaskReservation> {
        Vec::new()
    }

    fn queue_depth(&self, _app_id: &str) -> usize {
        0
    }
}

/// Bounded-concurrency admission: a reservation is released only while the
/// resources committed to released-but-unfinished reservations leave room
/// for its claim. Everything else waits in FIFO order and drains from the
/// head as completions free capacity.
pub struct BoundedPolicy {
    capacity: ResourceVector,

    /// Claims of reservations released but not yet completed. Tracked here
    /// because the monitor's `in_use` vector is debited only when a task is
    /// dequeued for launch, which is too late to gate admission.
    committed: ResourceVector,

    queue: VecDeque<TaskReservation>,
}

impl BoundedPolicy {
    pub fn new(capacity: ResourceVector) -> Self {
        Self {
            capacity,
            committed: ResourceVector::none(),
            queue: VecDeque::new(),
        }
    }

    fn head_fits(&self) -> bool {
        match self.queue.front() {
            Some(head) => self
                .committed
                .plus(&head.estimated_resources)
                .fits_within(&self.capacity),
            None => false,
        }
    }
}

impl AdmissionPolicy for BoundedPolicy {
    fn handle_submit(&mut self, reservation: TaskReservation) -> Submitted {
        let fits = self
            .committed
            .plus(&reservation.estimated_resources)
            .fits_within(&self.capacity);

        // Never overtake reservations already waiting.
        if fits && self.queue.is_empty() {
            self.committed.add_to(&reservation.estimated_resources);
            Submitted {
                released: Some(reservation),
                queued_depth: 0,
            }
        } else {
            self.queue.push_back(reservation);
            Submitted {
                released: None,
                queued_depth: self.queue.len(),
            }
        }
    }

    fn handle_task_completed(
        &mut self,
        freed: &ResourceVector,
        last_task_request_id: &str,
        last_task_id: &str,
    ) -> Vec<TaskReservation> {
        self.committed.subtract_from(freed);

        let mut released = Vec::new();
        while self.head_fits() {
            if let Some(mut reservation) = self.queue.pop_front() {
                self.committed.add_to(&reservation.estimated_resources);
                reservation.previous_request_id = last_task_request_id.to_string();
                reservation.previous_task_id = last_task_id.to_string();
                released.push(reservation);
            }
        }
        released
    }

    fn queue_depth(&self, app_id: &str) -> usize {
        self.queue.iter().filter(|r| r.app_id == app_id).count()
    }
}
