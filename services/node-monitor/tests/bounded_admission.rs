//! End-to-end behavior of the bounded admission policy: slot reuse after
//! completion and concurrent submits sharing capacity.


use darter_node_monitor::PolicyKind;
use darter_proto::{FullTaskId, HostPort, Request, ResourceUsage, ResourceVector, Response};

use harness::{enqueue_request, spawn_node_monitor, spec, wait_until, MockBackend, MockScheduler};

#[tokio::test]
async fn completed_slot_is_refilled_from_the_policy_queue() {
    let scheduler = MockScheduler::spawn().await.unwrap();
    scheduler.script("r2", vec![vec![spec("t1", b"")], vec![spec("t2", b"")]]);
    let backend = MockBackend::spawn().await.unwrap();

    // Capacity fits exactly one of the job's reservations at a time.
    let capacity = ResourceVector::new(4096, 2);
    let nm = spawn_node_monitor(
        PolicyKind::Bounded,
        capacity,
        scheduler.port(),
        vec![("app".to_string(), backend.addr)],
    )
    .await
    .unwrap();

    let mut client = nm.client().await;
    client
        .call(Request::EnqueueTaskReservations(enqueue_request(
            "r2", "app", capacity, 2,
        )))
        .await
        .unwrap();

    wait_until(|| backend.launch_count() == 1, "first launch").await;

    // The second reservation is retained: one getTask so far, one queued.
    assert_eq!(scheduler.get_task_count(), 1);
    let usage = client
        .call(Request::GetResourceUsage {
            app_id: "app".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(
        usage,
        Response::ResourceUsage(ResourceUsage {
            resources: capacity,
            queue_length: 1,
        })
    );

    // Completion of t1 releases the retained reservation into its slot.
    let finished = FullTaskId {
        task_id: "t1".to_string(),
        request_id: "r2".to_string(),
        app_id: "app".to_string(),
        scheduler: HostPort::new("127.0.0.1", 20507),
    };
    client
        .call(Request::TasksFinished {
            tasks: vec![finished],
        })
        .await
        .unwrap();

    wait_until(|| backend.launch_count() == 2, "second launch").await;
    assert_eq!(scheduler.get_task_count(), 2);
    assert_eq!(backend.launches()[1].task_id.task_id, "t2");

    let finished = FullTaskId {
        task_id: "t2".to_string(),
        request_id: "r2".to_string(),
        app_id: "app".to_string(),
        scheduler: HostPort::new("127.0.0.1", 20507),
    };
    client
        .call(Request::TasksFinished {
            tasks: vec![finished],
        })
        .await
        .unwrap();

    wait_until(|| nm.monitor.active_requests() == 0, "accounting drained").await;
    assert_eq!(nm.monitor.free_resources(), capacity);
}

#[tokio::test]
async fn concurrent_submits_share_capacity_without_oversubscription() {
    let scheduler = MockScheduler::spawn().await.unwrap();
    scheduler.script("r3", vec![vec![spec("t3", b"")]]);
    scheduler.script("r4", vec![vec![spec("t4", b"")]]);
    let backend = MockBackend::spawn().await.unwrap();

    let capacity = ResourceVector::new(4096, 2);
    let nm = spawn_node_monitor(
        PolicyKind::Bounded,
        capacity,
        scheduler.port(),
        vec![("app".to_string(), backend.addr)],
    )
    .await
    .unwrap();

    // Two schedulers submit concurrently on separate connections.
    let mut client_a = nm.client().await;
    let mut client_b = nm.client().await;
    let claim = ResourceVector::new(2048, 1);
    let (a, b) = tokio::join!(
        client_a.call(Request::EnqueueTaskReservations(enqueue_request(
            "r3", "app", claim, 1,
        ))),
        client_b.call(Request::EnqueueTaskReservations(enqueue_request(
            "r4", "app", claim, 1,
        ))),
    );
    assert_eq!(a.unwrap(), Response::Ack);
    assert_eq!(b.unwrap(), Response::Ack);

    // Both fit; usage must never exceed capacity while they launch.
    wait_until(
        || {
            let usage = nm.monitor.resource_usage("app").resources;
            assert!(
                usage.fits_within(&capacity),
                "in_use {usage} exceeds capacity {capacity}"
            );
            backend.launch_count() == 2
        },
        "both launches",
    )
    .await;

    let launched: Vec<String> = backend
        .launches()
        .iter()
        .map(|l| l.task_id.task_id.clone())
        .collect();
    assert!(launched.contains(&"t3".to_string()));
    assert!(launched.contains(&"t4".to_string()));
    assert_eq!(nm.monitor.resource_usage("app").resources, capacity);
    assert_eq!(nm.monitor.free_resources(), ResourceVector::none());

    let tasks = vec![
        FullTaskId {
            task_id: "t3".to_string(),
            request_id: "r3".to_string(),
            app_id: "app".to_string(),
            scheduler: HostPort::new("127.0.0.1", 20507),
        },
        FullTaskId {
            task_id: "t4".to_string(),
            request_id: "r4".to_string(),
            app_id: "app".to_string(),
            scheduler: HostPort::new("127.0.0.1", 20507),
        },
    ];
    client_a
        .call(Request::TasksFinished { tasks })
        .await
        .unwrap();

    wait_until(|| nm.monitor.active_requests() == 0, "accounting drained").await;
    assert_eq!(nm.monitor.free_resources(), capacity);
}
