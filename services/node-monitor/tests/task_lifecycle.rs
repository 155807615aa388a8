//! End-to-end lifecycle of single reservations: launch, no-task, and
//! scheduler failure.


use darter_proto::{FullTaskId, HostPort, Request, ResourceVector, Response};
use darter_node_monitor::PolicyKind;
use tokio::net::TcpListener;

use harness::{enqueue_request, spawn_node_monitor, spec, wait_until, MockBackend, MockScheduler};

#[tokio::test]
async fn reservation_with_task_launches_and_completes() {
    let scheduler = MockScheduler::spawn().await.unwrap();
    scheduler.script("r1", vec![vec![spec("t1", b"payload")]]);
    let backend = MockBackend::spawn().await.unwrap();

    let capacity = ResourceVector::new(4096, 2);
    let nm = spawn_node_monitor(
        PolicyKind::Fifo,
        capacity,
        scheduler.port(),
        vec![("app".to_string(), backend.addr)],
    )
    .await
    .unwrap();

    let mut client = nm.client().await;
    let response = client
        .call(Request::EnqueueTaskReservations(enqueue_request(
            "r1",
            "app",
            ResourceVector::new(1024, 1),
            1,
        )))
        .await
        .unwrap();
    assert_eq!(response, Response::Ack);

    wait_until(|| backend.launch_count() == 1, "task launch").await;

    let launches = backend.launches();
    let expected_id = FullTaskId {
        task_id: "t1".to_string(),
        request_id: "r1".to_string(),
        app_id: "app".to_string(),
        scheduler: HostPort::new("127.0.0.1", 20507),
    };
    assert_eq!(launches[0].task_id, expected_id);
    assert_eq!(launches[0].user.user, "alice");
    assert_eq!(launches[0].estimated_resources, ResourceVector::new(1024, 1));
    assert_eq!(launches[0].message, b"payload");

    assert_eq!(scheduler.get_task_calls(), vec!["r1".to_string()]);
    assert_eq!(
        nm.monitor.resource_usage("app").resources,
        ResourceVector::new(1024, 1)
    );

    // The backend reports completion; accounting drains fully.
    let response = client
        .call(Request::TasksFinished {
            tasks: vec![expected_id],
        })
        .await
        .unwrap();
    assert_eq!(response, Response::Ack);

    wait_until(|| nm.monitor.active_requests() == 0, "accounting drained").await;
    assert_eq!(
        nm.monitor.resource_usage("app").resources,
        ResourceVector::none()
    );
    assert_eq!(nm.monitor.free_resources(), capacity);
}

#[tokio::test]
async fn empty_get_task_response_cancels_the_reservation() {
    // No script: the scheduler answers every GetTask with no task.
    let scheduler = MockScheduler::spawn().await.unwrap();
    let backend = MockBackend::spawn().await.unwrap();

    let capacity = ResourceVector::new(4096, 2);
    let nm = spawn_node_monitor(
        PolicyKind::Fifo,
        capacity,
        scheduler.port(),
        vec![("app".to_string(), backend.addr)],
    )
    .await
    .unwrap();

    let mut client = nm.client().await;
    client
        .call(Request::EnqueueTaskReservations(enqueue_request(
            "r1",
            "app",
            ResourceVector::new(1024, 1),
            1,
        )))
        .await
        .unwrap();

    wait_until(
        || scheduler.get_task_count() == 1 && nm.monitor.active_requests() == 0,
        "reservation cancelled",
    )
    .await;

    assert_eq!(backend.launch_count(), 0);
    assert_eq!(nm.monitor.free_resources(), capacity);
}

#[tokio::test]
async fn scheduler_failure_fails_the_reservation() {
    // Bind then drop a listener so the getTask port refuses connections.
    let closed = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let closed_port = closed.local_addr().unwrap().port();
    drop(closed);

    let backend = MockBackend::spawn().await.unwrap();
    let capacity = ResourceVector::new(4096, 2);
    let nm = spawn_node_monitor(
        PolicyKind::Fifo,
        capacity,
        closed_port,
        vec![("app".to_string(), backend.addr)],
    )
    .await
    .unwrap();

    let mut client = nm.client().await;
    let response = client
        .call(Request::EnqueueTaskReservations(enqueue_request(
            "r1",
            "app",
            ResourceVector::new(1024, 1),
            1,
        )))
        .await
        .unwrap();
    assert_eq!(response, Response::Ack);

    wait_until(|| nm.monitor.active_requests() == 0, "reservation failed").await;
    assert_eq!(backend.launch_count(), 0);
    assert_eq!(nm.monitor.free_resources(), capacity);
}

#[tokio::test]
async fn intake_rejects_unknown_applications() {
    let scheduler = MockScheduler::spawn().await.unwrap();
    let nm = spawn_node_monitor(
        PolicyKind::Fifo,
        ResourceVector::new(4096, 2),
        scheduler.port(),
        Vec::new(),
    )
    .await
    .unwrap();

    let mut client = nm.client().await;
    let response = client
        .call(Request::EnqueueTaskReservations(enqueue_request(
            "r1",
            "app",
            ResourceVector::new(1024, 1),
            1,
        )))
        .await
        .unwrap();
    assert!(matches!(response, Response::Error { .. }));
    assert_eq!(nm.monitor.active_requests(), 0);
}

#[tokio::test]
async fn backends_can_register_over_the_wire() {
    let scheduler = MockScheduler::spawn().await.unwrap();
    scheduler.script("r1", vec![vec![spec("t1", b"")]]);
    let backend = MockBackend::spawn().await.unwrap();

    let nm = spawn_node_monitor(
        PolicyKind::Fifo,
        ResourceVector::new(4096, 2),
        scheduler.port(),
        Vec::new(),
    )
    .await
    .unwrap();

    let mut client = nm.client().await;
    let response = client
        .call(Request::RegisterBackend {
            app_id: "app".to_string(),
            backend: HostPort::new("127.0.0.1", backend.addr.port()),
        })
        .await
        .unwrap();
    assert_eq!(response, Response::Ack);

    client
        .call(Request::EnqueueTaskReservations(enqueue_request(
            "r1",
            "app",
            ResourceVector::new(1024, 1),
            1,
        )))
        .await
        .unwrap();

    wait_until(|| backend.launch_count() == 1, "task launch").await;
}
