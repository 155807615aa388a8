//! RPC server loop for the node monitor's intake surface.
//!
//! Accepts framed connections from schedulers and backends and dispatches
//! each request to the monitor core. One task per connection; requests on a
//! connection are answered in order.

use std::sync::Arc;

use anyhow::Result;
use darter_proto::{Request, Response, ServerCodec};
use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tracing::{info, warn};

use crate::monitor::NodeMonitor;

pub async fn serve(listener: TcpListener, monitor: Arc<NodeMonitor>) -> Result<()> {
    info!(addr = %listener.local_addr()?, "Node monitor listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, monitor).await {
                warn!(error = %e, peer = %peer, "Connection failed");
            }
        });
    }
}

async fn handle_connection(stream: TcpStream, monitor: Arc<NodeMonitor>) -> Result<()> {
    stream.set_nodelay(true)?;
    let mut framed = Framed::new(stream, ServerCodec::new());

    while let Some(request) = framed.next().await {
        let response = dispatch(&monitor, request?).await;
        framed.send(response).await?;
    }
    Ok(())
}

async fn dispatch(monitor: &Arc<NodeMonitor>, request: Request) -> Response {
    match request {
        Request::EnqueueTaskReservations(request) => {
            match monitor.submit_reservations(request) {
                Ok(()) => Response::Ack,
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            }
        }
        Request::TasksFinished { tasks } => {
            monitor.tasks_finished(tasks);
            Response::Ack
        }
        Request::GetResourceUsage { app_id } => {
            Response::ResourceUsage(monitor.resource_usage(&app_id))
        }
        Request::RegisterBackend { app_id, backend } => {
            match monitor.register_backend(app_id, &backend).await {
                Ok(()) => Response::Ack,
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            }
        }
        Request::GetTask { .. } | Request::LaunchTask { .. } => Response::Error {
            message: "operation not served by the node monitor".to_string(),
        },
    }
}
