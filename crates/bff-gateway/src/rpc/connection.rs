//! # Connection Loop
//!
//! Serves the RPC protocol on one duplex transport.
//!
//! ```text
//!             ┌──────────── reader ────────────┐
//! transport ──┤ Request  → spawn call task      │
//!             │ Cancel   → abort task           │
//!             └─────────────────────────────────┘
//!  call tasks ──► bounded outbound queue ──► writer task ──► transport
//! ```
//!
//! Calls run concurrently and are keyed by `message_id`. Closing the
//! connection aborts every call; the writer still flushes what was queued
//! before the close.

use crate::auth::gate::AuthenticationGate;
use crate::context::GatewayContext;
use crate::domain::error::{ErrorKind, RpcError};
use crate::domain::types::DisconnectionReason;
use crate::rpc::codec::{read_frame, write_frame, CodecError};
use crate::rpc::handle::ConnectionHandle;
use crate::rpc::protocol::{FrameBody, RpcFrame, RpcRequest};
use crate::rpc::services::{dispatch, Reply};
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

type InFlight = Arc<Mutex<HashMap<u32, AbortHandle>>>;

/// State of one served connection.
pub struct RpcConnection {
    handle: Arc<ConnectionHandle>,
    gate: Arc<AuthenticationGate>,
    calls: InFlight,
    outbound: mpsc::Sender<RpcFrame>,
    max_frame_size: usize,
}

impl RpcConnection {
    /// Serve `io` until the peer hangs up, the connection is closed or
    /// `shutdown` flips to `true`.
    pub async fn serve<IO>(context: Arc<GatewayContext>, io: IO, mut shutdown: watch::Receiver<bool>)
    where
        IO: AsyncRead + AsyncWrite + Send + 'static,
    {
        let max_frame_size = context.config.server.max_frame_size;
        let (outbound, queued) = mpsc::channel(context.config.server.outbound_queue);
        let handle = Arc::new(ConnectionHandle::new());
        let gate = Arc::new(AuthenticationGate::new(context, Arc::clone(&handle)));
        let (mut reader, writer) = tokio::io::split(io);

        let writer = tokio::spawn(write_loop(writer, queued, Arc::clone(&handle), max_frame_size));
        let connection = Self {
            handle: Arc::clone(&handle),
            gate,
            calls: Arc::new(Mutex::new(HashMap::new())),
            outbound,
            max_frame_size,
        };
        debug!(connection = %handle.id(), "Connection opened");

        loop {
            let frame = tokio::select! {
                _ = handle.closed() => break,
                _ = shutdown_requested(&mut shutdown) => {
                    if let Some(session) = connection.gate.session() {
                        session.notify_disconnection(DisconnectionReason::Shutdown);
                    }
                    info!(connection = %handle.id(), "Closing connection for shutdown");
                    break;
                }
                frame = read_frame(&mut reader, connection.max_frame_size) => frame,
            };
            match frame {
                Ok(Some(frame)) => connection.on_frame(frame).await,
                Ok(None) => {
                    debug!(connection = %handle.id(), "Peer hung up");
                    break;
                }
                Err(CodecError::Io(e)) => {
                    debug!(connection = %handle.id(), error = %e, "Transport error");
                    break;
                }
                Err(e) => {
                    warn!(connection = %handle.id(), error = %e, "Protocol violation, closing connection");
                    break;
                }
            }
        }

        connection.close().await;
        drop(connection);
        if let Err(e) = writer.await {
            warn!(connection = %handle.id(), error = %e, "Writer task failed");
        }
        debug!(connection = %handle.id(), "Connection closed");
    }

    async fn on_frame(&self, frame: RpcFrame) {
        let message_id = frame.message_id;
        match frame.body {
            FrameBody::Request(request) => self.start_call(message_id, request).await,
            FrameBody::Cancel => {
                let task = self.calls.lock().remove(&message_id);
                if let Some(task) = task {
                    task.abort();
                    debug!(connection = %self.handle.id(), message_id, "Call cancelled");
                    self.send(RpcFrame::new(message_id, FrameBody::StreamEnd)).await;
                }
            }
            other => {
                debug!(connection = %self.handle.id(), message_id, frame = ?other, "Unexpected frame from client");
                let error = RpcError::invalid_request("clients may only send requests and cancellations");
                self.send(RpcFrame::new(message_id, FrameBody::Error(error))).await;
            }
        }
    }

    async fn start_call(&self, message_id: u32, request: RpcRequest) {
        // Inserted under the lock so a fast call cannot finish before it is tracked
        let started = {
            let mut calls = self.calls.lock();
            if calls.contains_key(&message_id) {
                false
            } else {
                let task = tokio::spawn(run_call(
                    Arc::clone(&self.gate),
                    Arc::clone(&self.handle),
                    Arc::clone(&self.calls),
                    self.outbound.clone(),
                    message_id,
                    request,
                ));
                calls.insert(message_id, task.abort_handle());
                true
            }
        };

        if !started {
            let error = RpcError::invalid_request(format!("message id {message_id} is already in flight"));
            self.send(RpcFrame::new(message_id, FrameBody::Error(error))).await;
        }
    }

    async fn send(&self, frame: RpcFrame) {
        // Only fails once the writer is gone
        let _ = self.outbound.send(frame).await;
    }

    async fn close(&self) {
        self.handle.close();
        let calls: Vec<AbortHandle> = self.calls.lock().drain().map(|(_, task)| task).collect();
        for task in calls {
            task.abort();
        }
        self.gate.teardown().await;
    }
}

async fn run_call(
    gate: Arc<AuthenticationGate>,
    handle: Arc<ConnectionHandle>,
    calls: InFlight,
    outbound: mpsc::Sender<RpcFrame>,
    message_id: u32,
    request: RpcRequest,
) {
    let method = request.method();
    debug!(
        connection = %handle.id(),
        message_id,
        service = request.service(),
        method,
        streaming = request.is_streaming(),
        "Call started"
    );
    match dispatch(gate.as_ref(), gate.modules(), request).await {
        Ok(Reply::Unary(response)) => {
            let _ = outbound
                .send(RpcFrame::new(message_id, FrameBody::Response(response)))
                .await;
        }
        Ok(Reply::Stream(mut items)) => {
            while let Some(item) = items.next().await {
                let frame = RpcFrame::new(message_id, FrameBody::StreamItem(item));
                if outbound.send(frame).await.is_err() {
                    break;
                }
            }
            let _ = outbound
                .send(RpcFrame::new(message_id, FrameBody::StreamEnd))
                .await;
        }
        Err(e) => {
            match e.kind() {
                ErrorKind::Validation | ErrorKind::Protocol => {
                    debug!(connection = %handle.id(), method, error = %e, "Call rejected");
                }
                _ => warn!(connection = %handle.id(), method, error = %e, "Call failed"),
            }
            let _ = outbound
                .send(RpcFrame::new(message_id, FrameBody::Error(RpcError::from(&e))))
                .await;
        }
    }

    calls.lock().remove(&message_id);
    if handle.take_scheduled_close() {
        debug!(connection = %handle.id(), method, "Closing connection after reply");
        handle.close();
    }
}

async fn write_loop<W>(
    mut writer: W,
    mut queued: mpsc::Receiver<RpcFrame>,
    handle: Arc<ConnectionHandle>,
    max_frame_size: usize,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            biased;
            frame = queued.recv() => {
                let Some(frame) = frame else { break };
                if !write_one(&mut writer, &frame, max_frame_size, &handle).await {
                    break;
                }
            }
            _ = handle.closed() => {
                while let Ok(frame) = queued.try_recv() {
                    if !write_one(&mut writer, &frame, max_frame_size, &handle).await {
                        break;
                    }
                }
                break;
            }
        }
    }
    let _ = writer.shutdown().await;
}

async fn write_one<W>(writer: &mut W, frame: &RpcFrame, max_frame_size: usize, handle: &ConnectionHandle) -> bool
where
    W: AsyncWrite + Unpin,
{
    match write_frame(writer, frame, max_frame_size).await {
        Ok(()) => true,
        Err(CodecError::FrameTooLarge { size, max }) => {
            // Only this reply is lost
            warn!(connection = %handle.id(), message_id = frame.message_id, size, max, "Outbound frame too large");
            true
        }
        Err(e) => {
            debug!(connection = %handle.id(), error = %e, "Write failed");
            handle.close();
            false
        }
    }
}

async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    if shutdown.wait_for(|stop| *stop).await.is_err() {
        // Sender gone without a shutdown: keep serving
        std::future::pending::<()>().await;
    }
}
