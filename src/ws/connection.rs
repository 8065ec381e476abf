//! Per-connection socket loop.
//!
//! Reads frames from the client and drains the connection's outbound
//! queue onto the socket. Handling for one connection is sequential;
//! different connections run on independent tasks.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{Notify, mpsc};

use super::server::{CLOSE_GOING_AWAY, SHUTDOWN_REASON, WebSocketServer};
use crate::domain::{ConnectionId, OutboundFrame};

/// Runs the read/write loop for a single admitted connection.
///
/// - Text frames from the client go to [`WebSocketServer::handle_inbound`].
/// - Frames from `outbound` are written under the configured write
///   timeout; a timeout or write error ends the connection.
/// - `closing` fires when the server closes the connection. Frames
///   already queued are written first, then a `1001` close frame.
/// - On exit, for whatever reason, the connection is removed from the
///   server, which emits the disconnect notification if nobody else has.
pub async fn run_connection(
    socket: WebSocket,
    server: Arc<WebSocketServer>,
    client_id: ConnectionId,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    closing: Arc<Notify>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let write_timeout = server.config().write_timeout;

    loop {
        tokio::select! {
            biased;

            // Frame queued by send / broadcast / close
            frame = outbound.recv() => {
                match frame {
                    Some(OutboundFrame::Text(text)) => {
                        let write = ws_tx.send(Message::text(&*text));
                        match tokio::time::timeout(write_timeout, write).await {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => {
                                tracing::warn!(client_id = %client_id, error = %e, "ws write failed");
                                break;
                            }
                            Err(_) => {
                                tracing::warn!(
                                    client_id = %client_id,
                                    timeout_ms = write_timeout.as_millis(),
                                    "ws write timed out"
                                );
                                break;
                            }
                        }
                    }
                    Some(OutboundFrame::Close { code, reason }) => {
                        send_close(&mut ws_tx, client_id, code, reason, write_timeout).await;
                        break;
                    }
                    // Every sender is gone: the server has forgotten us.
                    None => {
                        send_close(
                            &mut ws_tx,
                            client_id,
                            CLOSE_GOING_AWAY,
                            SHUTDOWN_REASON,
                            write_timeout,
                        )
                        .await;
                        break;
                    }
                }
            }
            // Close requested while the queue had no room for a close frame
            () = closing.notified() => {
                send_close(&mut ws_tx, client_id, CLOSE_GOING_AWAY, SHUTDOWN_REASON, write_timeout)
                    .await;
                break;
            }
            // Incoming message from client
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => server.handle_inbound(client_id, text.as_str()),
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        tracing::debug!(client_id = %client_id, error = %e, "ws read failed");
                        break;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::warn!(client_id = %client_id, "binary frame dropped");
                    }
                    _ => {}
                }
            }
        }
    }

    let _ = server.disconnect(client_id);
    tracing::debug!(client_id = %client_id, "ws connection closed");
}

async fn send_close(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    client_id: ConnectionId,
    code: u16,
    reason: &'static str,
    write_timeout: Duration,
) {
    let close = Message::Close(Some(CloseFrame {
        code,
        reason: Utf8Bytes::from_static(reason),
    }));
    if tokio::time::timeout(write_timeout, ws_tx.send(close)).await.is_err() {
        tracing::debug!(client_id = %client_id, "close frame timed out");
    }
}
