//! WebSocket channel between the notebook and the external client.
//!
//! One connection per process. On open the notebook identifies itself with
//! a `{"role": "notebook"}` frame, then every inbound text frame is parsed
//! as a command envelope and dispatched. Outbound responses are funnelled
//! through a single writer task so handlers never touch the socket.
//!
//! Connection errors and close are logged; there is no reconnect.

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, WebSocketStream};

use crate::dispatch::Dispatcher;
use crate::handlers::HandlerContext;
use crate::protocol::{Handshake, Response};

/// Connect to `url` and serve commands until the connection closes.
pub async fn connect(url: &str, ctx: HandlerContext, report_unknown: bool) -> Result<()> {
    let (ws, _) = connect_async(url)
        .await
        .with_context(|| format!("Failed to connect to {}", url))?;
    info!("[channel] Connected to {}", url);
    serve(ws, ctx, report_unknown).await
}

/// Serve commands over an established WebSocket.
///
/// Returns once the peer closes the connection or the stream fails.
/// Responses still pending at that point are dropped.
pub async fn serve<S>(ws: WebSocketStream<S>, ctx: HandlerContext, report_unknown: bool) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut sink, mut stream) = ws.split();

    let handshake = serde_json::to_string(&Handshake::notebook())?;
    sink.send(Message::Text(handshake))
        .await
        .context("Failed to send handshake")?;
    debug!("[channel] Sent handshake");

    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();
    let writer = tokio::spawn(async move {
        while let Some(response) = rx.recv().await {
            let text = match serde_json::to_string(&response) {
                Ok(text) => text,
                Err(e) => {
                    error!("[channel] Failed to encode {}: {}", response.response_type, e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                error!("[channel] Failed to send response: {}", e);
                break;
            }
        }
    });

    let dispatcher = Dispatcher::new(ctx, tx).report_unknown_commands(report_unknown);

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                error!("[channel] Connection error: {}", e);
                break;
            }
        };
        match frame {
            Message::Text(text) => match serde_json::from_str::<Value>(&text) {
                Ok(envelope @ Value::Object(_)) => dispatcher.dispatch(envelope),
                Ok(_) => warn!("[channel] Ignoring non-object frame"),
                Err(e) => warn!("[channel] Ignoring malformed frame: {}", e),
            },
            Message::Close(reason) => {
                info!("[channel] Connection closed: {:?}", reason);
                break;
            }
            Message::Binary(_) => warn!("[channel] Ignoring binary frame"),
            _ => {}
        }
    }

    writer.abort();
    info!("[channel] Channel torn down");
    Ok(())
}
