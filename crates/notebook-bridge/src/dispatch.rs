//! Routes command envelopes to handlers.

use log::{debug, warn};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{report_failure, BridgeError};
use crate::handlers::{handle, HandlerContext, Reply};
use crate::protocol::{result_tag_for, CommandKind, Response};

/// Turns inbound envelopes into exactly one outbound [`Response`] each.
///
/// Execution-bound commands are answered from their own task, so replies
/// go out in completion order rather than request order.
#[derive(Clone)]
pub struct Dispatcher {
    ctx: HandlerContext,
    outbound: mpsc::UnboundedSender<Response>,
    report_unknown: bool,
}

impl Dispatcher {
    pub fn new(ctx: HandlerContext, outbound: mpsc::UnboundedSender<Response>) -> Self {
        Self {
            ctx,
            outbound,
            report_unknown: false,
        }
    }

    /// Answer unknown command types with a protocol error instead of
    /// dropping them.
    pub fn report_unknown_commands(mut self, report: bool) -> Self {
        self.report_unknown = report;
        self
    }

    /// Dispatch one envelope.
    ///
    /// Must be called from within a tokio runtime; deferred replies are
    /// spawned.
    pub fn dispatch(&self, envelope: Value) {
        let request_id = envelope.get("request_id").cloned().unwrap_or(Value::Null);
        let tag = envelope
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let Some(kind) = CommandKind::from_tag(&tag) else {
            warn!("[dispatch] Unknown command type: {:?}", tag);
            if self.report_unknown {
                let err = BridgeError::UnknownCommand(tag.clone());
                self.send(Response::error(
                    result_tag_for(&tag),
                    request_id,
                    err.kind(),
                    err.to_string(),
                ));
            }
            return;
        };

        debug!("[dispatch] {} (request_id={})", kind, request_id);

        match handle(kind, &self.ctx, &envelope) {
            Ok(Reply::Ready(payload)) => {
                self.send(Response::success(kind.result_tag(), request_id, payload));
            }
            Ok(Reply::Deferred(pending)) => {
                let outbound = self.outbound.clone();
                tokio::spawn(async move {
                    let response = match pending.await {
                        Ok(payload) => Response::success(kind.result_tag(), request_id, payload),
                        Err(e) => report_failure(kind, request_id, &e),
                    };
                    if outbound.send(response).is_err() {
                        debug!("[dispatch] Channel closed before {} finished", kind);
                    }
                });
            }
            Err(e) => self.send(report_failure(kind, request_id, &e)),
        }
    }

    fn send(&self, response: Response) {
        if self.outbound.send(response).is_err() {
            debug!("[dispatch] Channel closed, dropping response");
        }
    }
}
