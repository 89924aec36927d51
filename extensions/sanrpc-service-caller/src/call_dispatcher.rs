use crate::{CompletionSender, PendingCall, RpcCallerError};
use parking_lot::Mutex;
use sanrpc::codec::CodecRegistry;
use sanrpc::frame::FrameCodec;
use sanrpc::rpc::{RpcErrorInfo, RpcMessage, RpcMetadata};
use sanrpc_service::{CallContext, RpcErrorCode};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// A request that has been framed and is ready to be written.
///
/// Hand it back to [`RpcCallDispatcher::complete_write`] once the write has
/// finished, successfully or not.
#[derive(Debug)]
pub struct OutboundCall {
    pub sequence: u64,
    pub frame: Vec<u8>,
    /// Oneway calls are not tracked in the pending table; their completion
    /// rides along here until the write outcome is known.
    oneway: Option<PendingCall>,
}

#[derive(Default)]
struct CallTable {
    next_sequence: u64,
    pending: HashMap<u64, PendingCall>,
    closing: bool,
    shutdown: bool,
}

/// Runtime-agnostic bookkeeping for the calls outstanding on one connection.
///
/// The dispatcher allocates sequence numbers, tracks pending calls and routes
/// incoming responses to them. It performs no I/O; the transport writes the
/// frames produced by [`begin_call`](Self::begin_call) and feeds decoded
/// messages into [`handle_response`](Self::handle_response).
///
/// Every pending call is removed from the table exactly once (by a matching
/// response, by cancellation or by connection failure) and is completed by
/// whichever path removed it.
pub struct RpcCallDispatcher {
    table: Mutex<CallTable>,
    codec_registry: Arc<CodecRegistry>,
}

impl RpcCallDispatcher {
    pub fn new(codec_registry: Arc<CodecRegistry>) -> Self {
        Self {
            table: Mutex::new(CallTable::default()),
            codec_registry,
        }
    }

    pub fn codec_registry(&self) -> &Arc<CodecRegistry> {
        &self.codec_registry
    }

    /// Registers a call and builds its request frame.
    ///
    /// An empty `service_name` and `method_name` produce a heartbeat, which
    /// carries no payload. When `expect_reply` is false the request is marked
    /// oneway and never enters the pending table.
    ///
    /// # Returns
    ///
    /// `None` when the call failed before anything was written (client shut
    /// down, unsupported codec, encode failure). In that case `done` has
    /// already received the error.
    pub fn begin_call<A>(
        &self,
        ctx: &CallContext,
        service_name: &str,
        method_name: &str,
        args: &A,
        expect_reply: bool,
        done: CompletionSender,
    ) -> Option<OutboundCall>
    where
        A: Serialize + ?Sized,
    {
        let call = PendingCall::new(service_name, method_name, ctx.serialize_type, done);

        let sequence = {
            let mut table = self.table.lock();
            if table.closing || table.shutdown {
                drop(table);
                call.complete(0, Err(RpcCallerError::Shutdown), RpcMetadata::new());
                return None;
            }
            let sequence = table.next_sequence;
            table.next_sequence = table.next_sequence.wrapping_add(1);
            sequence
        };

        let mut request = RpcMessage::request(sequence, service_name, method_name);
        request.oneway = !expect_reply;
        request.serialize_type = ctx.serialize_type.into();
        request.metadata = ctx.metadata.clone();

        if !request.heartbeat {
            match self
                .codec_registry
                .encode_payload(ctx.serialize_type, ctx.compress_type, args)
            {
                Ok((payload, applied)) => {
                    request.payload = payload;
                    request.compress_type = applied.into();
                }
                Err(err) => {
                    call.complete(sequence, Err(err.into()), RpcMetadata::new());
                    return None;
                }
            }
        }

        let frame = match FrameCodec::encode(&request) {
            Ok(frame) => frame,
            Err(err) => {
                call.complete(sequence, Err(err.into()), RpcMetadata::new());
                return None;
            }
        };

        if !expect_reply {
            return Some(OutboundCall {
                sequence,
                frame,
                oneway: Some(call),
            });
        }

        // Inserted before the frame is handed out so a fast response can
        // never race ahead of its pending entry.
        let mut table = self.table.lock();
        if table.closing || table.shutdown {
            drop(table);
            call.complete(sequence, Err(RpcCallerError::Shutdown), RpcMetadata::new());
            return None;
        }
        table.pending.insert(sequence, call);

        Some(OutboundCall {
            sequence,
            frame,
            oneway: None,
        })
    }

    /// Records the outcome of writing an [`OutboundCall`].
    ///
    /// A failed write fails the call; a successful oneway write completes it.
    pub fn complete_write(&self, call: OutboundCall, result: Result<(), RpcCallerError>) {
        match (result, call.oneway) {
            (Ok(()), Some(oneway)) => oneway.complete(call.sequence, Ok(Vec::new()), RpcMetadata::new()),
            (Ok(()), None) => {}
            (Err(err), Some(oneway)) => oneway.complete(call.sequence, Err(err), RpcMetadata::new()),
            (Err(err), None) => {
                self.fail_call(call.sequence, err);
            }
        }
    }

    /// Routes a decoded message to the call waiting for it.
    ///
    /// # Returns
    ///
    /// `true` if a pending call was completed. Requests, and responses whose
    /// sequence is unknown (late, duplicated or already cancelled), are
    /// discarded.
    pub fn handle_response(&self, message: RpcMessage) -> bool {
        if message.is_request() {
            tracing::debug!(
                "Discarding unexpected request {} for {}.{}",
                message.sequence,
                message.service_name,
                message.method_name
            );
            return false;
        }

        let Some(call) = self.table.lock().pending.remove(&message.sequence) else {
            tracing::debug!(
                "Discarding response for unknown sequence {}",
                message.sequence
            );
            return false;
        };

        let sequence = message.sequence;
        let result = if message.is_error() {
            let info = message.error.unwrap_or_else(|| {
                RpcErrorInfo::framework(
                    RpcErrorCode::Unknown.into(),
                    "error response without error details",
                )
            });
            Err(RpcCallerError::Remote(info))
        } else {
            self.codec_registry
                .decompress_payload(message.compress_type, message.payload)
                .map_err(RpcCallerError::from)
        };

        call.complete(sequence, result, message.metadata);
        true
    }

    /// Removes a pending call and completes it with `err`.
    ///
    /// Returns `false` if the call had already been completed.
    pub fn fail_call(&self, sequence: u64, err: RpcCallerError) -> bool {
        let call = self.table.lock().pending.remove(&sequence);
        match call {
            Some(call) => {
                call.complete(sequence, Err(err), RpcMetadata::new());
                true
            }
            None => false,
        }
    }

    /// Fails every pending call, returning how many were failed.
    pub fn fail_all<F>(&self, make_err: F) -> usize
    where
        F: Fn() -> RpcCallerError,
    {
        let drained: Vec<(u64, PendingCall)> = self.table.lock().pending.drain().collect();
        let count = drained.len();
        for (sequence, call) in drained {
            call.complete(sequence, Err(make_err()), RpcMetadata::new());
        }
        count
    }

    /// Marks the dispatcher as closing.
    ///
    /// Returns `false` if it was already closing or shut down.
    pub fn mark_closing(&self) -> bool {
        let mut table = self.table.lock();
        let first = !(table.closing || table.shutdown);
        table.closing = true;
        first
    }

    /// Marks the connection as lost. Returns `false` if it already was.
    pub fn mark_shutdown(&self) -> bool {
        let mut table = self.table.lock();
        let first = !table.shutdown;
        table.shutdown = true;
        first
    }

    pub fn is_closing(&self) -> bool {
        self.table.lock().closing
    }

    pub fn is_shutdown(&self) -> bool {
        self.table.lock().shutdown
    }

    /// Whether new calls are still accepted.
    pub fn is_available(&self) -> bool {
        let table = self.table.lock();
        !(table.closing || table.shutdown)
    }

    pub fn pending_count(&self) -> usize {
        self.table.lock().pending.len()
    }
}
