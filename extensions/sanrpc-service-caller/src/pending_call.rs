use crate::RpcCallerError;
use futures::channel::mpsc::{self, Receiver, Sender};
use sanrpc::codec::SerializeType;
use sanrpc::rpc::RpcMetadata;
use serde::de::DeserializeOwned;

/// Sending half of a completion channel. One sender may be shared by many calls.
pub type CompletionSender = Sender<RpcCompletion>;

/// Receiving half of a completion channel.
pub type CompletionReceiver = Receiver<RpcCompletion>;

/// Creates a bounded completion channel.
///
/// Completions are delivered without blocking; when `buffer` is exhausted any
/// further completion is dropped, so size it for the number of calls you
/// intend to have in flight on it.
pub fn completion_channel(buffer: usize) -> (CompletionSender, CompletionReceiver) {
    mpsc::channel(buffer)
}

/// The finished state of one call.
#[derive(Debug)]
pub struct RpcCompletion {
    pub sequence: u64,
    pub service_name: String,
    pub method_name: String,
    /// Serializer recorded when the call was issued.
    pub serialize_type: SerializeType,
    /// Decompressed reply payload, or the reason the call failed.
    pub result: Result<Vec<u8>, RpcCallerError>,
    pub response_metadata: RpcMetadata,
}

impl RpcCompletion {
    /// Decodes the reply payload with the serializer the call was made with.
    pub fn decode<R>(self) -> Result<R, RpcCallerError>
    where
        R: DeserializeOwned,
    {
        let payload = self.result?;
        Ok(self.serialize_type.decode(&payload)?)
    }
}

/// Client-side record of a call that is waiting for its response.
#[derive(Debug)]
pub struct PendingCall {
    pub service_name: String,
    pub method_name: String,
    pub serialize_type: SerializeType,
    done: CompletionSender,
}

impl PendingCall {
    pub fn new(
        service_name: &str,
        method_name: &str,
        serialize_type: SerializeType,
        done: CompletionSender,
    ) -> Self {
        Self {
            service_name: service_name.to_string(),
            method_name: method_name.to_string(),
            serialize_type,
            done,
        }
    }

    /// Delivers the outcome. Consuming `self` guarantees a single delivery.
    pub fn complete(
        mut self,
        sequence: u64,
        result: Result<Vec<u8>, RpcCallerError>,
        response_metadata: RpcMetadata,
    ) {
        let completion = RpcCompletion {
            sequence,
            service_name: self.service_name,
            method_name: self.method_name,
            serialize_type: self.serialize_type,
            result,
            response_metadata,
        };

        if let Err(err) = self.done.try_send(completion) {
            // The caller has either given up or under-sized its channel.
            if err.is_full() {
                tracing::debug!(
                    "Discarding completion for sequence {}: completion channel is full",
                    sequence
                );
            }
        }
    }
}
