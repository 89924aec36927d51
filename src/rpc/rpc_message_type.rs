use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Direction of a message on the wire.
#[repr(u8)]
#[derive(
    Debug,
    Default,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    TryFromPrimitive,
    IntoPrimitive,
)]
pub enum RpcMessageType {
    #[default]
    Request = 0,
    Response = 1,
}
