use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Outcome carried by a response. Requests always use `Normal`.
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
pub enum RpcStatusType {
    #[default]
    Normal = 0,
    Error = 1,
}
