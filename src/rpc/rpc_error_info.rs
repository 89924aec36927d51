use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Distinguishes errors raised by the framework itself from errors returned
/// by a service method.
#[repr(u8)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TryFromPrimitive, IntoPrimitive,
)]
pub enum RpcErrorKind {
    Framework = 1,
    Business = 2,
}

/// Error envelope attached to a response whose status is `Error`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcErrorInfo {
    pub kind: RpcErrorKind,
    pub code: i32,
    pub message: String,
}

impl RpcErrorInfo {
    pub fn framework(code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: RpcErrorKind::Framework,
            code,
            message: message.into(),
        }
    }

    pub fn business(code: i32, message: impl Into<String>) -> Self {
        Self {
            kind: RpcErrorKind::Business,
            code,
            message: message.into(),
        }
    }

    pub fn is_business(&self) -> bool {
        self.kind == RpcErrorKind::Business
    }
}

impl fmt::Display for RpcErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            RpcErrorKind::Framework => "framework",
            RpcErrorKind::Business => "business",
        };
        write!(f, "type:{}, code:{}, msg:{}", kind, self.code, self.message)
    }
}

impl std::error::Error for RpcErrorInfo {}
