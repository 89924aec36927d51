use num_enum::{IntoPrimitive, TryFromPrimitive};
use sanrpc::rpc::RpcErrorInfo;

/// Codes carried by framework-level error responses.
#[repr(i32)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, TryFromPrimitive, IntoPrimitive)]
pub enum RpcErrorCode {
    ServerUnmarshalFail = 101,
    ServerMarshalFail = 102,
    NoService = 121,
    NoMethod = 122,
    UnsupportedEncodeType = 123,
    DecodeDataFail = 124,
    EncodeDataFail = 125,
    ServerTimeout = 131,
    ServerOverload = 132,
    Unknown = 999,
}

impl RpcErrorCode {
    pub fn description(self) -> &'static str {
        match self {
            RpcErrorCode::ServerUnmarshalFail => "server unmarshal request fail",
            RpcErrorCode::ServerMarshalFail => "server marshal response fail",
            RpcErrorCode::NoService => "server router no service",
            RpcErrorCode::NoMethod => "server router no method",
            RpcErrorCode::UnsupportedEncodeType => "server not support content encode type",
            RpcErrorCode::DecodeDataFail => "server decode request data fail",
            RpcErrorCode::EncodeDataFail => "server encode response data fail",
            RpcErrorCode::ServerTimeout => "server message timeout",
            RpcErrorCode::ServerOverload => "server overload",
            RpcErrorCode::Unknown => "unknown error",
        }
    }

    /// Builds a framework error envelope, appending `detail` to the stock description.
    pub fn to_error_info(self, detail: impl AsRef<str>) -> RpcErrorInfo {
        let detail = detail.as_ref();
        let message = if detail.is_empty() {
            self.description().to_string()
        } else {
            format!("{}: {}", self.description(), detail)
        };
        RpcErrorInfo::framework(self.into(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sanrpc::rpc::RpcErrorKind;

    #[test]
    fn codes_match_wire_values() {
        assert_eq!(i32::from(RpcErrorCode::NoService), 121);
        assert_eq!(RpcErrorCode::try_from(122).ok(), Some(RpcErrorCode::NoMethod));
        assert!(RpcErrorCode::try_from(0).is_err());
    }

    #[test]
    fn error_info_is_framework_kind() {
        let info = RpcErrorCode::NoMethod.to_error_info("arith.divide");
        assert_eq!(info.kind, RpcErrorKind::Framework);
        assert_eq!(info.code, 122);
        assert_eq!(
            info.to_string(),
            "type:framework, code:122, msg:server router no method: arith.divide"
        );
    }
}
