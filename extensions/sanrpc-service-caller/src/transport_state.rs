/// Connection state reported to a client's state change handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcTransportState {
    Connected,
    Disconnected,
}
