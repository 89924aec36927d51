mod call_dispatcher;
pub use call_dispatcher::*;

mod caller_interface;
pub use caller_interface::*;

pub mod error;
pub use error::RpcCallerError;

mod fail_mode;
pub use fail_mode::*;

mod pending_call;
pub use pending_call::*;

mod transport_state;
pub use transport_state::*;

pub mod typed;
