mod call_context;
pub use call_context::*;
pub mod constants;
pub use constants::*;
mod error_code;
pub use error_code::*;
mod rpc_method;
pub use rpc_method::*;
mod service_error;
pub use service_error::*;
