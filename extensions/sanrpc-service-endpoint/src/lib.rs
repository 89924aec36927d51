mod endpoint;
pub use endpoint::*;

mod endpoint_interface;
pub use endpoint_interface::*;

pub mod error;

mod hooks;
pub use hooks::*;

mod request_context;
pub use request_context::*;
