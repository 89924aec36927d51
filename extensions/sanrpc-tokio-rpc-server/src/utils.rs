mod bind_tcp_listener_on_random_port;
pub use bind_tcp_listener_on_random_port::*;

mod listener_node_key;
pub use listener_node_key::*;
