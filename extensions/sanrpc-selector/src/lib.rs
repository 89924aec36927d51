pub mod constants;

mod consistent_hash;
pub use consistent_hash::ConsistentHashSelector;

mod discovery;
pub use discovery::*;

mod error;
pub use error::*;

mod node;
pub use node::*;

mod random;
pub use random::RandomSelector;

mod round_robin;
pub use round_robin::RoundRobinSelector;

mod selector;
pub use selector::*;

mod weighted_round_robin;
pub use weighted_round_robin::WeightedRoundRobinSelector;
