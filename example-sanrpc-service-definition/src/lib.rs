mod arith;
pub use arith::*;

mod echo;
pub use echo::Echo;
