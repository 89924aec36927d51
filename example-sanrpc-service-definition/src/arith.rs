use sanrpc_service::RpcMethod;
use serde::{Deserialize, Serialize};

pub const ARITH_SERVICE: &str = "Arith";

/// Sums a list of numbers.
pub struct Add;

impl RpcMethod for Add {
    const SERVICE_NAME: &'static str = ARITH_SERVICE;
    const METHOD_NAME: &'static str = "Add";

    type Input = Vec<f64>;
    type Output = f64;
}

/// Multiplies a list of numbers.
pub struct Mult;

impl RpcMethod for Mult {
    const SERVICE_NAME: &'static str = ARITH_SERVICE;
    const METHOD_NAME: &'static str = "Mult";

    type Input = Vec<f64>;
    type Output = f64;
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Copy)]
pub struct DivideArgs {
    pub dividend: i64,
    pub divisor: i64,
}

#[derive(Serialize, Deserialize, PartialEq, Debug, Clone, Copy)]
pub struct DivideReply {
    pub quotient: i64,
    pub remainder: i64,
}

/// Integer division; a zero divisor is reported as a service error.
pub struct Divide;

impl RpcMethod for Divide {
    const SERVICE_NAME: &'static str = ARITH_SERVICE;
    const METHOD_NAME: &'static str = "Divide";

    type Input = DivideArgs;
    type Output = DivideReply;
}
