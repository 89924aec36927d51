use sanrpc_service::RpcMethod;

pub struct Echo;

impl RpcMethod for Echo {
    const SERVICE_NAME: &'static str = "Echo";
    const METHOD_NAME: &'static str = "Echo";

    type Input = Vec<u8>;
    type Output = Vec<u8>;
}
