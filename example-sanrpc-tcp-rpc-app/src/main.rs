use example_sanrpc_service_definition::{Add, Divide, DivideArgs, DivideReply, Mult};
use sanrpc_selector::{SelectMode, StaticDiscovery};
use sanrpc_service::{CallContext, RpcServiceError};
use sanrpc_service_caller::FailMode;
use sanrpc_service_caller::typed::RpcCallTyped;
use sanrpc_tokio_rpc_client::{RpcClientConfig, XClient};
use sanrpc_tokio_rpc_server::utils::{bind_tcp_listener_on_random_port, tcp_listener_to_node_key};
use sanrpc_tokio_rpc_server::{RpcServer, RpcServiceEndpoint};
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tokio::join;
use tracing_subscriber::EnvFilter;

fn arith_endpoint() -> Result<RpcServiceEndpoint, Box<dyn Error>> {
    let mut endpoint = RpcServiceEndpoint::new();
    endpoint.register::<Add, _, _>(|_, numbers| async move { Ok(numbers.iter().sum()) })?;
    endpoint.register::<Mult, _, _>(|_, numbers| async move { Ok(numbers.iter().product()) })?;
    endpoint.register::<Divide, _, _>(|_, args: DivideArgs| async move {
        if args.divisor == 0 {
            return Err(RpcServiceError::new(400, "divide by zero"));
        }
        Ok(DivideReply {
            quotient: args.dividend / args.divisor,
            remainder: args.dividend % args.divisor,
        })
    })?;
    Ok(endpoint)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // Two identical nodes behind one logical service
    let mut servers = Vec::new();
    let mut node_keys = Vec::new();
    for _ in 0..2 {
        let (listener, _port) = bind_tcp_listener_on_random_port().await?;
        node_keys.push(tcp_listener_to_node_key(&listener)?);

        let server = Arc::new(RpcServer::new(arith_endpoint()?));
        let _server_task = tokio::spawn({
            let server = server.clone();
            async move {
                if let Err(err) = server.serve_with_listener(listener).await {
                    tracing::error!("Server stopped: {}", err);
                }
            }
        });
        servers.push(server);
    }

    let discovery = StaticDiscovery::parse(&node_keys.join(","))?;
    let client = XClient::new(
        "Arith",
        FailMode::Failover,
        SelectMode::RoundRobin,
        &discovery,
        RpcClientConfig::default(),
    )?;

    {
        let (mut ctx1, mut ctx2, mut ctx3) = (CallContext::new(), CallContext::new(), CallContext::new());

        // `join!` will await all responses before proceeding
        let (res1, res2, res3) = join!(
            Add::call(&client, &mut ctx1, vec![1.0, 2.0, 3.0]),
            Add::call(&client, &mut ctx2, vec![8.0, 3.0, 7.0]),
            Mult::call(&client, &mut ctx3, vec![8.0, 3.0, 7.0])
        );

        println!("Result from first add(): {:?}", res1);
        println!("Result from second add(): {:?}", res2);
        println!("Result from first mult(): {:?}", res3);

        let mut ctx = CallContext::new().with_timeout(Duration::from_secs(1));
        let divided = Divide::call(&client, &mut ctx, DivideArgs { dividend: 7, divisor: 0 }).await;
        println!("Result from divide by zero: {:?}", divided);
    }

    if std::env::args().any(|arg| arg == "--serve") {
        println!("Serving on {}; press Ctrl-C to stop", node_keys.join(", "));
        tokio::signal::ctrl_c().await?;
    }

    client.close().await;
    for server in servers {
        if let Err(err) = server.shutdown(Duration::from_secs(5)).await {
            tracing::warn!("Shutdown did not drain cleanly: {}", err);
        }
    }

    Ok(())
}
