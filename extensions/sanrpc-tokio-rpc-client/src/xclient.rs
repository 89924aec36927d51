use crate::{RpcClient, RpcClientConfig, RpcConnector, TcpConnector};
use futures::StreamExt;
use parking_lot::RwLock;
use sanrpc_selector::{Discovery, DiscoveryError, Node, SelectMode, Selector};
use sanrpc_service::{AUTH_METADATA_KEY, CallContext};
use sanrpc_service_caller::{FailMode, RpcCallerError, RpcServiceCallerInterface};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A client for one logical service spread over many nodes.
///
/// Each call picks a node through the [`Selector`], reuses a cached
/// connection to it (keyed by `network@address`) and applies the configured
/// [`FailMode`] when the call fails at transport level. Errors produced by the
/// remote service are never retried.
pub struct XClient {
    service_name: String,
    fail_mode: FailMode,
    selector: Arc<dyn Selector>,
    config: RpcClientConfig,
    connector: Arc<dyn RpcConnector>,
    clients: Mutex<HashMap<String, Arc<RpcClient>>>,
    auth: RwLock<Option<String>>,
    watch_task: Option<JoinHandle<()>>,
}

impl XClient {
    /// Builds a client whose node list comes from `discovery`.
    ///
    /// If the discovery can push updates, they are fed into the selector by a
    /// background task, so this must be called from within a Tokio runtime.
    pub fn new(
        service_name: &str,
        fail_mode: FailMode,
        select_mode: SelectMode,
        discovery: &dyn Discovery,
        config: RpcClientConfig,
    ) -> Result<XClient, DiscoveryError> {
        let nodes = discovery.list(service_name)?;
        let selector = select_mode.new_selector(nodes);
        Ok(Self::with_selector(service_name, fail_mode, selector, discovery, config))
    }

    /// Like [`new`](Self::new), with a caller-provided selector whose node set
    /// is already populated.
    pub fn with_selector(
        service_name: &str,
        fail_mode: FailMode,
        selector: Arc<dyn Selector>,
        discovery: &dyn Discovery,
        config: RpcClientConfig,
    ) -> XClient {
        let watch_task = discovery.watch().map(|mut updates| {
            let selector = selector.clone();
            let service_name = service_name.to_string();
            tokio::spawn(async move {
                while let Some(nodes) = updates.next().await {
                    tracing::debug!(
                        "Discovery update for {}: {} nodes",
                        service_name,
                        nodes.len()
                    );
                    selector.update_nodes(nodes);
                }
            })
        });

        XClient {
            service_name: service_name.to_string(),
            fail_mode,
            selector,
            connector: Arc::new(TcpConnector::new(config.tcp_keepalive)),
            config,
            clients: Mutex::new(HashMap::new()),
            auth: RwLock::new(None),
            watch_task,
        }
    }

    /// Replaces the connector used for new connections.
    pub fn with_connector(mut self, connector: Arc<dyn RpcConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn selector(&self) -> &Arc<dyn Selector> {
        &self.selector
    }

    /// Attaches `token` to every subsequent call under the `__AUTH` metadata key.
    pub fn set_auth(&self, token: impl Into<String>) {
        *self.auth.write() = Some(token.into());
    }

    /// Calls `method_name` on this client's service.
    pub async fn call<A, R>(
        &self,
        ctx: &mut CallContext,
        method_name: &str,
        args: &A,
    ) -> Result<R, RpcCallerError>
    where
        A: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        self.call_service(ctx, &self.service_name, method_name, args)
            .await
    }

    async fn call_service<A, R>(
        &self,
        ctx: &mut CallContext,
        service_name: &str,
        method_name: &str,
        args: &A,
    ) -> Result<R, RpcCallerError>
    where
        A: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        if let Some(token) = self.auth.read().as_ref() {
            ctx.metadata
                .insert(AUTH_METADATA_KEY.to_string(), token.clone());
        }

        match self.fail_mode {
            FailMode::Failfast => {
                let (node, client) = self.select_client(ctx).await?;
                let result = client.call(ctx, service_name, method_name, args).await;
                match &result {
                    Err(err) if err.is_retryable() => self.report_failure(&node, &client, err).await,
                    Err(err) if !err.is_service_error() => self.evict(&node, &client).await,
                    _ => {}
                }
                result
            }
            FailMode::Failover => self.call_failover(ctx, service_name, method_name, args).await,
            FailMode::Failtry => self.call_failtry(ctx, service_name, method_name, args).await,
            FailMode::Failbackup => self.call_backup(ctx, service_name, method_name, args).await,
        }
    }

    /// Tries a freshly selected node on each retryable failure.
    async fn call_failover<A, R>(
        &self,
        ctx: &mut CallContext,
        service_name: &str,
        method_name: &str,
        args: &A,
    ) -> Result<R, RpcCallerError>
    where
        A: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let mut attempts_left = self.config.retries + 1;
        loop {
            attempts_left -= 1;

            let err = match self.select_client(ctx).await {
                Ok((node, client)) => match client.call(ctx, service_name, method_name, args).await {
                    Ok(reply) => return Ok(reply),
                    Err(err) => {
                        self.report_failure(&node, &client, &err).await;
                        err
                    }
                },
                Err(err) => err,
            };

            if !err.is_retryable() || attempts_left == 0 {
                return Err(err);
            }
            tracing::debug!(
                "Retrying {}.{} on another node after: {}",
                service_name,
                method_name,
                err
            );
        }
    }

    /// Retries the node selected for the first attempt.
    async fn call_failtry<A, R>(
        &self,
        ctx: &mut CallContext,
        service_name: &str,
        method_name: &str,
        args: &A,
    ) -> Result<R, RpcCallerError>
    where
        A: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let node = self
            .selector
            .select(&self.service_name, ctx.routing_key.as_deref())?;

        let mut attempts_left = self.config.retries + 1;
        loop {
            attempts_left -= 1;

            let err = match self.client_for(&node).await {
                Ok(client) => match client.call(ctx, service_name, method_name, args).await {
                    Ok(reply) => return Ok(reply),
                    Err(err) => {
                        self.report_failure(&node, &client, &err).await;
                        err
                    }
                },
                Err(err) => err,
            };

            if !err.is_retryable() || attempts_left == 0 {
                return Err(err);
            }
            tracing::debug!("Retrying {}.{} on {}: {}", service_name, method_name, node, err);
        }
    }

    /// Races a backup request against a slow or failing first one.
    async fn call_backup<A, R>(
        &self,
        ctx: &mut CallContext,
        service_name: &str,
        method_name: &str,
        args: &A,
    ) -> Result<R, RpcCallerError>
    where
        A: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        let (primary_node, primary) = self.select_client(ctx).await?;
        let primary_call = call_owned::<A, R>(primary.clone(), ctx.clone(), service_name, method_name, args);
        tokio::pin!(primary_call);

        let early = tokio::select! {
            outcome = &mut primary_call => Some(outcome),
            _ = tokio::time::sleep(self.config.backup_latency) => None,
        };

        if let Some((result, primary_ctx)) = early {
            match result {
                Ok(reply) => {
                    ctx.merge_response_metadata(primary_ctx.response_metadata);
                    return Ok(reply);
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => {
                    self.report_failure(&primary_node, &primary, &err).await;
                    let (node, backup) = self.select_backup(ctx, &primary_node).await?;
                    let result = backup.call(ctx, service_name, method_name, args).await;
                    if let Err(err) = &result {
                        self.report_failure(&node, &backup, err).await;
                    }
                    return result;
                }
            }
        }

        let (backup_node, backup) = match self.select_backup(ctx, &primary_node).await {
            Ok(selected) => selected,
            Err(err) => {
                tracing::debug!("No backup node for {}.{}: {}", service_name, method_name, err);
                let (result, primary_ctx) = primary_call.await;
                if let Err(err) = &result {
                    self.report_failure(&primary_node, &primary, err).await;
                }
                ctx.merge_response_metadata(primary_ctx.response_metadata);
                return result;
            }
        };
        tracing::debug!(
            "Sending backup request for {}.{} to {}",
            service_name,
            method_name,
            backup_node
        );
        let backup_call = call_owned::<A, R>(backup.clone(), ctx.clone(), service_name, method_name, args);
        tokio::pin!(backup_call);

        // The first success wins; a failed leg leaves the other one to finish.
        let (first, first_node, first_client, primary_won) = tokio::select! {
            outcome = &mut primary_call => (outcome, &primary_node, &primary, true),
            outcome = &mut backup_call => (outcome, &backup_node, &backup, false),
        };

        let (result, leg_ctx) = match first {
            (Ok(reply), leg_ctx) => (Ok(reply), leg_ctx),
            (Err(err), _) if err.is_service_error() => return Err(err),
            (Err(err), _) => {
                self.report_failure(first_node, first_client, &err).await;
                let (other_node, other_client) = if primary_won {
                    (&backup_node, &backup)
                } else {
                    (&primary_node, &primary)
                };
                let (result, leg_ctx) = if primary_won {
                    backup_call.await
                } else {
                    primary_call.await
                };
                if let Err(err) = &result {
                    self.report_failure(other_node, other_client, err).await;
                }
                (result, leg_ctx)
            }
        };

        ctx.merge_response_metadata(leg_ctx.response_metadata);
        result
    }

    async fn select_client(&self, ctx: &CallContext) -> Result<(Node, Arc<RpcClient>), RpcCallerError> {
        let node = self
            .selector
            .select(&self.service_name, ctx.routing_key.as_deref())?;
        let client = self.client_for(&node).await?;
        Ok((node, client))
    }

    /// Selects a node for a backup request, preferring one other than `primary`.
    async fn select_backup(
        &self,
        ctx: &CallContext,
        primary: &Node,
    ) -> Result<(Node, Arc<RpcClient>), RpcCallerError> {
        let candidates = self.selector.nodes().len().max(1);
        let mut node = self
            .selector
            .select(&self.service_name, ctx.routing_key.as_deref())?;
        for _ in 1..candidates {
            if node.key() != primary.key() {
                break;
            }
            node = self
                .selector
                .select(&self.service_name, ctx.routing_key.as_deref())?;
        }
        let client = self.client_for(&node).await?;
        Ok((node, client))
    }

    /// Returns the cached connection to `node`, connecting if there is none
    /// or the cached one is no longer usable.
    ///
    /// The cache is not locked while connecting, so a slow node never holds
    /// up calls to the others.
    async fn client_for(&self, node: &Node) -> Result<Arc<RpcClient>, RpcCallerError> {
        let key = node.key();
        if let Some(client) = self.cached_client(&key).await {
            return Ok(client);
        }

        let client = RpcClient::connect_with(
            self.connector.as_ref(),
            &node.network,
            &node.address,
            self.config.clone(),
        )
        .await
        .map_err(|err| {
            tracing::warn!("Connecting to {} failed: {}", key, err);
            self.selector.mark_failed(node);
            RpcCallerError::Io(err)
        })?;

        let client = Arc::new(client);
        let mut clients = self.clients.lock().await;
        if let Some(existing) = clients.get(&key) {
            // Another call connected to the same node first.
            if existing.is_available() {
                let _ = client.close();
                return Ok(existing.clone());
            }
        }
        if let Some(stale) = clients.insert(key, client.clone()) {
            let _ = stale.close();
        }
        Ok(client)
    }

    /// Looks up a usable cached connection, dropping an unusable one.
    async fn cached_client(&self, key: &str) -> Option<Arc<RpcClient>> {
        let mut clients = self.clients.lock().await;
        let client = clients.get(key)?;
        if client.is_available() {
            return Some(client.clone());
        }

        tracing::debug!("Dropping unusable connection to {}", key);
        if let Some(stale) = clients.remove(key) {
            let _ = stale.close();
        }
        None
    }

    /// Feeds a transport failure back to the selector and drops the connection.
    async fn report_failure(&self, node: &Node, client: &Arc<RpcClient>, err: &RpcCallerError) {
        if err.is_retryable() {
            self.selector.mark_failed(node);
            self.evict(node, client).await;
        }
    }

    /// Removes `client` from the cache, unless it was already replaced, and closes it.
    async fn evict(&self, node: &Node, client: &Arc<RpcClient>) {
        let key = node.key();
        let mut clients = self.clients.lock().await;
        if clients
            .get(&key)
            .is_some_and(|cached| Arc::ptr_eq(cached, client))
        {
            clients.remove(&key);
        }
        drop(clients);
        let _ = client.close();
    }

    /// Number of cached connections.
    pub async fn connection_count(&self) -> usize {
        self.clients.lock().await.len()
    }

    /// Closes every cached connection and stops following discovery updates.
    pub async fn close(&self) {
        let clients: Vec<_> = self.clients.lock().await.drain().collect();
        for (key, client) in clients {
            if client.close().is_err() {
                tracing::debug!("Connection to {} was already closed", key);
            }
        }
        if let Some(task) = &self.watch_task {
            task.abort();
        }
    }
}

impl Drop for XClient {
    fn drop(&mut self) {
        if let Some(task) = &self.watch_task {
            task.abort();
        }
    }
}

/// Runs a call with its own context so two legs can race.
async fn call_owned<A, R>(
    client: Arc<RpcClient>,
    mut ctx: CallContext,
    service_name: &str,
    method_name: &str,
    args: &A,
) -> (Result<R, RpcCallerError>, CallContext)
where
    A: Serialize + Sync + ?Sized,
    R: DeserializeOwned + Send + 'static,
{
    let result = client.call(&mut ctx, service_name, method_name, args).await;
    (result, ctx)
}

#[async_trait::async_trait]
impl RpcServiceCallerInterface for XClient {
    async fn call_rpc<A, R>(
        &self,
        ctx: &mut CallContext,
        service_name: &str,
        method_name: &str,
        args: &A,
    ) -> Result<R, RpcCallerError>
    where
        A: Serialize + Sync + ?Sized,
        R: DeserializeOwned + Send + 'static,
    {
        self.call_service(ctx, service_name, method_name, args)
            .await
    }
}
