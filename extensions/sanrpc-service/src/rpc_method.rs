use serde::Serialize;
use serde::de::DeserializeOwned;

/// Static description of a single remote method.
///
/// Implementors are usually unit structs shared between client and server so
/// both sides agree on names and argument/reply types at compile time.
pub trait RpcMethod {
    /// Service the method is registered under (matched case-insensitively).
    const SERVICE_NAME: &'static str;

    /// Method name (matched case-insensitively).
    const METHOD_NAME: &'static str;

    /// The high-level argument type sent by the caller.
    type Input: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// The high-level reply type returned by the handler.
    type Output: Serialize + DeserializeOwned + Send + 'static;
}
