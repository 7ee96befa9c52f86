//! `automatosx-server`: the JSON-RPC stdio front door for the
//! orchestration kernel. A thin process (`automatosx-cli`)
//! constructs a [`ServerDeps`] from already-typed configuration and
//! provider descriptors, wraps it in a [`Server`], and calls
//! [`run_server`] — everything else (service construction, the fixed
//! tool registry, request dispatch, graceful shutdown) lives here.

mod jsonrpc;
mod server;
mod tools;
mod validation;

pub use jsonrpc::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
pub use server::{run_server, Server, ServerDeps, Services};
