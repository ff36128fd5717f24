// crates/ecdysis-rpc/src/lib.rs
//
// ecdysis-rpc: operator control server for the Ecdysis upgrade subsystem.
//
// Exposes descriptor submission, pending upgrade listing, cancellation, and
// node status as JSON-RPC methods carried over tonic's HTTP transport.

pub mod handlers;
pub mod middleware;
pub mod server;

pub use handlers::node::NodeStatus;
pub use server::{EcdysisRpcServer, JsonRpcRequest, JsonRpcResponse, RpcConfig};
