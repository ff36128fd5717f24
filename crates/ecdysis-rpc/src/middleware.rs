// crates/ecdysis-rpc/src/middleware.rs
//
// Request interceptors for the RPC server.

use tonic::{Request, Status};

/// Logging interceptor for incoming operator requests.
pub fn logging_interceptor(req: Request<()>) -> Result<Request<()>, Status> {
    tracing::debug!(metadata = ?req.metadata(), "Incoming RPC request");
    Ok(req)
}
