//! Socket layer between vigild and its clients
//!
//! One JSON document per line over a Unix domain socket. The platform bridge
//! connects as a client: it pushes voice-state changes as requests and
//! receives `Notify`/`Remove` events to carry out. Client roles come from the
//! peer's uid.

mod client;
mod server;

pub use client::*;
pub use server::*;

use thiserror::Error;
use vigil_api::ErrorCode;

#[derive(Debug, Error)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Request rejected ({code:?}): {message}")]
    Rejected { code: ErrorCode, message: String },

    #[error("Server error: {0}")]
    ServerError(String),
}

pub type IpcResult<T> = Result<T, IpcError>;
