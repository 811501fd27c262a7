//! Remote sync for the list collection.
//!
//! ## Model
//!
//! The remote holds one shared document keyed by list id. On connect the
//! engine:
//! 1. Probes write access with a throwaway entry
//! 2. Subscribes to change notifications
//! 3. Seeds: adopts the remote if it has data, otherwise pushes local data
//!
//! After that every local mutation pushes the whole collection and every
//! notification replaces it (last writer wins).

mod client;
mod document;
mod engine;
mod error;
mod policy;
mod protocol;
mod remote;
mod retry;

pub use client::{build_ws_url, WsRemote};
pub use document::{decode as decode_document, encode as encode_document};
pub use engine::{ConnectionState, SyncEngine, SyncOptions, PROBE_KEY};
pub use error::SyncError;
pub use policy::{seed_action, SeedAction};
pub use protocol::{ClientMessage, ErrorCode, ServerMessage};
pub use remote::{MemoryRemote, RemoteDocument, RemoteStore, RemoteSubscription};
pub use retry::RetryPolicy;
