//! Wire messages between `WsRemote` and `todoosh-server`.
//!
//! Messages travel as CBOR in binary WebSocket frames. Every request carries
//! a client-chosen `requestId` that the matching reply echoes back.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::SyncError;
use super::remote::RemoteDocument;

/// Messages sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    ReadAll { request_id: u64 },
    SetAll { request_id: u64, document: RemoteDocument },
    Put { request_id: u64, key: String, value: Value },
    Remove { request_id: u64, key: String },
    Subscribe { request_id: u64 },
    Unsubscribe { request_id: u64 },
}

impl ClientMessage {
    pub fn request_id(&self) -> u64 {
        match self {
            ClientMessage::ReadAll { request_id }
            | ClientMessage::SetAll { request_id, .. }
            | ClientMessage::Put { request_id, .. }
            | ClientMessage::Remove { request_id, .. }
            | ClientMessage::Subscribe { request_id }
            | ClientMessage::Unsubscribe { request_id } => *request_id,
        }
    }

    /// Whether the message changes the stored document.
    pub fn is_write(&self) -> bool {
        matches!(
            self,
            ClientMessage::SetAll { .. } | ClientMessage::Put { .. } | ClientMessage::Remove { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCode {
    PermissionDenied,
    Invalid,
    Internal,
}

/// Messages sent by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Snapshot {
        request_id: u64,
        document: RemoteDocument,
    },
    Ack {
        request_id: u64,
    },
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        code: ErrorCode,
        message: String,
    },
    /// Full document after another client's write.
    Changed { document: RemoteDocument },
}

impl ServerMessage {
    pub fn request_id(&self) -> Option<u64> {
        match self {
            ServerMessage::Snapshot { request_id, .. } | ServerMessage::Ack { request_id } => {
                Some(*request_id)
            }
            ServerMessage::Error { request_id, .. } => *request_id,
            ServerMessage::Changed { .. } => None,
        }
    }

    pub fn error(request_id: Option<u64>, code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            request_id,
            code,
            message: message.into(),
        }
    }

    /// Turns the reply into `Ok(())` for an ack, or the matching error.
    pub fn into_ack(self) -> Result<(), SyncError> {
        match self {
            ServerMessage::Ack { .. } => Ok(()),
            other => Err(other.into_error()),
        }
    }

    /// Turns the reply into the snapshot document it carries.
    pub fn into_snapshot(self) -> Result<RemoteDocument, SyncError> {
        match self {
            ServerMessage::Snapshot { document, .. } => Ok(document),
            other => Err(other.into_error()),
        }
    }

    fn into_error(self) -> SyncError {
        match self {
            ServerMessage::Error {
                code: ErrorCode::PermissionDenied,
                message,
                ..
            } => SyncError::PermissionDenied(message),
            ServerMessage::Error {
                code: ErrorCode::Internal,
                message,
                ..
            } => SyncError::Transient(message),
            ServerMessage::Error {
                code: ErrorCode::Invalid,
                message,
                ..
            } => SyncError::Protocol(message),
            other => SyncError::Protocol(format!("Unexpected reply: {:?}", other)),
        }
    }
}

impl ClientMessage {
    /// Encode message as CBOR bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ciborium::ser::Error<std::io::Error>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)?;
        Ok(buf)
    }

    /// Decode message from CBOR bytes.
    pub fn decode(data: &[u8]) -> Result<Self, ciborium::de::Error<std::io::Error>> {
        ciborium::from_reader(data)
    }
}

impl ServerMessage {
    pub fn encode(&self) -> Result<Vec<u8>, ciborium::ser::Error<std::io::Error>> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)?;
        Ok(buf)
    }

    pub fn decode(data: &[u8]) -> Result<Self, ciborium::de::Error<std::io::Error>> {
        ciborium::from_reader(data)
    }
}
