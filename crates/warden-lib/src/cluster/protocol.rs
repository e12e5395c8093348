//! Cluster message envelope
//!
//! Every exchange between peer nodes is a `{from_node, kind, payload}`
//! envelope. Payloads are opaque bytes to the transport; both layers are
//! serialized with serde_json.

use crate::config::{PrivilegedOverride, WardenConfig};
use crate::models::OwnerReport;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message kinds exchanged over the cluster transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    SettingsPush,
    PrivilegedOwnerPush,
    ReportRequest,
    ReportResponse,
}

impl MessageKind {
    /// Stable snake_case key for logs and metric labels
    pub fn key(&self) -> &'static str {
        match self {
            MessageKind::SettingsPush => "settings_push",
            MessageKind::PrivilegedOwnerPush => "privileged_owner_push",
            MessageKind::ReportRequest => "report_request",
            MessageKind::ReportResponse => "report_response",
        }
    }
}

/// Errors from envelope or payload handling
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Envelope(#[source] serde_json::Error),

    #[error("malformed {kind:?} payload: {source}")]
    Payload {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {kind:?} message: {source}")]
    Encode {
        kind: MessageKind,
        #[source]
        source: serde_json::Error,
    },
}

/// One cluster message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub from_node: u64,
    pub kind: MessageKind,
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl Envelope {
    fn with_payload<T: Serialize + ?Sized>(
        from_node: u64,
        kind: MessageKind,
        body: &T,
    ) -> Result<Self, ProtocolError> {
        let payload =
            serde_json::to_vec(body).map_err(|source| ProtocolError::Encode { kind, source })?;
        Ok(Self {
            from_node,
            kind,
            payload,
        })
    }

    pub fn settings_push(from_node: u64, config: &WardenConfig) -> Result<Self, ProtocolError> {
        Self::with_payload(from_node, MessageKind::SettingsPush, config)
    }

    pub fn override_push(
        from_node: u64,
        record: &PrivilegedOverride,
    ) -> Result<Self, ProtocolError> {
        Self::with_payload(from_node, MessageKind::PrivilegedOwnerPush, record)
    }

    pub fn report_request(from_node: u64) -> Self {
        Self {
            from_node,
            kind: MessageKind::ReportRequest,
            payload: Vec::new(),
        }
    }

    pub fn report_response(
        from_node: u64,
        reports: &[OwnerReport],
    ) -> Result<Self, ProtocolError> {
        Self::with_payload(from_node, MessageKind::ReportResponse, reports)
    }

    pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(self).map_err(|source| ProtocolError::Encode {
            kind: self.kind,
            source,
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        serde_json::from_slice(bytes).map_err(ProtocolError::Envelope)
    }

    /// Deserialize the payload as `T`
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, ProtocolError> {
        serde_json::from_slice(&self.payload).map_err(|source| ProtocolError::Payload {
            kind: self.kind,
            source,
        })
    }
}
