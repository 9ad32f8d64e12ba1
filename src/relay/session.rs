//! Session issuance and ingestion contract
//!
//! The relay never talks to storage directly; it goes through a
//! `SessionBackend`, which is whatever collaborator issues sessions and
//! accepts merged deliveries. The crate ships one reference implementation
//! (`storage::ingest::IngestService`).

use crate::capture::FlushSnapshot;
use crate::utils::errors::Result;
use bytes::Bytes;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

/// Identity under which a session is opened
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionRequest {
    pub account_id: String,
    pub website_id: String,
    pub origin_url: Option<String>,
    pub user_agent: Option<String>,
}

/// Issued session identity, idempotent for the browsing session's lifetime
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTicket {
    pub session_id: String,
    pub account_id: String,
    pub website_id: String,
    pub profiler_id: String,
}

/// The merged wire payload a delivery carries: OR of batch error flags, sum
/// of batch durations, and the concatenated decoded batches
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestEnvelope {
    pub error: bool,
    pub duration: i64,
    pub event_buffer: Vec<FlushSnapshot>,
}

/// One delivery handed to the backend: the envelope re-compressed as `body`,
/// with the flags duplicated for routing without decompression
#[derive(Debug, Clone)]
pub struct DeliveryPayload {
    pub error: bool,
    pub duration: i64,
    pub body: Bytes,
}

/// Collaborator that issues sessions and accepts merged deliveries
pub trait SessionBackend: Send + Sync {
    /// Open a session; called once per browsing session before ingestion
    fn create_session(
        &self,
        request: SessionRequest,
    ) -> BoxFuture<'_, Result<SessionTicket>>;

    /// Accept one merged delivery scoped to an issued session
    fn ingest<'a>(
        &'a self,
        ticket: &'a SessionTicket,
        delivery: DeliveryPayload,
    ) -> BoxFuture<'a, Result<()>>;
}
