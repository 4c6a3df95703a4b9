//! RequestGateway: the single path every `/api/` call takes.
//!
//! It owns envelope decoding (`{code, message, data}`), maps failures onto
//! [`ClientError`], and brackets foreground calls with the busy indicator.
//! The wire itself sits behind the [`Transport`] trait so the engine can be
//! driven by a scripted transport in tests.

use std::sync::Arc;

use async_trait::async_trait;
use music_proto::protocol::Envelope;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::busy::BusyIndicator;
use crate::error::ClientError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// One call against the `/api/` surface.  `path` is relative to `/api/`.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Self {
        match serde_json::to_value(body) {
            Ok(value) => self.body = Some(value),
            Err(e) => warn!("dropping unserializable body for {}: {}", self.path, e),
        }
        self
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// "GET search" style label for logs.
    pub fn label(&self) -> String {
        let method = match self.method {
            Method::Get => "GET",
            Method::Post => "POST",
        };
        format!("{} {}", method, self.path)
    }
}

/// Status line and raw body of a response.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Moves an [`ApiRequest`] over the wire.  Implementations only report
/// transport-level failures; envelope handling belongs to the gateway.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ClientError>;
}

/// Whether a call shows the busy indicator.  Calls that are part of a larger
/// operation (fan-out members, background polls) run `Silent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    Foreground,
    Silent,
}

#[derive(Clone)]
pub struct RequestGateway {
    transport: Arc<dyn Transport>,
    busy: Arc<BusyIndicator>,
}

impl RequestGateway {
    pub fn new(transport: Arc<dyn Transport>, busy: Arc<BusyIndicator>) -> Self {
        Self { transport, busy }
    }

    pub fn busy(&self) -> &Arc<BusyIndicator> {
        &self.busy
    }

    /// Issue a JSON call and decode the envelope's `data` as `T`.
    pub async fn call<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
        mode: CallMode,
    ) -> Result<T, ClientError> {
        let _guard = self.bracket(mode);
        let label = request.label();
        let raw = self.transport.send(&request).await?;
        let result = decode_envelope(&raw);
        if let Err(e) = &result {
            debug!("{} failed: {}", label, e);
        }
        result
    }

    /// Like [`call`](Self::call) for endpoints returning a list; a `null`
    /// payload is an empty list.
    pub async fn call_list<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
        mode: CallMode,
    ) -> Result<Vec<T>, ClientError> {
        let list: Option<Vec<T>> = self.call(request, mode).await?;
        Ok(list.unwrap_or_default())
    }

    /// Issue a call whose successful answer is a binary body rather than an
    /// envelope.  Success is any 2xx status; on failure the body is read as
    /// an envelope when possible to recover the server's message.
    pub async fn call_blob(
        &self,
        request: ApiRequest,
        mode: CallMode,
    ) -> Result<Vec<u8>, ClientError> {
        let _guard = self.bracket(mode);
        let raw = self.transport.send(&request).await?;
        if raw.is_success() {
            return Ok(raw.body);
        }
        match serde_json::from_slice::<Envelope>(&raw.body) {
            Ok(envelope) if !envelope.is_success() => {
                Err(ClientError::api(envelope.code, envelope.message))
            }
            _ => Err(ClientError::api(i64::from(raw.status), None)),
        }
    }

    fn bracket(&self, mode: CallMode) -> Option<crate::busy::BusyGuard> {
        match mode {
            CallMode::Foreground => Some(self.busy.acquire()),
            CallMode::Silent => None,
        }
    }
}

/// Decode `{code, message, data}` and extract `data` on success.
///
/// The HTTP status is deliberately ignored: the server reports failures with
/// a non-zero `code` in the body, whatever the status line says.
pub fn decode_envelope<T: DeserializeOwned>(raw: &RawResponse) -> Result<T, ClientError> {
    let envelope: Envelope =
        serde_json::from_slice(&raw.body).map_err(|_| ClientError::InvalidResponse)?;
    if !envelope.is_success() {
        return Err(ClientError::api(envelope.code, envelope.message));
    }
    envelope.decode_data().map_err(|e| {
        debug!("payload did not match the expected shape: {}", e);
        ClientError::InvalidResponse
    })
}
