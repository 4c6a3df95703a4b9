//! Scripted transport used by the engine's unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use music_proto::protocol::Envelope;
use serde::Serialize;

use crate::error::ClientError;
use crate::gateway::{ApiRequest, RawResponse, Transport};

#[derive(Clone)]
struct Reply {
    delay: Option<Duration>,
    result: Result<RawResponse, ClientError>,
}

/// Replies are queued per key: `path`, or `path?source=<id>` where `<id>`
/// is the request's `source` query (or `platform` for login calls).  The
/// last reply of a queue is sticky and repeats for every further request.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    log: Mutex<Vec<ApiRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, path: &str, response: RawResponse) {
        self.push(path.to_string(), None, Ok(response));
    }

    pub fn respond_after(&self, path: &str, delay: Duration, response: RawResponse) {
        self.push(path.to_string(), Some(delay), Ok(response));
    }

    pub fn respond_for(&self, path: &str, source: &str, response: RawResponse) {
        self.push(source_key(path, source), None, Ok(response));
    }

    pub fn respond_for_after(
        &self,
        path: &str,
        source: &str,
        delay: Duration,
        response: RawResponse,
    ) {
        self.push(source_key(path, source), Some(delay), Ok(response));
    }

    pub fn fail(&self, path: &str, error: ClientError) {
        self.push(path.to_string(), None, Err(error));
    }

    pub fn requests(&self) -> Vec<ApiRequest> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    fn push(&self, key: String, delay: Option<Duration>, result: Result<RawResponse, ClientError>) {
        self.replies
            .lock()
            .unwrap()
            .entry(key)
            .or_default()
            .push_back(Reply { delay, result });
    }

    fn next_reply(&self, request: &ApiRequest) -> Option<Reply> {
        let mut replies = self.replies.lock().unwrap();
        let keyed = request
            .query_value("source")
            .or_else(|| request.query_value("platform"))
            .map(|s| source_key(&request.path, s))
            .filter(|k| replies.contains_key(k));
        let key = keyed.unwrap_or_else(|| request.path.clone());
        let queue = replies.get_mut(&key)?;
        if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ClientError> {
        self.log.lock().unwrap().push(request.clone());
        let reply = self.next_reply(request).ok_or_else(|| {
            ClientError::Transport(format!("no scripted reply for {}", request.label()))
        })?;
        if let Some(delay) = reply.delay {
            tokio::time::sleep(delay).await;
        }
        reply.result
    }
}

fn source_key(path: &str, source: &str) -> String {
    format!("{}?source={}", path, source)
}

/// A 200 response carrying a success envelope around `data`.
pub fn ok_json(data: impl Serialize) -> RawResponse {
    RawResponse {
        status: 200,
        body: serde_json::to_vec(&Envelope::ok(data)).unwrap(),
    }
}

/// A response carrying a failure envelope.
pub fn api_error(code: i64, message: &str) -> RawResponse {
    RawResponse {
        status: 400,
        body: serde_json::to_vec(&Envelope::error(code, message)).unwrap(),
    }
}
