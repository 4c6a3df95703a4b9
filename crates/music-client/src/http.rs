//! reqwest-backed [`Transport`] talking to the music API server.

use std::time::Duration;

use async_trait::async_trait;
use music_proto::config::ServerConfig;
use tracing::debug;

use crate::error::ClientError;
use crate::gateway::{ApiRequest, Method, RawResponse, Transport};

pub struct HttpTransport {
    client: reqwest::Client,
    api_root: String,
}

impl HttpTransport {
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            api_root: format!("{}/api", config.base_url.trim_end_matches('/')),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.api_root, path.trim_start_matches('/'))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<RawResponse, ClientError> {
        let url = self.url(&request.path);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        debug!("{} -> {}", request.label(), url);
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?;
        Ok(RawResponse {
            status,
            body: body.to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_api_root() {
        let transport = HttpTransport::new(&ServerConfig {
            base_url: "http://nas.local:8080/".into(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(
            transport.url("nas/download/batch"),
            "http://nas.local:8080/api/nas/download/batch"
        );
    }
}
