//! Pooled HTTP client for everything outbound.
//!
//! One [`AisClient`] per process carries the pull-mode fetch, direct-put
//! delivery, and the cluster object API. Workers reach it through the
//! [`ObjectClient`] trait so that recursive ETL calls reuse the same
//! connection pool.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::ClientBuilder;
use tracing::debug;

use aisetl_core::{
    Bucket, ClientError, ClientResult, EtlCall, EtlError, EtlResult, ObjectClient, ServerConfig,
};

/// Result of a direct-put attempt.
///
/// The distinction matters for fallback: a target that was unreachable before
/// any bytes went out allows an inline response; once bytes were sent the
/// failure must surface to the host.
#[derive(Debug)]
pub enum DirectPutOutcome {
    /// The target acknowledged the PUT.
    Delivered,
    /// The connection could not be established; nothing was sent.
    Unreachable(String),
    /// The PUT failed after the request went out.
    Failed(String),
}

/// Pooled HTTP client bound to the process configuration.
pub struct AisClient {
    http: reqwest::Client,
    target_url: Option<String>,
    endpoint: Option<String>,
}

impl AisClient {
    /// Builds the process-wide client from the server configuration.
    pub fn new(config: &ServerConfig) -> ClientResult<Self> {
        let http = ClientBuilder::new()
            .timeout(config.http_timeout())
            .pool_max_idle_per_host(config.max_pool_size)
            .build()
            .map_err(|e| ClientError::Init(e.to_string()))?;
        Ok(Self {
            http,
            target_url: config.ais_target_url.clone(),
            endpoint: config.ais_endpoint.clone(),
        })
    }

    /// Fetches the source object for a pull-mode request.
    ///
    /// `object_path` is the request path without its leading slash; the full
    /// URL is the configured host target plus that path.
    pub async fn fetch(&self, object_path: &str) -> EtlResult<reqwest::Response> {
        let base = match &self.target_url {
            Some(url) => url.trim_end_matches('/'),
            None => {
                return Err(EtlError::FetchFailed {
                    url: object_path.to_string(),
                    reason: "AIS_TARGET_URL is not configured".to_string(),
                });
            }
        };
        let url = format!("{base}/{object_path}");
        debug!(url = %url, "Fetching source object");
        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| EtlError::FetchFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EtlError::FetchFailed {
                url,
                reason: format!("target answered HTTP {}", status.as_u16()),
            });
        }
        Ok(resp)
    }

    /// Writes the transform result to a direct-put target.
    pub async fn direct_put(
        &self,
        url: &str,
        content_type: &str,
        body: Bytes,
    ) -> DirectPutOutcome {
        let result = self
            .http
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => DirectPutOutcome::Delivered,
            Ok(resp) => {
                DirectPutOutcome::Failed(format!("target answered HTTP {}", resp.status().as_u16()))
            }
            Err(e) if e.is_connect() => DirectPutOutcome::Unreachable(e.to_string()),
            Err(e) => DirectPutOutcome::Failed(e.to_string()),
        }
    }

    fn object_url(&self, bucket: &Bucket, key: &str) -> ClientResult<String> {
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or_else(|| ClientError::NotConfigured("AIS_ENDPOINT is not set".to_string()))?;
        Ok(format!(
            "{}/v1/objects/{}/{}",
            endpoint.trim_end_matches('/'),
            bucket.name,
            key
        ))
    }
}

#[async_trait]
impl ObjectClient for AisClient {
    async fn get_object(
        &self,
        bucket: &Bucket,
        key: &str,
        etl: Option<&EtlCall>,
    ) -> ClientResult<Bytes> {
        let url = self.object_url(bucket, key)?;
        let mut req = self
            .http
            .get(&url)
            .query(&[("provider", bucket.provider.as_str())]);
        if let Some(etl) = etl {
            req = req.query(&[("etl_name", etl.name.as_str())]);
            if let Some(args) = &etl.args {
                req = req.query(&[("etl_args", args.as_str())]);
            }
            if etl.direct {
                req = req.query(&[("etl_direct", "true")]);
            }
        }
        let resp = req.send().await.map_err(|e| ClientError::Request {
            url: url.clone(),
            reason: e.to_string(),
        })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }
        resp.bytes().await.map_err(|e| ClientError::Request {
            url,
            reason: e.to_string(),
        })
    }

    async fn put_content(&self, bucket: &Bucket, key: &str, body: Bytes) -> ClientResult<()> {
        let url = self.object_url(bucket, key)?;
        let resp = self
            .http
            .put(&url)
            .query(&[("provider", bucket.provider.as_str())])
            .body(body)
            .send()
            .await
            .map_err(|e| ClientError::Request {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ClientError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
