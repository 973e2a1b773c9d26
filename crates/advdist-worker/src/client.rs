//! HTTP client for talking to the coordinator.
//!
//! A single long-lived `reqwest::Client`, cloned cheaply per call, with
//! idle connections kept warm across the steady-state loop's many small
//! requests.

use std::time::Duration;

use advdist_core::model::Versions;
use advdist_core::wire::{decode_id_prefixed, decode_ids, decode_u64};
use anyhow::Context;
use bytes::Bytes;
use reqwest::StatusCode;

const EXTRA_HEADER: &str = "X-Extra-Data";
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// Thin wrapper over `reqwest::Client` scoped to one coordinator base
/// URL. Every method call is fatal-on-error at the process level:
/// callers propagate `?` up to `main`, which exits.
#[derive(Clone)]
pub struct CoordinatorClient {
    http: reqwest::Client,
    base_url: String,
}

impl CoordinatorClient {
    pub fn new(base_url: impl Into<String>) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(4)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_bytes(&self, path: &str) -> anyhow::Result<Bytes> {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("GET {path} failed"))?
            .error_for_status()
            .with_context(|| format!("GET {path} returned an error status"))?;
        Ok(response.bytes().await?)
    }

    async fn post_bytes(&self, path: &str, body: Bytes) -> anyhow::Result<()> {
        self.http
            .post(self.url(path))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .with_context(|| format!("POST {path} failed"))?
            .error_for_status()
            .with_context(|| format!("POST {path} returned an error status"))?;
        Ok(())
    }

    pub async fn get_ids(&self) -> anyhow::Result<Versions> {
        let body = self.get_bytes("/ids").await?;
        decode_ids(&body).context("malformed /ids response")
    }

    pub async fn get_model(&self) -> anyhow::Result<Bytes> {
        self.get_bytes("/model").await
    }

    pub async fn get_attack(&self) -> anyhow::Result<Bytes> {
        self.get_bytes("/attack").await
    }

    pub async fn get_model_state(&self) -> anyhow::Result<Bytes> {
        self.get_bytes("/model_state").await
    }

    pub async fn get_num_batches(&self) -> anyhow::Result<u64> {
        let body = self.get_bytes("/num_batches").await?;
        decode_u64(&body).context("malformed /num_batches response")
    }

    pub async fn get_clean_batch(&self) -> anyhow::Result<(u64, Bytes)> {
        let body = self.get_bytes("/clean_batch").await?;
        decode_id_prefixed(&body).context("malformed /clean_batch response")
    }

    /// Posts an adversarial batch, tagging it with `extra` via the
    /// `X-Extra-Data` header.
    pub async fn post_adv_batch(
        &self,
        id: u64,
        adv: &[u8],
        extra: &str,
    ) -> anyhow::Result<()> {
        use advdist_core::wire::encode_id_prefixed;

        let body = encode_id_prefixed(id, adv);
        let response = self
            .http
            .post(self.url("/adv_batch"))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(EXTRA_HEADER, extra)
            .body(body)
            .send()
            .await
            .context("POST /adv_batch failed")?;

        if response.status() != StatusCode::OK {
            anyhow::bail!("POST /adv_batch returned status {}", response.status());
        }
        Ok(())
    }

    /// Convenience used only by the worker's own setup tests, not by
    /// the steady-state loop. The worker never changes parameters.
    #[cfg(test)]
    pub async fn post_parameters(&self, params: advdist_core::model::RunParams) -> anyhow::Result<()> {
        use advdist_core::wire::encode_parameters;
        self.post_bytes("/parameters", encode_parameters(params))
            .await
    }
}
