//! Boots a coordinator in-process on an ephemeral port and drives it
//! with `reqwest`, scoped to this workspace's single HTTP surface (no
//! deployment/catalog machinery to model).

use std::time::Duration;

use advdist_core::model::{RunParams, Versions};
use advdist_core::wire::{decode_id_prefixed, decode_ids, decode_u64, encode_id_prefixed, encode_ids, encode_parameters};
use advdist_coordinator::AppState;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub struct TestCoordinator {
    pub base_url: String,
    pub client: reqwest::Client,
    server_task: JoinHandle<()>,
}

impl TestCoordinator {
    /// Boots a coordinator with a loader seeded with `batch_count`
    /// synthetic batches. Nothing is POSTed yet; the setup barrier is
    /// still closed on return.
    pub async fn start(batch_count: usize) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().expect("listener has no local addr");

        let state = AppState::with_demo_batches(batch_count);

        let server_task = tokio::spawn(async move {
            advdist_coordinator::run_with_listener(listener, state)
                .await
                .expect("coordinator server task failed");
        });

        Self {
            base_url: format!("http://{addr}"),
            client: reqwest::Client::new(),
            server_task,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Completes all six setup POSTs so the barrier opens.
    pub async fn setup(&self, params: RunParams) {
        self.post("/parameters", encode_parameters(params).to_vec())
            .await;
        self.post("/dataset", b"dataset-blob".to_vec()).await;
        self.post("/data_loader", b"loader-config".to_vec()).await;
        self.post("/model", b"model-blob".to_vec()).await;
        self.post("/model_state", b"model-state-blob".to_vec())
            .await;
        self.post("/attack", b"attack-blob".to_vec()).await;
    }

    pub async fn post(&self, path: &str, body: Vec<u8>) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .await
            .unwrap_or_else(|err| panic!("POST {path} failed: {err}"))
    }

    pub async fn post_with_header(
        &self,
        path: &str,
        body: Vec<u8>,
        header: &str,
        value: &str,
    ) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .header(header, value)
            .body(body)
            .send()
            .await
            .unwrap_or_else(|err| panic!("POST {path} failed: {err}"))
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .unwrap_or_else(|err| panic!("GET {path} failed: {err}"))
    }

    pub async fn get_ids(&self) -> Versions {
        let body = self.get("/ids").await.bytes().await.unwrap();
        decode_ids(&body).expect("malformed /ids body")
    }

    pub async fn get_num_batches(&self) -> u64 {
        let body = self.get("/num_batches").await.bytes().await.unwrap();
        decode_u64(&body).expect("malformed /num_batches body")
    }

    /// GETs `/clean_batch` with a short timeout, returning `None` if it
    /// is still blocked (used to assert backpressure, scenario S4).
    pub async fn try_get_clean_batch(&self, timeout: Duration) -> Option<(u64, bytes::Bytes)> {
        let fut = self.get("/clean_batch");
        match tokio::time::timeout(timeout, fut).await {
            Ok(response) => {
                let body = response.bytes().await.unwrap();
                Some(decode_id_prefixed(&body).expect("malformed /clean_batch body"))
            }
            Err(_) => None,
        }
    }

    pub async fn get_clean_batch(&self) -> (u64, bytes::Bytes) {
        let body = self.get("/clean_batch").await.bytes().await.unwrap();
        decode_id_prefixed(&body).expect("malformed /clean_batch body")
    }

    pub async fn post_adv_batch(&self, id: u64, payload: &[u8], extra: &str) -> reqwest::Response {
        let body = encode_id_prefixed(id, payload).to_vec();
        self.post_with_header("/adv_batch", body, "X-Extra-Data", extra)
            .await
    }

    pub async fn get_adv_batch(&self) -> (bytes::Bytes, Option<String>) {
        let response = self.get("/adv_batch").await;
        let extra = response
            .headers()
            .get("X-Extra-Data")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());
        let body = response.bytes().await.unwrap();
        (body, extra)
    }
}

impl Drop for TestCoordinator {
    fn drop(&mut self) {
        self.server_task.abort();
    }
}
