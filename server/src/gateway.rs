// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! `ModuleGateway` backed by an HTTP fetch against `GATEWAY_URL`.
//!
//! `ModuleGateway::fetch_module` is a plain synchronous call - the module
//! loader runs on a dedicated execution-worker OS thread (§4.5), never on a
//! `tokio` task - so the bridge into the async `hyper` client is a
//! `Handle::block_on`, the standard way to call async code from a thread
//! the runtime doesn't itself own.

use http_body_util::{BodyExt, Empty};
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use cu::loader::ModuleGateway;
use cu_shared::ModuleId;

use crate::error::IngestError;

type HttpClient = Client<hyper_util::client::legacy::connect::HttpConnector, Empty<bytes::Bytes>>;

pub struct HttpGateway {
    client: HttpClient,
    base_url: String,
    runtime: tokio::runtime::Handle,
}

impl HttpGateway {
    pub fn new(base_url: String, runtime: tokio::runtime::Handle) -> Self {
        let client = Client::builder(TokioExecutor::new()).build_http();
        Self {
            client,
            base_url,
            runtime,
        }
    }

    fn module_url(&self, id: &ModuleId) -> String {
        format!("{}/raw/{}", self.base_url.trim_end_matches('/'), id.as_str())
    }
}

impl ModuleGateway for HttpGateway {
    fn fetch_module(&self, id: &ModuleId) -> Result<Vec<u8>, cu::error::ModuleFetchError> {
        let url = self.module_url(id);
        let client = self.client.clone();
        let id = id.clone();

        self.runtime.block_on(async move {
            let uri: hyper::Uri = url.parse().map_err(|e: http::uri::InvalidUri| {
                cu::error::ModuleFetchError::Transport {
                    module_id: id.clone(),
                    source: anyhow::Error::new(e),
                }
            })?;

            let request = hyper::Request::builder()
                .method(hyper::Method::GET)
                .uri(uri)
                .body(Empty::<bytes::Bytes>::new())
                .map_err(|e| cu::error::ModuleFetchError::Transport {
                    module_id: id.clone(),
                    source: anyhow::Error::new(e),
                })?;

            let response = client
                .request(request)
                .await
                .map_err(|e| cu::error::ModuleFetchError::Transport {
                    module_id: id.clone(),
                    source: anyhow::Error::new(e),
                })?;

            let status = response.status();
            if !status.is_success() {
                return Err(cu::error::ModuleFetchError::Http {
                    module_id: id.clone(),
                    status: status.as_u16(),
                });
            }

            let body = response
                .into_body()
                .collect()
                .await
                .map_err(|e| cu::error::ModuleFetchError::Transport {
                    module_id: id.clone(),
                    source: anyhow::Error::new(e),
                })?
                .to_bytes();

            Ok(body.to_vec())
        })
    }
}

/// Minimal, non-`Codec` extraction of the fields the server needs off an
/// incoming signed-data-item request before it can be handed to the
/// scheduler: an id header and the raw tag set. Decoding the full
/// `Encodable` tree (spec §4.1) is reserved for callers that need the
/// structured value; the ingest path only needs enough to answer `202`.
pub fn tx_id_header(headers: &http::HeaderMap) -> Result<String, IngestError> {
    headers
        .get("id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or(IngestError::MissingField("id"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn module_url_joins_base_and_id_under_raw() {
        let gateway = HttpGateway::new("https://arweave.net/".to_string(), tokio::runtime::Handle::current());
        assert_eq!(
            gateway.module_url(&ModuleId::new("abc123")),
            "https://arweave.net/raw/abc123"
        );
    }

    #[test]
    fn missing_id_header_is_reported_by_name() {
        let headers = http::HeaderMap::new();
        let err = tx_id_header(&headers).unwrap_err();
        assert_eq!(err.to_string(), "data item missing required `id` header");
    }

    #[test]
    fn present_id_header_is_returned() {
        let mut headers = http::HeaderMap::new();
        headers.insert("id", http::HeaderValue::from_static("tx-1"));
        assert_eq!(tx_id_header(&headers).unwrap(), "tx-1");
    }
}
