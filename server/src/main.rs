// Copyright 2024 Compute Unit Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

//! The compute-unit evaluation pipeline's HTTP surface (spec §6): `POST
//! /message`, answered `202` immediately after the message is handed off,
//! with the crank continuing in the background.

mod app;
mod config;
mod crank;
mod error;
mod gateway;
mod registry;
mod store;

use std::convert::Infallible;
use std::sync::Arc;

use bytes::Bytes;
use clap::Parser;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as AutoBuilder;
use tokio::net::TcpListener;

use app::App;
use config::Config;
use cu_shared::{ProcessId, Tag};
use gateway::tx_id_header;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = Config::parse();
    log::info!("starting cu-server on {}", config.addr);

    let app = Arc::new(App::new(config.clone(), tokio::runtime::Handle::current())?);
    let listener = TcpListener::bind(config.addr).await?;

    let server_app = app.clone();
    let serve = tokio::spawn(async move {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(err) => {
                    log::warn!("accept failed: {err}");
                    continue;
                }
            };
            let io = TokioIo::new(stream);
            let app = server_app.clone();

            tokio::spawn(async move {
                let service = hyper::service::service_fn(move |req| handle(app.clone(), req));
                if let Err(err) = AutoBuilder::new(TokioExecutor::new())
                    .serve_connection(io, service)
                    .await
                {
                    log::debug!("connection from {peer} closed: {err}");
                }
            });
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutdown signal received, cancelling in-flight evaluations");
            app.cancel_all();
        }
        res = serve => {
            if let Err(err) = res {
                log::error!("server task panicked: {err}");
            }
        }
    }

    Ok(())
}

async fn handle(app: Arc<App>, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    if req.method() != hyper::Method::POST || req.uri().path() != "/message" {
        return Ok(text_response(StatusCode::NOT_FOUND, "not found"));
    }

    let headers = req.headers().clone();
    let tx_id = match tx_id_header(&headers) {
        Ok(id) => id,
        Err(err) => return Ok(text_response(StatusCode::BAD_REQUEST, &err.to_string())),
    };
    let process_id = match headers.get("process-id").and_then(|v| v.to_str().ok()) {
        Some(id) => ProcessId::new(id),
        None => return Ok(text_response(StatusCode::BAD_REQUEST, "missing `process-id` header")),
    };
    let owner = headers
        .get("owner")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("unknown")
        .to_string();
    let tags = headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.as_str().strip_prefix("tag-")?;
            Some(Tag::new(name.to_string(), value.to_str().ok()?.to_string()))
        })
        .collect::<Vec<_>>();

    // The body itself (the raw signed data item) is consumed here only to
    // drain the connection; the distilled spec forwards it to the scheduler
    // unchanged, which is outside this workspace's scope (SPEC_FULL §1).
    if let Err(err) = req.into_body().collect().await {
        log::warn!("failed to read request body: {err}");
    }

    let response_tx_id = tx_id.clone();
    tokio::task::spawn_blocking(move || {
        if let Err(err) = app.dispatch_and_crank(process_id.clone(), owner, tags, tx_id) {
            log::warn!("process {process_id}: ingest failed: {err}");
        }
    });

    let body = serde_json::json!({ "message": "Processing message", "id": response_tx_id }).to_string();
    Ok(Response::builder()
        .status(StatusCode::ACCEPTED)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body)))
        .expect("static response is well-formed"))
}

fn text_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "text/plain")
        .body(Full::new(Bytes::from(body.to_string())))
        .expect("static response is well-formed")
}
