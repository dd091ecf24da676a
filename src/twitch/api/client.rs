use std::collections::HashMap;

use log::debug;
use reqwest::Client;
use tokio::runtime::Handle;

use crate::transport::{ApiCompletion, ApiError, ApiFamily, ApiRequest, ApiResponse, HttpClient, Method};

const LEGACY_ACCEPT: &str = "application/vnd.twitchtv.v5+json";

/// [`HttpClient`] backed by an async reqwest client on a tokio runtime.
///
/// Completions run on the runtime's blocking pool, so they may take locks.
#[derive(Clone)]
pub struct ReqwestHttpClient {
    client: Client,
    runtime: Handle,
}

impl ReqwestHttpClient {
    pub fn new(runtime: Handle) -> Self {
        Self {
            client: Client::new(),
            runtime,
        }
    }
}

fn authorization(request: &ApiRequest) -> String {
    let token = request.token.trim_start_matches("oauth:");
    match request.family {
        ApiFamily::Legacy => format!("OAuth {}", token),
        ApiFamily::Helix => format!("Bearer {}", token),
    }
}

async fn perform(client: &Client, request: ApiRequest) -> Result<ApiResponse, ApiError> {
    let mut builder = match request.method {
        Method::Get => client.get(&request.url),
        Method::Post => client.post(&request.url),
    };
    builder = builder
        .header("Client-ID", &request.client_id)
        .header("Authorization", authorization(&request));
    if request.family == ApiFamily::Legacy {
        builder = builder.header("Accept", LEGACY_ACCEPT);
    }
    if let Some(body) = &request.body {
        builder = builder.json(body);
    }

    let response = builder
        .send()
        .await
        .map_err(|e| ApiError::Transport(e.to_string()))?;
    let status = response.status().as_u16();
    let headers: HashMap<String, String> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = response
        .text()
        .await
        .map_err(|e| ApiError::Transport(e.to_string()))?;
    Ok(ApiResponse { status, headers, body })
}

impl HttpClient for ReqwestHttpClient {
    fn request(&self, request: ApiRequest, on_complete: ApiCompletion) {
        let client = self.client.clone();
        debug!("{} {}", request.method, request.url);
        self.runtime.spawn(async move {
            let result = perform(&client, request).await;
            if tokio::task::spawn_blocking(move || on_complete(result)).await.is_err() {
                log::error!("API completion handler panicked");
            }
        });
    }
}
