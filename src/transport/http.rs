use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Malformed response body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Which Twitch API a request targets; the two differ in how they authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFamily {
    Legacy,
    Helix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    pub family: ApiFamily,
    pub url: String,
    pub client_id: String,
    pub token: String,
    pub body: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Header names are lower-cased.
    pub headers: HashMap<String, String>,
    pub body: String,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }
}

pub type ApiCompletion = Box<dyn FnOnce(Result<ApiResponse, ApiError>) + Send>;

/// The HTTP collaborator. `on_complete` must run after `request` returns,
/// never from inside it.
pub trait HttpClient: Send + Sync {
    fn request(&self, request: ApiRequest, on_complete: ApiCompletion);
}
