pub mod streams;
pub mod users;
pub mod whispers;

pub use streams::stream_status;
pub use users::{user_by_id, users_by_login};
pub use whispers::send_whisper;

use url::Url;

use crate::transport::{ApiFamily, ApiRequest, Method};

pub(crate) fn build_url(base: &str, path: &str, query: &[(&str, &str)]) -> String {
    let joined = format!("{}/{}", base.trim_end_matches('/'), path);
    match Url::parse(&joined) {
        Ok(mut url) => {
            if !query.is_empty() {
                url.query_pairs_mut().extend_pairs(query);
            }
            url.into()
        }
        Err(e) => {
            log::warn!("Invalid API URL {}: {}", joined, e);
            joined
        }
    }
}

/// Credentials are filled in when the call is dispatched.
pub(crate) fn request(method: Method, family: ApiFamily, url: String) -> ApiRequest {
    ApiRequest {
        method,
        family,
        url,
        client_id: String::new(),
        token: String::new(),
        body: None,
    }
}
