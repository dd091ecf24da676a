use crate::transport::{ApiFamily, ApiRequest, Method};
use crate::twitch::api::requests::{build_url, request};

pub fn stream_status(helix_base: &str, channel: &str) -> ApiRequest {
    request(
        Method::Get,
        ApiFamily::Helix,
        build_url(helix_base, "streams", &[("user_login", channel)]),
    )
}
