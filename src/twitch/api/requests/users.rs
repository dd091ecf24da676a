use crate::transport::{ApiFamily, ApiRequest, Method};
use crate::twitch::api::requests::{build_url, request};

/// Batch lookup of users by login.
pub fn users_by_login(legacy_base: &str, logins: &[String]) -> ApiRequest {
    let logins = logins.join(",");
    request(
        Method::Get,
        ApiFamily::Legacy,
        build_url(legacy_base, "users", &[("login", logins.as_str())]),
    )
}

pub fn user_by_id(legacy_base: &str, id: i64) -> ApiRequest {
    request(
        Method::Get,
        ApiFamily::Legacy,
        build_url(legacy_base, &format!("users/{}", id), &[]),
    )
}
