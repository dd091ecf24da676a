use crate::transport::{ApiFamily, ApiRequest, Method};
use crate::twitch::api::requests::{build_url, request};

pub fn send_whisper(helix_base: &str, from_user_id: i64, to_user_id: i64, message: &str) -> ApiRequest {
    let from = from_user_id.to_string();
    let to = to_user_id.to_string();
    let mut whisper = request(
        Method::Post,
        ApiFamily::Helix,
        build_url(helix_base, "whispers", &[("from_user_id", from.as_str()), ("to_user_id", to.as_str())]),
    );
    whisper.body = Some(serde_json::json!({ "message": message }));
    whisper
}
