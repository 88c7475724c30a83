//! Display-message extraction for backend error bodies.
//!
//! The backend reports failures as `{"detail": "..."}` or, for validation
//! errors, `{"detail": [{"msg": "..."}, ...]}`.

use reqwest::StatusCode;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<Detail>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Detail {
    Message(String),
    Items(Vec<DetailItem>),
}

#[derive(Debug, Deserialize)]
struct DetailItem {
    #[serde(default)]
    msg: Option<String>,
}

/// Generic message used when the body carries no usable `detail`.
pub fn fallback_message(status: StatusCode) -> String {
    format!("Request failed with status {}", status.as_u16())
}

/// Extract the display message from an error body.
///
/// A string `detail` is returned as is. An array is reduced to its `msg`
/// entries joined with `", "`. Anything else falls back to
/// [`fallback_message`].
pub fn extract_detail(status: StatusCode, body: &[u8]) -> String {
    let Ok(parsed) = serde_json::from_slice::<ErrorBody>(body) else {
        return fallback_message(status);
    };

    match parsed.detail {
        Some(Detail::Message(message)) => message,
        Some(Detail::Items(items)) => {
            let messages: Vec<String> = items.into_iter().filter_map(|item| item.msg).collect();
            if messages.is_empty() {
                fallback_message(status)
            } else {
                messages.join(", ")
            }
        }
        None => fallback_message(status),
    }
}
