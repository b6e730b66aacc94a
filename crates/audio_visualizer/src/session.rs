use hyper::header::{HeaderMap, COOKIE};
use uuid::Uuid;

/// Name of the cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session_id";

/// Generate a fresh opaque session token.
pub fn new_session_id() -> String {
    Uuid::new_v4().as_hyphenated().to_string()
}

/// `Set-Cookie` value establishing a session for future requests.
pub fn set_cookie_value(session_id: &str) -> String {
    format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly")
}

/// Extract the session token from the request's `Cookie` headers.
///
/// Tokens are used as directory names, so anything that could escape the
/// media root (path separators, dot components) is treated as no session.
pub fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            (name.trim() == SESSION_COOKIE).then(|| value.trim())
        })
        .find_map(|token| valid_token(token).then(|| token.to_string()))
}

fn valid_token(token: &str) -> bool {
    !token.is_empty()
        && !token.starts_with('.')
        && !token.contains(['/', '\\'])
        && !token.contains("..")
}
