use cf_domain::error::Error;

/// Map a reqwest error onto the shared error type, preserving the timeout
/// kind so callers can distinguish it.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Fold a non-success HTTP response into a `RemoteApi` error.
pub(crate) fn remote_api_error(provider: &str, status: u16, body: &str) -> Error {
    // Keep the body short; provider error payloads can be pages long.
    let message: String = body.chars().take(500).collect();
    Error::RemoteApi {
        provider: provider.to_owned(),
        status,
        message,
    }
}
