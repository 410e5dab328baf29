use crate::error::RequestError;
use crate::request::state::ContentMetadata;

/// Final result of a request, captured during teardown while the engine
/// peer was still alive.
#[derive(Debug, Clone)]
pub struct RequestOutcome {
    pub url: String,
    /// HTTP status as reported by the engine; 0 if no response arrived.
    pub http_status: u16,
    pub content: ContentMetadata,
    /// What `exception()` reported at teardown.
    pub error: Option<RequestError>,
    pub canceled: bool,
}

impl RequestOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
