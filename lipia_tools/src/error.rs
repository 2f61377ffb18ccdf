use thiserror::Error;

#[derive(Debug, Error)]
pub enum LipiaApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("Could not reach the gateway: {0}")]
    RestRequestError(String),
    #[error("Invalid REST response: {0}")]
    RestResponseError(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Query failed. Error {status}. {message}")]
    QueryError { status: u16, message: String },
}

impl LipiaApiError {
    /// True if the gateway understood the request and refused it, as opposed to a transport or server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::QueryError { status, .. } if (400..500).contains(status))
    }
}
