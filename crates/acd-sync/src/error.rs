use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    #[error("scope key is empty")]
    EmptyScope,
    #[error("unsupported origin scheme: {0}")]
    UnsupportedScheme(String),
    #[error("origin cannot carry a path: {0}")]
    CannotBeABase(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("endpoint error: {0}")]
    Endpoint(#[from] EndpointError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {detail}")]
    Status { status: u16, detail: String },
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("endpoint error: {0}")]
    Endpoint(#[from] EndpointError),
    #[error("api error: {0}")]
    Api(#[from] ApiError),
    #[error("no project is connected")]
    NoScope,
    #[error("no REST client configured")]
    ApiUnavailable,
    #[error("no pending question to answer")]
    NoPendingQuestion,
}
