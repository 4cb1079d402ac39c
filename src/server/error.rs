use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

pub type AppResult<T> = Result<T, Error>;

/// everything the proxy can fail with, each variant carries its outward status
/// so handlers never have to build error responses by hand
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid proxy URL: {0}")]
    InvalidUrl(String),

    // the raw ?url= query was present but empty, kept apart from InvalidUrl
    // because an empty value is a client forgetting the parameter, not a
    // malformed target
    #[error("no URL supplied")]
    EmptyUrl,

    #[error("too many redirects (limit {0})")]
    TooManyRedirects(u32),

    #[error("upstream returned status {status}")]
    UpstreamHttp { status: u16 },

    #[error("upstream request timed out")]
    UpstreamTimeout,

    #[error("failed to connect to upstream")]
    UpstreamConnection,

    #[error("unexpected upstream failure: {0}")]
    UpstreamUnexpected(String),

    #[error("channel {0} not found")]
    ChannelNotFound(usize),

    #[error("forbidden")]
    Forbidden,

    #[error("playlist unavailable: {0}")]
    PlaylistUnavailable(String),
}

impl Error {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Error::InvalidUrl(_) | Error::EmptyUrl => StatusCode::BAD_REQUEST,
            Error::TooManyRedirects(_) | Error::UpstreamConnection => StatusCode::BAD_GATEWAY,
            // non-2xx upstream statuses pass through as-is
            Error::UpstreamHttp { status } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            Error::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Error::UpstreamUnexpected(_) | Error::PlaylistUnavailable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Error::ChannelNotFound(_) => StatusCode::NOT_FOUND,
            Error::Forbidden => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        // plain-text diagnostic body, the message names the URL / channel that
        // was rejected so failures can be diagnosed from the response alone
        (self.status_code(), self.to_string()).into_response()
    }
}
