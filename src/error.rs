use thiserror::Error;

/// A control request (toggle or door click) that did not complete.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered {status} for {endpoint}")]
    Status {
        endpoint: String,
        status: reqwest::StatusCode,
    },

    #[error("unable to deserialize response from {endpoint}. Body was: \"{body}\"")]
    Decode { endpoint: String, body: String },
}

/// Stream-level failure of the push channel. Never fatal: the transport
/// reconnects on its own after reporting it.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("unable to connect: {0}")]
    Connect(reqwest::Error),

    #[error("stream endpoint answered {0}")]
    Status(reqwest::StatusCode),

    #[error("stream read failed: {0}")]
    Read(reqwest::Error),

    #[error("stream closed by server")]
    Closed,
}

#[derive(Debug, Error)]
#[error("malformed push message: {source}. Body was: \"{body}\"")]
pub struct ParseError {
    pub body: String,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("camera request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("camera answered {0}")]
    Status(reqwest::StatusCode),

    #[error("camera returned an empty image")]
    Empty,

    #[error("unable to store snapshot: {0}")]
    Write(#[from] std::io::Error),
}
