pub mod listing;
pub mod reddit;

pub use reddit::{RedditClient, RedditCredentials};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForumError {
    #[error("Reddit authentication failed ({status}): {body}")]
    Auth { status: u16, body: String },

    #[error("Reddit API error for {endpoint} ({status}): {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("Network error calling {endpoint}: {source}")]
    Network {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected payload from {endpoint}: {details}")]
    Payload { endpoint: String, details: String },
}
