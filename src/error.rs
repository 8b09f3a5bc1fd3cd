use axum::{http::StatusCode, response::IntoResponse};
use std::fmt::Display;

pub type AppResult<T> = Result<T, AppErr>;

/* ── infrastructure failures: logged, never shown verbatim to chat users ── */
#[derive(thiserror::Error, Debug)]
pub enum AppErr {
    #[error("Bad request: {0}")]
    Bad(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("DB: {0}")]
    Db(#[from] sqlx::Error),

    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JWT: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Upstream: {0}")]
    Upstream(String),
}

impl IntoResponse for AppErr {
    fn into_response(self) -> axum::response::Response {
        let (code, body) = match self {
            AppErr::Bad(msg)          => (StatusCode::BAD_REQUEST, msg),
            AppErr::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            other                     => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()),
        };
        (code, body).into_response()
    }
}

/* ── small helper: turn any error into Upstream ── */
pub fn upstream<E: Display>(e: E) -> AppErr { AppErr::Upstream(e.to_string()) }

/// Failures of a single chat request. The `Display` text is exactly the
/// private reply the requester receives.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestErr {
    #[error("invalid link")]
    InvalidLink,

    #[error("there was an error")]
    MetadataLookupFailed,

    #[error("This song is too long, please keep it under {max_minutes} minutes")]
    SongTooLong { max_minutes: u64 },

    #[error("there is nothing playing right now :(")]
    NothingPlaying,

    #[error("there is nothing in the queue :(")]
    QueueEmpty,

    #[error("You already liked this song.")]
    AlreadyLiked,

    #[error("you have no songs in the queue")]
    NoQueuedSong,

    #[error("please enter a valid integer")]
    InvalidArgument,

    #[error("Index out of range")]
    IndexOutOfRange,

    #[error("I can't allow you to do that, {nick}")]
    NotAuthorized { nick: String },

    #[error("there was an error")]
    PublishFailed,

    #[error("there was an error")]
    InternalInconsistency,
}

pub type RequestResult<T> = Result<T, RequestErr>;
