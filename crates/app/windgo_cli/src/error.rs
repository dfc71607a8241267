use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", .0)]
    Custom(String),

    #[error("Not logged in. Run `windgo login` or `windgo ssh-login` first.")]
    NotLoggedIn,

    #[error("No refresh token stored; only device logins can refresh.")]
    NoRefreshToken,

    #[error("Server returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("SSH: {}", .0)]
    Ssh(String),

    #[error("IO::{:?}: {}", .0, .0)]
    Io(#[from] std::io::Error),

    #[error("Fmt::{:?}: {}", .0, .0)]
    Fmt(#[from] std::fmt::Error),

    #[error("Http: {}", .0)]
    Http(#[from] reqwest::Error),

    #[error("Json: {}", .0)]
    Json(#[from] serde_json::Error),

    #[error("FlexiLogger::{:?}: {}", .0, .0)]
    FlexiLogger(#[from] flexi_logger::FlexiLoggerError),
}
