use thiserror::Error;

pub type Result<T> = core::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("{}", .0)]
    Custom(String),

    #[error("IO::{:?}: {}", .0, .0)]
    Io(#[from] std::io::Error),

    #[error("Session::{}", .0)]
    Session(#[from] stardust_core::session::SessionError),

    #[error("Transport::{}", .0)]
    Transport(#[from] stardust_core::transport::TransportError),

    #[error("{}", .0)]
    Api(#[from] stardust_core::api::ApiError),

    #[error("{}", .0)]
    Selection(#[from] stardust_core::hierarchy::SelectionError),

    #[error("{}", .0)]
    Filter(#[from] stardust_core::filters::FilterError),
}
