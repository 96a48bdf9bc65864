use thiserror::Error as ThisError;

pub type OpaqueError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("failed to resolve ip address: {0}")]
    Resolution(String),
    #[error("failed to open probing transport: {0}")]
    TransportOpen(#[source] std::io::Error),
    #[error("failed to send echo request: {0}")]
    TransportWrite(#[source] std::io::Error),
    #[error("reply listener stopped: {0}")]
    ListenerStopped(String),
    #[error("unable to get devices in room {room}: {source}")]
    Directory {
        room: String,
        #[source]
        source: OpaqueError,
    },
    #[error("{0}")]
    Opaque(#[from] OpaqueError),
}
pub type Result<T> = std::result::Result<T, Error>;
