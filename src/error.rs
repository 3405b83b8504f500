//! Server-level error type.

/// Infrastructure failures surfaced by [`Server::serve`](crate::Server::serve):
/// binding the listening socket, mostly.
///
/// Request-level failures never show up here. They are expressed as HTTP
/// [`Response`](crate::Response) values by the handlers and middleware.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
