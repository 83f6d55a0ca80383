//! Error types for the core library.

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while placing servers or routing clients.
///
/// None of these are fatal: the ring and registry stay usable after any of
/// them is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// No servers are registered, so there is nowhere to route a key.
    #[error("ring is empty")]
    RingEmpty,

    /// A virtual node already occupies this exact ring position.
    #[error("ring position {0} is already occupied")]
    PositionCollision(String),

    /// The server exists but is not accepting clients.
    #[error("server {0} is unavailable")]
    ServerUnavailable(String),

    /// Every registered server was tried during one assignment chain.
    #[error("no server accepted client {0}")]
    AllServersExhausted(String),

    /// No server with this name is registered.
    #[error("unknown server: {0}")]
    UnknownServer(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A normalised position outside `[0, 1)`.
    #[error("position {0} is outside [0, 1)")]
    InvalidPosition(String),
}
