use std::io;

/**
 * Failures of a single delivery attempt.
 *
 * Always recoverable: the dispatcher closes the transport, waits, and tries
 * the same message again. Producers never see these.
 */
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to resolve collector {endpoint}: {source}")]
    Resolve {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to connect to collector {endpoint}: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to write to collector {endpoint}: {source}")]
    Write {
        endpoint: String,
        #[source]
        source: io::Error,
    },
}

/// Invalid options, reported at construction time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("endpoint is missing a port")]
    MissingPort,

    #[error("endpoint host is empty")]
    EmptyHost,

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("queue capacity must be greater than zero")]
    ZeroCapacity,

    #[error("connect timeout must be greater than zero")]
    ZeroConnectTimeout,

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },
}

/// Setup errors. Nothing on the hot path returns this.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("stash is already initialized")]
    AlreadyInitialized,

    #[error("failed to spawn dispatcher thread: {0}")]
    Spawn(#[source] io::Error),
}
