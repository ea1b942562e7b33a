use thiserror::Error;

/// Errors produced while reading configuration from the environment.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A port value failed to parse.
    #[error("invalid port '{value}': {source}")]
    PortParseError {
        /// Raw environment value.
        value: String,
        /// Parse failure.
        source: std::num::ParseIntError,
    },

    /// Port zero is reserved.
    #[error("port must be non-zero, got '{value}'")]
    InvalidPort {
        /// Raw environment value.
        value: String,
    },

    /// A bind address failed to parse.
    #[error("invalid bind address '{value}': {source}")]
    InvalidBindAddr {
        /// Raw environment value.
        value: String,
        /// Parse failure.
        source: std::net::AddrParseError,
    },

    /// An integer-valued variable failed to parse.
    #[error("invalid value '{value}' for {var}: {source}")]
    IntParseError {
        /// Variable name.
        var: &'static str,
        /// Raw environment value.
        value: String,
        /// Parse failure.
        source: std::num::ParseIntError,
    },

    /// Unknown graph dialect name.
    #[error("unknown graph dialect '{value}' (expected 'cypher' or 'redisgraph')")]
    UnknownDialect {
        /// Raw environment value.
        value: String,
    },

    /// A value violated a deployment bound.
    #[error("{var} out of range: {message}")]
    OutOfRange {
        /// Variable name.
        var: &'static str,
        /// What bound was violated.
        message: String,
    },
}
