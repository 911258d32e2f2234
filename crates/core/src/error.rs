//! Error types for streamnet

use thiserror::Error;

/// Main error type for streamnet operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("duplicate flowline id {0}")]
    DuplicateId(u64),

    #[error("unknown flowline id {0}")]
    UnknownId(u64),

    #[error("flowline id {id} appears in both basin {huc4_a} and basin {huc4_b}")]
    DuplicateAcrossBasins {
        id: u64,
        huc4_a: String,
        huc4_b: String,
    },

    #[error("CRS mismatch: {0} vs {1}")]
    CrsMismatch(String, String),

    #[error("empty or degenerate geometry for flowline {0}")]
    EmptyGeometry(u64),

    #[error("join ({upstream}, {downstream}) references an unknown id")]
    InvalidJoin { upstream: u64, downstream: u64 },

    #[error("non-loop cycle through flowline {0}")]
    CycleDetected(u64),

    #[error("minted id {0} collides with an existing flowline id")]
    IdCollision(u64),

    #[error("spatial index is stale; call rebuild() after structural mutation")]
    StaleIndex,

    #[error("malformed table: {0}")]
    Table(String),

    #[error("malformed WKB: {0}")]
    Wkb(String),

    #[error("schema error: {0}")]
    Schema(#[from] serde_json::Error),
}

/// Result type alias for streamnet operations
pub type Result<T> = std::result::Result<T, Error>;
