//! Error types for setting up and running the simulation.

use crate::channel::ChannelError;
use tavern_runtime::StoreError;
use thiserror::Error;

/// Invalid configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No table of any class
    #[error("the layout has no tables")]
    NoTables,

    /// Party index smaller than the most parties that can sit at once
    #[error("party index holds {capacity} parties but up to {needed} can be seated")]
    IndexTooSmall {
        /// Configured index capacity
        capacity: usize,
        /// Most parties seated at once after doubling
        needed: usize,
    },

    /// Largest party size outside `1..=4`
    #[error("maximum party size {0} is outside 1..=4")]
    PartySize(u8),

    /// Percentage above 100
    #[error("{name} is {value}%, must be at most 100")]
    Percentage {
        /// Variable name
        name: &'static str,
        /// Configured value
        value: u8,
    },

    /// A duration that must be positive is zero
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
}

/// Errors that stop the simulation
#[derive(Error, Debug)]
pub enum SimulationError {
    /// Configuration rejected at startup
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Request channel failure
    #[error("request channel: {0}")]
    Channel(#[from] ChannelError),

    /// Engine store failure
    #[error("engine store: {0}")]
    Store(#[from] StoreError),

    /// I/O failure, e.g. opening the log file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A role's task died
    #[error("{role} task failed: {reason}")]
    TaskFailed {
        /// Which role
        role: &'static str,
        /// Panic or cancellation message
        reason: String,
    },
}

/// Result alias for simulation setup and teardown
pub type Result<T> = std::result::Result<T, SimulationError>;
