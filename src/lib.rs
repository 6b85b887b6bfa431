mod client;
mod codec;
mod commands;
mod coordinator;
mod error;
mod logger;
mod normalize;
mod transport;
mod types;

pub use client::{NeoHubClient, NeoHubClientBuilder};
pub use coordinator::{Coordinator, CoordinatorBuilder, Snapshot};
pub use error::{Error, Result};
pub use normalize::{normalize, UNKNOWN_SERIAL};
pub use transport::{Transport, DEFAULT_PORT};
pub use types::*;
