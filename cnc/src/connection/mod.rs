//! Inter-component data connections.

mod error;
mod map;

pub use error::ConnectionError;
pub use map::{ConnectionMap, Edge};
