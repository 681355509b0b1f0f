//! Persistence collaborator.
//!
//! Devices that age out of the registry are archived through a small typed
//! statement layer: [`query`] builds parameterized statements, a
//! [`SqlBackend`] executes them, and [`DeviceHistory`] maps device records to
//! rows. [`SledBackend`] is the embedded implementation.

mod backend;
mod history;
mod query;
mod sled_backend;
mod value;

#[cfg(test)]
mod sled_backend_test;

pub use backend::*;
pub use history::*;
pub use query::*;
pub use sled_backend::SledBackend;
pub use value::*;
