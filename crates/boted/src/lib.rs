//! Bote node daemon
//!
//! Wires the library crates into a running storage peer: YAML
//! configuration, on-disk folders, request dispatch and the periodic
//! expiration sweep.

pub mod config;
pub mod identities;
pub mod logging;
pub mod node;
pub mod storage;

pub use config::Config;
pub use identities::IdentityFile;
pub use node::Node;
pub use storage::Storage;
