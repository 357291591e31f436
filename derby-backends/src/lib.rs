//! Resource server backends for Derby
//!
//! [`HttpBackend`] talks to a json-server style REST server over HTTP.
//! [`InMemoryBackend`] keeps the same resources in process, with a
//! simulated engine, and backs both the bundled server and the tests.

pub mod http;
pub mod memory;

pub use http::HttpBackend;
pub use memory::{EngineProfile, EngineScript, InMemoryBackend};
