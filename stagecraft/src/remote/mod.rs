//! Network adapters for the remote generation service.

mod http;

pub use http::HttpRemoteExecutor;
