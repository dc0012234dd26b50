//! HTTP surface: thin text-in/text-out routes over the core.

pub mod server;

pub use server::{ApiState, start_http_server};
