//! Development block store served over HTTP.

mod svr;

pub use svr::{build_app, serve, startup};
