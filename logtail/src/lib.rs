//! Logtail Library
//!
//! Reads deployment logs from the platform API: a bounded, paginated history
//! merged with a live tail into one chronologically ordered sequence of
//! display-ready lines.

pub mod app;
pub mod authn;
pub mod errors;
pub mod http;
pub mod logging;
pub mod models;
pub mod query;
pub mod transport;
pub mod utils;
pub mod viewer;
