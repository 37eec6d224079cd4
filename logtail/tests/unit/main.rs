//! Integration tests for the logs viewer

mod support;
mod test_coordinator;
mod test_session;
