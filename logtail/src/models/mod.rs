//! Domain models

pub mod log;
