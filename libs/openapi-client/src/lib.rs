//! Wire models for the platform logs API

pub mod models;
