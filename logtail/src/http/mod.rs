pub mod client;
pub mod logs;
pub mod quotas;
