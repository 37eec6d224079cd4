//! Log retrieval and live-tail merge
//!
//! Leaves first: [`retention`] and [`ansi`] are pure, [`history`] pages
//! backward through a clamped window, [`stream`] supervises one live tail,
//! and [`coordinator`] merges everything into a single read model that
//! [`session`] drives on a task.

pub mod ansi;
pub mod coordinator;
pub mod history;
pub mod quota;
pub mod retention;
pub mod session;
pub mod stream;
