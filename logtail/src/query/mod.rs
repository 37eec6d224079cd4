//! Request primitive for history pages: caching, deduplication and retries
//! layered over any [`LogPageSource`](crate::viewer::history::LogPageSource).

pub mod cache;
pub mod retry;
