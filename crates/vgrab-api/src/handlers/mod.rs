//! HTTP handlers.

pub mod dashboard;
pub mod logs;
pub mod scrape;
pub mod storage;
pub mod upload_queue;
pub mod urls;
pub mod videos;
