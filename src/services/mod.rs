pub mod clock;
pub mod event_cache;
pub mod fallback;
pub mod init;
pub mod retry;
pub mod scraper;
pub mod sync;
