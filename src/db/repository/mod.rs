pub mod luma_event_repository;
pub mod sync_stats_repository;

pub use luma_event_repository::LumaEventRepository;
pub use sync_stats_repository::SyncStatsRepository;
