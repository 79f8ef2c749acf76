pub mod event;
pub mod sync_stats;

pub use self::event::*;
pub use self::sync_stats::*;
