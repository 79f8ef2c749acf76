use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

pub const EVENT_KEY_PREFIX: &str = "luma:event:";
pub const EVENT_KEY_PATTERN: &str = "luma:event:*";
pub const EVENTS_INDEX_KEY: &str = "luma:events:index";
pub const SYNC_STATS_KEY: &str = "luma:sync:stats";
pub const LAST_SYNC_KEY: &str = "luma:last_sync";

/// Storage identifier for an event, derived from its registration link.
///
/// URL-safe base64 without padding: deterministic, reversible and free of
/// characters that would need escaping in a Redis glob pattern.
pub fn event_id_from_link(registration_link: &str) -> String {
    URL_SAFE_NO_PAD.encode(registration_link.as_bytes())
}

/// Returns the store key for the event registered at `registration_link`.
pub fn event_key(registration_link: &str) -> String {
    format!("{}{}", EVENT_KEY_PREFIX, event_id_from_link(registration_link))
}
