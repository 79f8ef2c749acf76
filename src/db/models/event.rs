use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Luma Event Models
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Upcoming,
    Ongoing,
    Past,
}

impl EventStatus {
    /// Derive the status of an event from its schedule relative to `now`.
    ///
    /// An event without an end date is `Past` as soon as it has started.
    pub fn derive(
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        if now < start {
            EventStatus::Upcoming
        } else if end.is_some_and(|end| now <= end) {
            EventStatus::Ongoing
        } else {
            EventStatus::Past
        }
    }
}

/// A community event as stored under `luma:event:<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    pub start_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    pub location: String,
    pub registration_link: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    pub status: EventStatus,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EventError {
    #[error("event {id} ends ({end}) before it starts ({start})")]
    EndsBeforeStart {
        id: String,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("event {0} has an empty registration link")]
    MissingRegistrationLink(String),
}

impl Event {
    pub fn validate(&self) -> Result<(), EventError> {
        if self.registration_link.trim().is_empty() {
            return Err(EventError::MissingRegistrationLink(self.id.clone()));
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(EventError::EndsBeforeStart {
                    id: self.id.clone(),
                    start: self.start_date,
                    end,
                });
            }
        }
        Ok(())
    }

    /// Status as of `now`; the stored value is only a snapshot from sync time.
    pub fn status_at(&self, now: DateTime<Utc>) -> EventStatus {
        EventStatus::derive(self.start_date, self.end_date, now)
    }
}
