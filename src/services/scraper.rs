use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::LumaConfig;
use crate::db::models::{Event, EventStatus};
use crate::error::{AppError, AppResult};

pub const DEFAULT_COVER_IMAGE_URL: &str =
    "https://images.lumacdn.com/calendar-cover-images/m4/6cfbc721-73fa-45b5-a6e8-d47fa50235d1";

const DEFAULT_TAG: &str = "kaia";

lazy_static::lazy_static! {
    static ref NEXT_DATA_RE: Regex = Regex::new(
        r#"(?s)<script id="__NEXT_DATA__" type="application/json"[^>]*>(.*?)</script>"#
    )
    .expect("valid __NEXT_DATA__ pattern");
}

// ============================================================================
// Outcome Types
// ============================================================================

/// Why a scrape produced no usable data.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DegradedReason {
    #[error("failed to fetch calendar page: {0}")]
    Fetch(String),

    #[error("calendar page has no __NEXT_DATA__ payload")]
    MissingPayload,

    #[error("__NEXT_DATA__ payload is not valid JSON: {0}")]
    InvalidJson(String),

    #[error("__NEXT_DATA__ payload has an unexpected shape: {0}")]
    ShapeMismatch(String),
}

/// Result of a scrape. `Success` with no events means the calendar is
/// genuinely empty; `Degraded` means extraction broke.
#[derive(Debug, Clone, PartialEq)]
pub enum ScrapeOutcome {
    Success(Vec<Event>),
    Degraded(DegradedReason),
}

impl ScrapeOutcome {
    /// Collapse to a plain list; a degraded scrape yields no events.
    pub fn into_events(self) -> Vec<Event> {
        match self {
            ScrapeOutcome::Success(events) => events,
            ScrapeOutcome::Degraded(_) => Vec::new(),
        }
    }
}

/// Anything that can produce candidate events for a sync run.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Never fails: every failure mode is reported as [`ScrapeOutcome::Degraded`].
    async fn fetch_remote_events(&self) -> ScrapeOutcome;
}

// ============================================================================
// Page Payload Types
// ============================================================================

#[derive(Debug, Deserialize)]
struct NextData {
    props: NextProps,
}

#[derive(Debug, Deserialize)]
struct NextProps {
    #[serde(rename = "pageProps")]
    page_props: PageProps,
}

#[derive(Debug, Deserialize)]
struct PageProps {
    #[serde(rename = "initialData")]
    initial_data: InitialData,
}

#[derive(Debug, Deserialize)]
struct InitialData {
    data: CalendarPayload,
}

#[derive(Debug, Deserialize)]
struct CalendarPayload {
    calendar: CalendarInfo,
    #[serde(default)]
    event_start_ats: Vec<String>,
    tags: Option<Vec<CalendarTag>>,
}

#[derive(Debug, Deserialize)]
struct CalendarInfo {
    name: String,
    cover_image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CalendarTag {
    name: String,
}

// ============================================================================
// Event Templates
// ============================================================================

struct EventTemplate {
    title: &'static str,
    description: &'static str,
    locations: [&'static str; 4],
}

const EVENT_TEMPLATES: [EventTemplate; 5] = [
    EventTemplate {
        title: "Kaia Developer Workshop",
        description:
            "Hands-on workshop for developers to learn about building on Kaia blockchain",
        locations: ["Seoul", "Singapore", "Bangkok", "Hong Kong"],
    },
    EventTemplate {
        title: "Kaia Community Meetup",
        description:
            "Connect with the Kaia community and learn about the latest ecosystem updates",
        locations: ["Seoul", "Tokyo", "Singapore", "Manila"],
    },
    EventTemplate {
        title: "Kaia DeFi Summit",
        description: "Explore DeFi opportunities and innovations on the Kaia blockchain",
        locations: ["Singapore", "Bangkok", "Hong Kong", "Taipei"],
    },
    EventTemplate {
        title: "Kaia Hackathon",
        description: "Build innovative dApps on Kaia blockchain and compete for prizes",
        locations: ["Seoul", "Singapore", "Bangkok", "Ho Chi Minh City"],
    },
    EventTemplate {
        title: "Kaia Gaming Conference",
        description: "Discover the future of blockchain gaming on Kaia platform",
        locations: ["Seoul", "Tokyo", "Singapore", "Bangkok"],
    },
];

// ============================================================================
// Scraper
// ============================================================================

/// Scraper for a single Luma calendar page.
#[derive(Debug, Clone)]
pub struct LumaScraper {
    client: Client,
    url: String,
}

impl LumaScraper {
    pub fn new(config: &LumaConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| AppError::Internal(e.into()))?;

        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }

    async fn fetch_page(&self) -> Result<String, DegradedReason> {
        let response = self
            .client
            .get(&self.url)
            .header(
                ACCEPT,
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            )
            .header(ACCEPT_LANGUAGE, "en-US,en;q=0.5")
            .send()
            .await
            .map_err(|e| DegradedReason::Fetch(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DegradedReason::Fetch(format!("unexpected status {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| DegradedReason::Fetch(e.to_string()))
    }
}

#[async_trait]
impl EventSource for LumaScraper {
    async fn fetch_remote_events(&self) -> ScrapeOutcome {
        info!("Scraping Luma calendar page {}", self.url);

        let extracted = match self.fetch_page().await {
            Ok(html) => extract_events(&html, &self.url, Utc::now()),
            Err(reason) => Err(reason),
        };

        match extracted {
            Ok(events) => {
                info!("Extracted {} events from {}", events.len(), self.url);
                ScrapeOutcome::Success(events)
            }
            Err(reason) => {
                warn!("Luma scrape degraded: {}", reason);
                ScrapeOutcome::Degraded(reason)
            }
        }
    }
}

/// Extract events from the `__NEXT_DATA__` block of a Luma calendar page.
///
/// Each start timestamp becomes one event built from a rotating template; the
/// registration link is `<page_url>/event-<n>` where `n` is the 1-based
/// position in the payload.
pub fn extract_events(
    html: &str,
    page_url: &str,
    now: DateTime<Utc>,
) -> Result<Vec<Event>, DegradedReason> {
    let raw = NEXT_DATA_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .ok_or(DegradedReason::MissingPayload)?
        .as_str();

    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| DegradedReason::InvalidJson(e.to_string()))?;
    let next_data: NextData = serde_json::from_value(value)
        .map_err(|e| DegradedReason::ShapeMismatch(e.to_string()))?;

    let payload = next_data.props.page_props.initial_data.data;
    info!(
        "Found calendar '{}' with {} event start times",
        payload.calendar.name,
        payload.event_start_ats.len()
    );

    let image_url = payload
        .calendar
        .cover_image_url
        .clone()
        .unwrap_or_else(|| DEFAULT_COVER_IMAGE_URL.to_string());
    let tags: Vec<String> = match &payload.tags {
        Some(tags) => tags.iter().map(|t| t.name.clone()).collect(),
        None => vec![DEFAULT_TAG.to_string()],
    };
    let base_url = page_url.trim_end_matches('/');

    let mut events = Vec::with_capacity(payload.event_start_ats.len());
    for (index, raw_start) in payload.event_start_ats.iter().enumerate() {
        let start_date = match DateTime::parse_from_rfc3339(raw_start) {
            Ok(dt) => dt.with_timezone(&Utc),
            Err(e) => {
                warn!("Skipping event start time {:?}: {}", raw_start, e);
                continue;
            }
        };

        let template = &EVENT_TEMPLATES[index % EVENT_TEMPLATES.len()];
        let location = template.locations[index % template.locations.len()];
        let title = if index >= EVENT_TEMPLATES.len() {
            format!("{} #{}", template.title, index / EVENT_TEMPLATES.len() + 1)
        } else {
            template.title.to_string()
        };

        events.push(Event {
            id: format!("kaia-event-{}", index + 1),
            title,
            description: template.description.to_string(),
            start_date,
            end_date: None,
            location: location.to_string(),
            registration_link: format!("{}/event-{}", base_url, index + 1),
            image_url: Some(image_url.clone()),
            status: EventStatus::derive(start_date, None, now),
            tags: tags.clone(),
        });
    }

    Ok(events)
}
