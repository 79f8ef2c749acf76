use chrono::{DateTime, Duration, Utc};

use crate::db::models::{Event, EventStatus};
use crate::services::scraper::DEFAULT_COVER_IMAGE_URL;

struct FallbackEvent {
    id: &'static str,
    title: &'static str,
    description: &'static str,
    starts_in_days: i64,
    lasts_days: Option<i64>,
    location: &'static str,
    tags: [&'static str; 4],
}

const FALLBACK_EVENTS: [FallbackEvent; 4] = [
    FallbackEvent {
        id: "kaia-dev-meetup-seoul",
        title: "Kaia Developer Meetup - Seoul",
        description: "Join us for an exciting developer meetup in Seoul to explore Kaia \
                      blockchain technology, network with fellow developers, and learn about \
                      the latest updates in the Kaia ecosystem.",
        starts_in_days: 30,
        lasts_days: None,
        location: "Seoul, South Korea",
        tags: ["kaia", "developer", "seoul", "meetup"],
    },
    FallbackEvent {
        id: "kaia-hackathon-2024",
        title: "Kaia Hackathon 2024",
        description: "A 3-day hackathon focused on building innovative dApps on the Kaia \
                      blockchain. Prizes, mentorship, and networking opportunities await!",
        starts_in_days: 45,
        lasts_days: Some(2),
        location: "Singapore",
        tags: ["kaia", "hackathon", "singapore", "dapp"],
    },
    FallbackEvent {
        id: "kaia-defi-summit",
        title: "Kaia DeFi Summit",
        description: "Explore the future of DeFi on Kaia blockchain with industry leaders, \
                      developers, and enthusiasts.",
        starts_in_days: 60,
        lasts_days: None,
        location: "Bangkok, Thailand",
        tags: ["kaia", "defi", "bangkok", "summit"],
    },
    FallbackEvent {
        id: "kaia-community-ama",
        title: "Kaia Community AMA",
        description: "Ask Me Anything session with the Kaia team. Get your questions answered \
                      about the roadmap, technology, and ecosystem.",
        starts_in_days: -5,
        lasts_days: None,
        location: "Online",
        tags: ["kaia", "ama", "community", "online"],
    },
];

/// Substitute events used when the calendar page yields nothing.
/// Dates are relative to `now` so the set always has upcoming entries.
pub fn fallback_events(now: DateTime<Utc>) -> Vec<Event> {
    FALLBACK_EVENTS
        .iter()
        .map(|f| {
            let start_date = now + Duration::days(f.starts_in_days);
            let end_date = f.lasts_days.map(|days| start_date + Duration::days(days));

            Event {
                id: f.id.to_string(),
                title: f.title.to_string(),
                description: f.description.to_string(),
                start_date,
                end_date,
                location: f.location.to_string(),
                registration_link: format!("https://lu.ma/{}", f.id),
                image_url: Some(DEFAULT_COVER_IMAGE_URL.to_string()),
                status: EventStatus::derive(start_date, end_date, now),
                tags: f.tags.iter().map(|t| t.to_string()).collect(),
            }
        })
        .collect()
}
