// Random log content: weighted levels and templated event messages
use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const JOB_TYPES: &[&str] = &[
    "user-service",
    "payment-processor",
    "order-management",
    "inventory-service",
    "notification-service",
    "authentication-service",
    "search-service",
    "recommendation-engine",
    "email-service",
    "analytics-processor",
];

const DB_TYPES: &[&str] = &[
    "postgres",
    "mysql",
    "mongodb",
    "redis",
    "elasticsearch",
    "cassandra",
];

const HTTP_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

const FIRST_NAMES: &[&str] = &[
    "alice", "bob", "carol", "dave", "erin", "frank", "grace", "heidi", "ivan", "judy",
];

const MAIL_DOMAINS: &[&str] = &["example.com", "mail.test", "corp.local", "inbox.dev"];

const COMPANIES: &[&str] = &[
    "Stripe", "GitHub", "Shopify", "Twilio", "Slack", "PagerDuty", "Zendesk", "SendGrid",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    /// Enumeration order used for the cumulative weighted draw.
    pub const ALL: [Level; 4] = [Level::Debug, Level::Info, Level::Warn, Level::Error];

    pub const fn weight(self) -> u32 {
        match self {
            Level::Debug => 15,
            Level::Info => 60,
            Level::Warn => 20,
            Level::Error => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn next_level<R: Rng + ?Sized>(rng: &mut R) -> Level {
    let total: u32 = Level::ALL.iter().map(|l| l.weight()).sum();
    let draw = rng.gen_range(0..total);

    let mut cumulative = 0;
    for level in Level::ALL {
        cumulative += level.weight();
        if draw < cumulative {
            return level;
        }
    }
    Level::Info
}

#[derive(Debug, Clone, Copy)]
enum EventTemplate {
    ProcessingRequest,
    HandledRequest,
    Connected,
    CacheHit,
    UpdatedProfile,
    Webhook,
    RateLimit,
    Transaction,
    QueueSize,
    MemoryUsage,
}

const TEMPLATES: [EventTemplate; 10] = [
    EventTemplate::ProcessingRequest,
    EventTemplate::HandledRequest,
    EventTemplate::Connected,
    EventTemplate::CacheHit,
    EventTemplate::UpdatedProfile,
    EventTemplate::Webhook,
    EventTemplate::RateLimit,
    EventTemplate::Transaction,
    EventTemplate::QueueSize,
    EventTemplate::MemoryUsage,
];

pub fn next_event<R: Rng + ?Sized>(rng: &mut R) -> String {
    let template = TEMPLATES[rng.gen_range(0..TEMPLATES.len())];

    match template {
        EventTemplate::ProcessingRequest => format!("Processing request from {}", email(rng)),
        EventTemplate::HandledRequest => format!(
            "Handled {} request in {}ms",
            pick(rng, HTTP_METHODS),
            rng.gen_range(10..=500)
        ),
        EventTemplate::Connected => format!("Connected to {}", pick(rng, DB_TYPES)),
        EventTemplate::CacheHit => format!("Cache hit for key: {}", uuid(rng)),
        EventTemplate::UpdatedProfile => format!("Updated user profile for {}", username(rng)),
        EventTemplate::Webhook => format!("Received webhook from {}", pick(rng, COMPANIES)),
        EventTemplate::RateLimit => format!(
            "API rate limit: {} requests remaining",
            rng.gen_range(1..=1000)
        ),
        EventTemplate::Transaction => {
            format!("Successfully processed transaction {}", uuid(rng))
        }
        EventTemplate::QueueSize => {
            format!("Queue size reached {} messages", rng.gen_range(100..=10000))
        }
        EventTemplate::MemoryUsage => format!("Memory usage at {}%", rng.gen_range(20..=95)),
    }
}

pub fn pick<'a, R: Rng + ?Sized>(rng: &mut R, items: &[&'a str]) -> &'a str {
    items.choose(rng).copied().unwrap_or("unknown")
}

fn username<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{}{}", pick(rng, FIRST_NAMES), rng.gen_range(1..1000))
}

fn email<R: Rng + ?Sized>(rng: &mut R) -> String {
    format!("{}@{}", username(rng), pick(rng, MAIL_DOMAINS))
}

/// Random version-4 style UUID string.
fn uuid<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut bytes: [u8; 16] = rng.r#gen();
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    let h = hex::encode(bytes);
    format!(
        "{}-{}-{}-{}-{}",
        &h[0..8],
        &h[8..12],
        &h[12..16],
        &h[16..20],
        &h[20..32]
    )
}
