//! Event posting with a bounded local retry queue.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use analytics_core::{Error, EventData, EventType, NewUser, RawEvent, Result, User};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::identity::IdentityResolver;

/// Queued payloads beyond this drop the oldest entry.
pub const MAX_RETRY_QUEUE: usize = 50;

/// A session that never scrolled past this percentage ended early.
pub const LEFT_EARLY_MAX_SCROLL: u8 = 10;

/// Body of `POST /analytics`.
pub type TrackPayload = RawEvent;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Full URL of the ingestion endpoint.
    pub endpoint: String,
    /// Full URL of `POST /signup`.
    pub signup_endpoint: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl TrackerConfig {
    /// The signup URL is a sibling of the ingestion URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        let endpoint = endpoint.into();
        let base = endpoint
            .strip_suffix("/analytics")
            .unwrap_or_else(|| endpoint.trim_end_matches('/'));
        Self {
            signup_endpoint: format!("{}/signup", base),
            endpoint,
            user_agent: format!("funnel-tracker/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignupBody<'a> {
    #[serde(flatten)]
    user: &'a NewUser,
    session_id: String,
}

#[derive(Deserialize)]
struct SignupReply {
    user: User,
}

#[derive(Default)]
struct SectionState {
    entered: HashMap<String, Instant>,
    visited: Vec<String>,
}

/// One tab's tracking session.
///
/// Network failures are never raised from [`track`](Self::track); the
/// payload is queued and can be re-sent with
/// [`flush_retry_queue`](Self::flush_retry_queue).
pub struct AnalyticsSession {
    config: TrackerConfig,
    http: reqwest::Client,
    resolver: Arc<IdentityResolver>,
    page_url: RwLock<String>,
    started_at: DateTime<Utc>,
    retry_queue: Mutex<VecDeque<TrackPayload>>,
    clicked: Mutex<Vec<String>>,
    max_scroll: AtomicU8,
    sections: Mutex<SectionState>,
    ended: AtomicBool,
}

impl AnalyticsSession {
    pub fn new(endpoint: impl Into<String>, resolver: Arc<IdentityResolver>) -> Result<Self> {
        Self::with_config(TrackerConfig::new(endpoint), resolver)
    }

    pub fn with_config(config: TrackerConfig, resolver: Arc<IdentityResolver>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        // Touch both ids so they exist before the first event.
        resolver.get_or_create_visitor_id();
        resolver.get_or_create_session_id();

        Ok(Self {
            config,
            http,
            resolver,
            page_url: RwLock::new(String::new()),
            started_at: Utc::now(),
            retry_queue: Mutex::new(VecDeque::new()),
            clicked: Mutex::new(Vec::new()),
            max_scroll: AtomicU8::new(0),
            sections: Mutex::new(SectionState::default()),
            ended: AtomicBool::new(false),
        })
    }

    /// Set the page URL sent with subsequent events.
    pub fn set_page_url(&self, url: impl Into<String>) {
        *self.page_url.write() = url.into();
    }

    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }

    pub fn queued(&self) -> usize {
        self.retry_queue.lock().len()
    }

    /// Deepest scroll percentage seen so far.
    pub fn max_scroll_depth(&self) -> u8 {
        self.max_scroll.load(Ordering::SeqCst)
    }

    /// Sections entered so far, in first-entry order.
    pub fn sections_visited(&self) -> Vec<String> {
        self.sections.lock().visited.clone()
    }

    fn time_on_page_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds().max(0)
    }

    /// Post one event. Returns whether it was delivered now.
    pub async fn track(&self, event: impl Into<EventType>, properties: EventData) -> bool {
        let payload = self.payload(event.into(), properties);
        match self.send(&payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!(event = %payload.event, error = %e, "Analytics post failed, queued for retry");
                self.enqueue(payload);
                false
            }
        }
    }

    pub async fn track_page_view(&self, title: &str) -> bool {
        let mut properties = EventData::new();
        properties.insert("title".into(), Value::String(title.to_string()));
        properties.insert("path".into(), Value::String(self.page_url.read().clone()));
        self.track(EventType::PageView, properties).await
    }

    /// Track a button click once per button per session.
    pub async fn track_button_click(&self, button_id: &str, text: &str) -> bool {
        {
            let mut clicked = self.clicked.lock();
            if clicked.iter().any(|b| b == button_id) {
                return false;
            }
            clicked.push(button_id.to_string());
        }

        let mut properties = EventData::new();
        properties.insert("button_id".into(), Value::String(button_id.to_string()));
        properties.insert("text".into(), Value::String(text.to_string()));
        self.track(EventType::ButtonClick, properties).await
    }

    /// Report a scroll position as a page percentage. Only a new maximum
    /// emits `scroll_depth`; returns false when nothing was sent.
    pub async fn track_scroll(&self, percent: f64) -> bool {
        if !percent.is_finite() {
            return false;
        }
        let depth = percent.clamp(0.0, 100.0).round() as u8;
        if depth <= self.max_scroll.fetch_max(depth, Ordering::SeqCst) {
            return false;
        }

        let mut properties = EventData::new();
        properties.insert("depth".into(), Value::from(depth));
        self.track(EventType::ScrollDepth, properties).await
    }

    /// A section became visible. Emits `section_view` and starts its timer.
    pub async fn track_section_view(&self, section: &str) -> bool {
        {
            let mut sections = self.sections.lock();
            sections.entered.insert(section.to_string(), Instant::now());
            if !sections.visited.iter().any(|s| s == section) {
                sections.visited.push(section.to_string());
            }
        }

        let mut properties = EventData::new();
        properties.insert("section".into(), Value::String(section.to_string()));
        properties.insert("time_on_page".into(), Value::from(self.time_on_page_ms()));
        self.track(EventType::SectionView, properties).await
    }

    /// A section left view. Emits `section_exit` with the time spent in it;
    /// a section that was never entered sends nothing.
    pub async fn track_section_exit(&self, section: &str) -> bool {
        let Some(entered) = self.sections.lock().entered.remove(section) else {
            return false;
        };

        let mut properties = EventData::new();
        properties.insert("section".into(), Value::String(section.to_string()));
        properties.insert(
            "time_spent_ms".into(),
            Value::from(entered.elapsed().as_millis() as u64),
        );
        self.track(EventType::SectionExit, properties).await
    }

    pub async fn track_form_started(&self, form_name: &str, extra: EventData) -> bool {
        self.track(EventType::FormStarted, self.form_properties(form_name, extra))
            .await
    }

    pub async fn track_form_completed(&self, form_name: &str, extra: EventData) -> bool {
        self.track(EventType::FormCompleted, self.form_properties(form_name, extra))
            .await
    }

    fn form_properties(&self, form_name: &str, mut extra: EventData) -> EventData {
        extra.insert("form_name".into(), Value::String(form_name.to_string()));
        extra.insert("time_on_page".into(), Value::from(self.time_on_page_ms()));
        extra
    }

    /// Submit the signup form for this session, then emit
    /// `signup_completed`. Signup failures are returned; the follow-up
    /// event is queued like any other when it cannot be delivered.
    pub async fn track_signup(&self, user: &NewUser) -> Result<User> {
        let body = SignupBody {
            user,
            session_id: self.resolver.get_or_create_session_id(),
        };

        let response = self
            .http
            .post(&self.config.signup_endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::internal(format!("signup request failed: {}", e)))?;

        let status = response.status();
        if status.is_client_error() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::validation(format!("signup rejected ({}): {}", status, detail)));
        }
        if !status.is_success() {
            return Err(Error::internal(format!("signup endpoint returned {}", status)));
        }

        let created = response
            .json::<SignupReply>()
            .await
            .map_err(|e| Error::internal(format!("unreadable signup response: {}", e)))?
            .user;

        let mut properties = EventData::new();
        properties.insert("plan".into(), Value::String(created.selected_plan.to_string()));
        if let Some(source) = &created.signup_source {
            properties.insert("source".into(), Value::String(source.clone()));
        }
        properties.insert("time_on_page".into(), Value::from(self.time_on_page_ms()));
        self.track(EventType::SignupCompleted, properties).await;

        Ok(created)
    }

    /// Re-send queued payloads in order. Entries that fail again stay
    /// queued. Returns how many were delivered.
    pub async fn flush_retry_queue(&self) -> usize {
        let pending: Vec<TrackPayload> = self.retry_queue.lock().drain(..).collect();
        let mut delivered = 0;

        for payload in pending {
            match self.send(&payload).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    debug!(event = %payload.event, error = %e, "Retry failed");
                    self.enqueue(payload);
                }
            }
        }

        delivered
    }

    /// Emit `session_end` with the session duration and engagement
    /// summary, then clear the session scope. Later calls do nothing.
    pub async fn end(&self) -> bool {
        if self.ended.swap(true, Ordering::SeqCst) {
            return false;
        }

        let max_scroll = self.max_scroll_depth();
        let mut properties = EventData::new();
        properties.insert("duration_ms".into(), Value::from(self.time_on_page_ms()));
        properties.insert("max_scroll_depth".into(), Value::from(max_scroll));
        properties.insert(
            "sections_visited".into(),
            Value::from(self.sections_visited()),
        );
        properties.insert(
            "buttons_clicked".into(),
            Value::from(self.clicked.lock().len()),
        );
        properties.insert(
            "user_left_early".into(),
            Value::Bool(max_scroll < LEFT_EARLY_MAX_SCROLL),
        );

        let delivered = self.track(EventType::SessionEnd, properties).await;
        self.resolver.end_session_scope();
        delivered
    }

    fn payload(&self, event: EventType, properties: EventData) -> TrackPayload {
        TrackPayload {
            event: event.to_string(),
            properties: Some(properties),
            session_id: Some(self.resolver.get_or_create_session_id()),
            visitor_id: Some(self.resolver.get_or_create_visitor_id()),
            url: self.page_url.read().clone(),
            user_agent: self.config.user_agent.clone(),
            timestamp: Utc::now(),
        }
    }

    fn enqueue(&self, payload: TrackPayload) {
        let mut queue = self.retry_queue.lock();
        if queue.len() >= MAX_RETRY_QUEUE {
            queue.pop_front();
        }
        queue.push_back(payload);
    }

    async fn send(&self, payload: &TrackPayload) -> Result<()> {
        let response = self
            .http
            .post(&self.config.endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| Error::internal(format!("analytics request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::internal(format!(
                "analytics endpoint returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}
