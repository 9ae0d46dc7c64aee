//! Application state for the dashboard.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossterm::event::{KeyCode, KeyEvent};
use fieldscope_core::config::Config;
use fieldscope_core::realtime::{subscribe, RealtimeEvent, RealtimeHandle};
use fieldscope_core::session::SessionStore;
use fieldscope_core::telemetry::{ChartSeries, TelemetryAggregator};
use fieldscope_core::types::{Alert, Field, FieldWeather};
use fieldscope_core::{load_field_snapshot, ApiClient, FieldSnapshot};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// How long a transient notice stays on screen.
const NOTICE_TTL: Duration = Duration::from_secs(4);

/// State of the push channel, shown in the header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConnectionStatus {
    /// Socket not open yet
    Connecting,
    /// Receiving pushes
    Live,
    /// Dropped; a retry is scheduled
    Reconnecting { attempt: u32 },
    /// Retries exhausted or disabled
    Lost,
}

impl ConnectionStatus {
    pub fn label(&self) -> String {
        match self {
            ConnectionStatus::Connecting => "connecting".to_string(),
            ConnectionStatus::Live => "live".to_string(),
            ConnectionStatus::Reconnecting { attempt } => format!("reconnecting #{}", attempt),
            ConnectionStatus::Lost => "offline".to_string(),
        }
    }
}

/// Severity of a footer notice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// A footer notice. Transient notices expire after [`NOTICE_TTL`];
/// sticky ones stay until something replaces them (the connection-lost
/// notice stays up until the channel comes back).
pub struct Notice {
    pub text: String,
    pub level: NoticeLevel,
    sticky: bool,
    raised_at: Instant,
}

impl Notice {
    fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: NoticeLevel::Info,
            sticky: false,
            raised_at: Instant::now(),
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: NoticeLevel::Error,
            sticky: false,
            raised_at: Instant::now(),
        }
    }

    fn sticky_error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            level: NoticeLevel::Error,
            sticky: true,
            raised_at: Instant::now(),
        }
    }

    fn expired(&self) -> bool {
        !self.sticky && self.raised_at.elapsed() > NOTICE_TTL
    }
}

/// Completion of a background gateway request, tagged with the scope
/// generation it was issued under.
enum Completion {
    Snapshot(u64, fieldscope_core::Result<FieldSnapshot>),
    Archived(u64, fieldscope_core::Result<String>),
}

/// Main application state.
pub struct App {
    // ========== Wiring ==========
    /// Loaded configuration
    config: Config,
    /// Handle onto the runtime driving the channel and requests
    runtime: Handle,
    /// Gateway client
    client: Arc<ApiClient>,
    /// Persisted session
    session: Arc<SessionStore>,
    /// Completions arriving from background requests
    completions: mpsc::UnboundedReceiver<Completion>,
    /// Cloned into every spawned request
    completions_tx: mpsc::UnboundedSender<Completion>,

    // ========== Field scope ==========
    /// All fields on the account, in cycling order
    pub fields: Vec<Field>,
    /// Field currently on screen
    pub field: Field,
    /// Bumped on every scope change; stale completions are dropped
    generation: u64,
    /// Push channel for the current scope
    realtime: Option<RealtimeHandle>,

    // ========== Telemetry ==========
    /// Reading buffers for the current scope
    aggregator: TelemetryAggregator,
    /// Chart series derived from the aggregator this tick
    pub series: Vec<ChartSeries>,
    /// Index into `series` of the charted one
    pub selected_series: usize,

    // ========== Panels ==========
    /// Alerts, newest first
    pub alerts: Vec<Alert>,
    /// Weather for the current field
    pub weather: Option<FieldWeather>,
    /// Push channel state
    pub connection: ConnectionStatus,
    /// Footer notice
    pub notice: Option<Notice>,
    /// True while a snapshot request is in flight
    pub loading: bool,
    /// Set by the quit key; the main loop exits on it
    pub should_quit: bool,
}

impl App {
    pub fn new(
        config: Config,
        runtime: Handle,
        client: Arc<ApiClient>,
        session: Arc<SessionStore>,
        fields: Vec<Field>,
        field: Field,
    ) -> Self {
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let aggregator = TelemetryAggregator::new(&config.telemetry);

        Self {
            config,
            runtime,
            client,
            session,
            completions,
            completions_tx,
            fields,
            field,
            generation: 0,
            realtime: None,
            aggregator,
            series: Vec::new(),
            selected_series: 0,
            alerts: Vec::new(),
            weather: None,
            connection: ConnectionStatus::Connecting,
            notice: None,
            loading: false,
            should_quit: false,
        }
    }

    /// Open the push channel and request the first snapshot.
    pub fn start(&mut self) {
        self.open_scope();
    }

    /// Number of buffered readings, for the header.
    pub fn reading_count(&self) -> usize {
        self.aggregator.reading_count()
    }

    /// Display name of the signed-in account, when the profile is cached.
    pub fn user_name(&self) -> Option<String> {
        self.session.user().map(|user| user.name)
    }

    // ========== Per-tick work ==========

    /// One pass of the main loop: drain pushes and completions, refresh
    /// derived series, expire the notice.
    pub fn tick(&mut self) {
        while let Some(event) = self
            .realtime
            .as_mut()
            .and_then(|handle| handle.try_next_event())
        {
            self.apply_event(event);
        }

        while let Ok(completion) = self.completions.try_recv() {
            self.apply_completion(completion);
        }

        self.series = self.aggregator.series();
        if self.selected_series >= self.series.len() {
            self.selected_series = 0;
        }

        if self.notice.as_ref().is_some_and(Notice::expired) {
            self.notice = None;
        }
    }

    fn apply_event(&mut self, event: RealtimeEvent) {
        match event {
            RealtimeEvent::Connected => {
                self.connection = ConnectionStatus::Live;
                // Replaces the sticky connection-lost notice too
                self.notice = Some(Notice::info("Live channel connected"));
            }
            RealtimeEvent::Reading(reading) => {
                self.aggregator.push(&reading);
            }
            RealtimeEvent::Alert(alert) => {
                self.notice = Some(Notice::error(format!("Alert: {}", alert.message)));
                self.alerts.insert(0, alert);
                self.alerts.truncate(self.config.telemetry.snapshot_limit);
            }
            RealtimeEvent::Reconnecting { attempt, .. } => {
                self.connection = ConnectionStatus::Reconnecting { attempt };
            }
            RealtimeEvent::ConnectionLost { reason } => {
                self.connection = ConnectionStatus::Lost;
                self.notice = Some(Notice::sticky_error(format!("Connection lost: {}", reason)));
            }
        }
    }

    fn apply_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Snapshot(generation, result) => {
                if generation != self.generation {
                    tracing::debug!("Dropping snapshot from a previous field scope");
                    return;
                }
                self.loading = false;
                match result {
                    Ok(snapshot) => self.apply_snapshot(snapshot),
                    Err(e) => {
                        if e.is_unauthorized() {
                            // Session already torn down; nothing left to watch
                            self.should_quit = true;
                        }
                        self.notice = Some(Notice::error(e.user_message()));
                    }
                }
            }
            Completion::Archived(generation, result) => {
                if generation != self.generation {
                    return;
                }
                match result {
                    Ok(message) => self.notice = Some(Notice::info(message)),
                    Err(e) => {
                        if e.is_unauthorized() {
                            self.should_quit = true;
                        }
                        self.notice = Some(Notice::error(e.user_message()));
                        // The optimistic clear was wrong, re-sync
                        self.request_snapshot();
                    }
                }
            }
        }
    }

    fn apply_snapshot(&mut self, snapshot: FieldSnapshot) {
        self.aggregator.seed(&snapshot.readings);
        self.alerts = snapshot.alerts;
        self.alerts.truncate(self.config.telemetry.snapshot_limit);
        self.weather = snapshot.weather;

        if !snapshot.partial.is_empty() {
            self.notice = Some(Notice::error(format!(
                "Partial snapshot; failed: {}",
                snapshot.partial.join(", ")
            )));
        }
    }

    // ========== Scope management ==========

    /// Tear down the current scope and open a fresh one for `self.field`.
    /// Exactly one channel is live at any time.
    fn open_scope(&mut self) {
        self.generation += 1;
        self.aggregator = TelemetryAggregator::new(&self.config.telemetry);
        self.series.clear();
        self.selected_series = 0;
        self.alerts.clear();
        self.weather = None;
        self.connection = ConnectionStatus::Connecting;

        if let Some(handle) = self.realtime.take() {
            // Deliberate close; must not surface as a lost connection
            self.runtime.spawn(handle.close());
        }

        let token = match self.session.token() {
            Some(token) => token,
            None => {
                self.notice = Some(Notice::sticky_error(
                    "Session expired. Run 'fieldscope login'.",
                ));
                self.should_quit = true;
                return;
            }
        };

        {
            // subscribe() spawns its reader onto the ambient runtime
            let _guard = self.runtime.enter();
            self.realtime = Some(subscribe(
                &self.config.gateway,
                &self.config.realtime,
                &token,
                &self.field.id,
            ));
        }

        self.request_snapshot();
    }

    /// Ask for a fresh snapshot of the current scope in the background.
    fn request_snapshot(&mut self) {
        self.loading = true;

        let client = Arc::clone(&self.client);
        let field = self.field.id.clone();
        let limit = self.config.telemetry.snapshot_limit;
        let generation = self.generation;
        let tx = self.completions_tx.clone();

        self.runtime.spawn(async move {
            let result = load_field_snapshot(&client, &field, limit).await;
            let _ = tx.send(Completion::Snapshot(generation, result));
        });
    }

    /// Archive every alert for the field. The list clears optimistically
    /// and re-syncs if the gateway refuses.
    fn archive_alerts(&mut self) {
        if self.alerts.is_empty() {
            self.notice = Some(Notice::info("No alerts to archive"));
            return;
        }
        self.alerts.clear();

        let client = Arc::clone(&self.client);
        let field = self.field.id.clone();
        let generation = self.generation;
        let tx = self.completions_tx.clone();

        self.runtime.spawn(async move {
            let result = client.archive_alerts(&field).await;
            let _ = tx.send(Completion::Archived(generation, result));
        });
    }

    /// Rotate to the next field on the account.
    fn next_field(&mut self) {
        if self.fields.len() < 2 {
            self.notice = Some(Notice::info("Only one field on this account"));
            return;
        }

        let current = self
            .fields
            .iter()
            .position(|field| field.id == self.field.id)
            .unwrap_or(0);
        let next = (current + 1) % self.fields.len();
        self.field = self.fields[next].clone();

        if let Err(e) = self.session.set_selected_field(Some(self.field.to_ref())) {
            tracing::warn!(error = %e, "Failed to persist field selection");
        }

        self.open_scope();
    }

    // ========== Input ==========

    /// Handle a key press.
    pub fn handle_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => self.should_quit = true,
            KeyCode::Char('r') => {
                self.notice = Some(Notice::info("Refreshing snapshot"));
                self.request_snapshot();
            }
            KeyCode::Tab | KeyCode::Right => self.select_next_series(),
            KeyCode::BackTab | KeyCode::Left => self.select_previous_series(),
            KeyCode::Char('a') => self.archive_alerts(),
            KeyCode::Char('f') => self.next_field(),
            _ => {}
        }
    }

    fn select_next_series(&mut self) {
        if self.series.is_empty() {
            return;
        }
        self.selected_series = (self.selected_series + 1) % self.series.len();
    }

    fn select_previous_series(&mut self) {
        if self.series.is_empty() {
            return;
        }
        self.selected_series = (self.selected_series + self.series.len() - 1) % self.series.len();
    }

    // ========== Shutdown ==========

    /// Close the push channel, waiting for the goodbye frame to go out.
    pub fn shutdown(&mut self) {
        if let Some(handle) = self.realtime.take() {
            self.runtime.block_on(handle.close());
        }
    }
}
