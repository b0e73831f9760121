pub mod lifecycle;
pub mod rooms;
pub mod session;

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{RwLock, watch};

use crate::{
    clock::{Calendar, Clock, QuizDate},
    config::AppConfig,
    coordinator::CoordinatorHandle,
    dao::quiz_store::QuizStore,
    error::ServiceError,
};

pub use self::rooms::{RoomHub, RoomState};
pub use self::session::DailySession;

pub type SharedState = Arc<AppState>;

/// Central application state: store handle, coordinator, per-day rooms and
/// advancement sessions, and the shared clock.
pub struct AppState {
    config: Arc<AppConfig>,
    calendar: Calendar,
    clock: Arc<dyn Clock>,
    quiz_store: RwLock<Option<Arc<dyn QuizStore>>>,
    coordinator: Arc<CoordinatorHandle>,
    rooms: RoomState,
    sessions: DashMap<QuizDate, DailySession>,
    ip_joins: DashMap<(QuizDate, String), u32>,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned
    /// cheaply. The application starts in degraded mode until a storage
    /// backend is installed.
    pub fn new(
        config: AppConfig,
        clock: Arc<dyn Clock>,
        coordinator: Arc<CoordinatorHandle>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        let calendar = config.calendar();
        Arc::new(Self {
            config: Arc::new(config),
            calendar,
            clock,
            quiz_store: RwLock::new(None),
            coordinator,
            rooms: RoomState::new(),
            sessions: DashMap::new(),
            ip_joins: DashMap::new(),
            degraded: degraded_tx,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn calendar(&self) -> &Calendar {
        &self.calendar
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    pub fn rooms(&self) -> &RoomState {
        &self.rooms
    }

    /// Obtain a handle to the current store, if one is installed.
    pub async fn quiz_store(&self) -> Option<Arc<dyn QuizStore>> {
        let guard = self.quiz_store.read().await;
        guard.as_ref().cloned()
    }

    /// Store handle or a degraded-mode failure for hot-path handlers.
    pub async fn require_store(&self) -> Result<Arc<dyn QuizStore>, ServiceError> {
        self.quiz_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new store implementation and leave degraded mode.
    pub async fn install_quiz_store(&self, store: Arc<dyn QuizStore>) {
        {
            let mut guard = self.quiz_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current store and enter degraded mode.
    pub async fn clear_quiz_store(&self) {
        {
            let mut guard = self.quiz_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    pub async fn is_degraded(&self) -> bool {
        let guard = self.quiz_store.read().await;
        guard.is_none()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    pub fn update_degraded(&self, value: bool) {
        let _ = self.degraded.send(value);
    }

    /// Register the advancement session for a day, replacing (and stopping)
    /// any previous one.
    pub fn install_session(&self, session: DailySession) {
        let date = session.date();
        if let Some((_, previous)) = self.sessions.remove(&date) {
            previous.stop();
        }
        self.sessions.insert(date, session);
    }

    /// Whether this process currently owns an advancement loop for `date`.
    pub fn has_session(&self, date: QuizDate) -> bool {
        self.sessions.contains_key(&date)
    }

    /// Bump and return the day's join count for an address.
    pub fn bump_ip_join(&self, date: QuizDate, ip: &str) -> u32 {
        let mut entry = self.ip_joins.entry((date, ip.to_owned())).or_insert(0);
        *entry += 1;
        *entry
    }

    /// Tear down the day's session at a terminal state.
    pub fn remove_session(&self, date: QuizDate) {
        if let Some((_, session)) = self.sessions.remove(&date) {
            session.stop();
        }
    }
}
