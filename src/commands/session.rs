use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tauri::ipc::Channel;
use tauri::Manager;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::commands::catalog::{Catalog, Champion};
use crate::error::Result;
use crate::state::AppState;

/// Number of opponent slots in a champion-select lobby.
pub const ENEMY_SLOTS: usize = 5;

// ── Roles ───────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Role {
    Top,
    Jungle,
    #[default]
    Mid,
    Adc,
    Support,
}

impl Role {
    /// Display order: top, jungle, mid, bottom, support.
    pub const ORDER: [Role; 5] = [Role::Top, Role::Jungle, Role::Mid, Role::Adc, Role::Support];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Top => "TOP",
            Role::Jungle => "JUNGLE",
            Role::Mid => "MID",
            Role::Adc => "ADC",
            Role::Support => "SUPPORT",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Top => "上路",
            Role::Jungle => "打野",
            Role::Mid => "中路",
            Role::Adc => "下路",
            Role::Support => "辅助",
        }
    }

    /// Maps a client position code to a role. Unrecognized codes become `Mid`.
    pub fn from_position_code(code: &str) -> Role {
        match code.trim().to_uppercase().as_str() {
            "TOP" => Role::Top,
            "JUNGLE" => Role::Jungle,
            "MIDDLE" | "MID" => Role::Mid,
            "BOTTOM" | "ADC" => Role::Adc,
            "UTILITY" | "SUPPORT" => Role::Support,
            _ => Role::Mid,
        }
    }

    /// Like [`Role::from_position_code`], but an empty or `UNKNOWN` code means
    /// the client has not assigned a position.
    pub fn assigned(code: &str) -> Option<Role> {
        let code = code.trim();
        if code.is_empty() || code.eq_ignore_ascii_case("UNKNOWN") {
            None
        } else {
            Some(Role::from_position_code(code))
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleOption {
    pub role: Role,
    pub label: String,
}

#[tauri::command]
pub async fn list_roles() -> Vec<RoleOption> {
    Role::ORDER
        .iter()
        .map(|&role| RoleOption {
            role,
            label: role.label().to_string(),
        })
        .collect()
}

// ── Session ─────────────────────────────────────────────────────────────────

/// JSON served by the local session bridge at `/state`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LcuStateResponse {
    #[serde(default)]
    pub is_connected: bool,
    #[serde(default)]
    pub my_champion_id: i64,
    #[serde(default)]
    pub my_pick_intent_id: i64,
    #[serde(default)]
    pub enemy_ids: Vec<i64>,
    #[serde(default = "unknown_role")]
    pub assigned_role: String,
}

fn unknown_role() -> String {
    "UNKNOWN".into()
}

impl Default for LcuStateResponse {
    fn default() -> Self {
        Self {
            is_connected: false,
            my_champion_id: 0,
            my_pick_intent_id: 0,
            enemy_ids: vec![0; ENEMY_SLOTS],
            assigned_role: unknown_role(),
        }
    }
}

/// Champion-select state as the view renders it. Replaced wholesale each tick.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub connected: bool,
    pub my_champion: Option<Champion>,
    pub enemy_team: Vec<Option<Champion>>,
    pub assigned_role: Option<Role>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::disconnected()
    }
}

impl SessionState {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            my_champion: None,
            enemy_team: vec![None; ENEMY_SLOTS],
            assigned_role: None,
        }
    }

    /// Resolve numeric ids against the catalog. Locked pick wins over pick intent;
    /// id 0 and unknown keys give empty slots.
    pub fn from_response(response: &LcuStateResponse, catalog: &Catalog) -> Self {
        if !response.is_connected {
            return Self::disconnected();
        }

        let lookup = |id: i64| {
            if id == 0 {
                None
            } else {
                catalog.find_by_key(id).cloned()
            }
        };

        let active_id = if response.my_champion_id != 0 {
            response.my_champion_id
        } else {
            response.my_pick_intent_id
        };

        let mut enemy_team: Vec<Option<Champion>> = response
            .enemy_ids
            .iter()
            .take(ENEMY_SLOTS)
            .map(|&id| lookup(id))
            .collect();
        enemy_team.resize(ENEMY_SLOTS, None);

        Self {
            connected: true,
            my_champion: lookup(active_id),
            enemy_team,
            assigned_role: Role::assigned(&response.assigned_role),
        }
    }
}

/// One poll of the session endpoint. Any failure reads as "disconnected".
pub async fn poll_once(client: &reqwest::Client, url: &str, catalog: &Catalog) -> SessionState {
    let response = async {
        client
            .get(url)
            .timeout(Duration::from_secs(2))
            .send()
            .await?
            .error_for_status()?
            .json::<LcuStateResponse>()
            .await
    }
    .await;

    match response {
        Ok(state) => SessionState::from_response(&state, catalog),
        Err(e) => {
            debug!(url, error = %e, "Session poll failed");
            SessionState::disconnected()
        }
    }
}

// ── Events ──────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase", tag = "event", content = "data")]
pub enum SessionEvent {
    Snapshot { session: SessionState },
    ConnectionChanged { connected: bool },
}

/// Events for one poll result: `ConnectionChanged` only when the flag flips,
/// then a `Snapshot` every time.
fn tick_events(was_connected: &mut bool, session: &SessionState) -> Vec<SessionEvent> {
    let mut events = Vec::with_capacity(2);
    if session.connected != *was_connected {
        *was_connected = session.connected;
        info!(connected = session.connected, "Session connection changed");
        events.push(SessionEvent::ConnectionChanged {
            connected: session.connected,
        });
    }
    events.push(SessionEvent::Snapshot {
        session: session.clone(),
    });
    events
}

// ── State ───────────────────────────────────────────────────────────────────

pub struct SessionPollerState {
    poller_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    active: Arc<AtomicBool>,
    latest: Arc<RwLock<SessionState>>,
}

impl Default for SessionPollerState {
    fn default() -> Self {
        Self {
            poller_handle: Arc::new(Mutex::new(None)),
            active: Arc::new(AtomicBool::new(false)),
            latest: Arc::new(RwLock::new(SessionState::disconnected())),
        }
    }
}

impl SessionPollerState {
    pub fn kill_sync(&self) {
        self.active.store(false, Ordering::SeqCst);
        if let Ok(mut guard) = self.poller_handle.try_lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
    }

    pub async fn latest(&self) -> SessionState {
        self.latest.read().await.clone()
    }

    /// Run `poll` every `interval`, handing each tick's events to `emit`.
    ///
    /// A poller that is already running is aborted first, so a reloaded view
    /// can rebind the stream to its new channel.
    pub async fn spawn<P, Fut, E>(&self, interval: Duration, poll: P, emit: E)
    where
        P: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = SessionState> + Send,
        E: Fn(SessionEvent) + Send + 'static,
    {
        let mut slot = self.poller_handle.lock().await;
        if let Some(previous) = slot.take() {
            previous.abort();
            info!("Replacing running session poller");
        }

        self.active.store(true, Ordering::SeqCst);
        let active = self.active.clone();
        let latest = self.latest.clone();

        *slot = Some(tokio::spawn(async move {
            let mut was_connected = false;
            loop {
                tokio::time::sleep(interval).await;

                if !active.load(Ordering::SeqCst) {
                    break;
                }

                let session = poll().await;
                *latest.write().await = session.clone();
                for event in tick_events(&mut was_connected, &session) {
                    emit(event);
                }
            }
        }));
    }

    /// Abort the poller. Returns whether one was running.
    pub async fn stop(&self) -> bool {
        self.active.store(false, Ordering::SeqCst);
        match self.poller_handle.lock().await.take() {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }
}

// ── Commands ────────────────────────────────────────────────────────────────

/// Starts polling the session endpoint, streaming each snapshot to the view.
/// Calling it again replaces the running poller.
#[tauri::command]
pub async fn start_session_poller(
    on_event: Channel<SessionEvent>,
    handle: tauri::AppHandle,
    state: tauri::State<'_, SessionPollerState>,
    app: tauri::State<'_, AppState>,
) -> Result<()> {
    let config = app.config().await;
    let interval = config.poll_interval();
    let url = config.session_url;
    let client = app.http().clone();

    info!(url = %url, interval_ms = interval.as_millis() as u64, "Session poller started");

    let poll = move || {
        let client = client.clone();
        let url = url.clone();
        let handle = handle.clone();
        async move {
            // Re-read each tick so a catalog that loads late is picked up.
            let catalog = handle.state::<AppState>().catalog().await;
            poll_once(&client, &url, &catalog).await
        }
    };

    state
        .spawn(interval, poll, move |event| {
            let _ = on_event.send(event);
        })
        .await;

    Ok(())
}

#[tauri::command]
pub async fn stop_session_poller(state: tauri::State<'_, SessionPollerState>) -> Result<()> {
    if state.stop().await {
        info!("Session poller stopped");
    }
    Ok(())
}

#[tauri::command]
pub async fn get_session_state(
    state: tauri::State<'_, SessionPollerState>,
) -> Result<SessionState> {
    Ok(state.latest().await)
}
