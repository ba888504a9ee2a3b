//! Built-in LCU bridge.
//!
//! Reads the League client's lockfile, polls its champion-select endpoint and
//! serves the result as `GET /state` on a loopback port, in the same JSON shape
//! the session poller consumes. Lets the app run without a separate bridge
//! process.

use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::commands::session::{LcuStateResponse, ENEMY_SLOTS};
use crate::error::{CopilotError, Result};
use crate::state::AppState;

const LOCKFILE_NAMES: [&str; 3] = ["lockfile", "LeagueClientUx.lockfile", "LeagueClient.lockfile"];
const WATCH_INTERVAL: Duration = Duration::from_secs(1);
const CHAMP_SELECT_PATH: &str = "/lol-champ-select/v1/session";

type Snapshot = Arc<RwLock<LcuStateResponse>>;

// ── Lockfile ────────────────────────────────────────────────────────────────

/// Connection details from `name:pid:port:password:protocol`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Lockfile {
    pub port: u16,
    pub password: String,
    pub protocol: String,
}

impl Lockfile {
    pub fn base_url(&self) -> String {
        format!("{}://127.0.0.1:{}", self.protocol, self.port)
    }
}

pub fn parse_lockfile(content: &str) -> Option<Lockfile> {
    let parts: Vec<&str> = content.trim().split(':').collect();
    if parts.len() < 5 {
        return None;
    }
    Some(Lockfile {
        port: parts[2].parse().ok()?,
        password: parts[3].to_string(),
        protocol: parts[4].to_string(),
    })
}

/// First readable lockfile in the League install directory.
pub fn find_lockfile(league_dir: &Path) -> Option<Lockfile> {
    LOCKFILE_NAMES
        .iter()
        .filter_map(|name| std::fs::read_to_string(league_dir.join(name)).ok())
        .find_map(|content| parse_lockfile(&content))
}

// ── Champion select ─────────────────────────────────────────────────────────

/// Map an LCU champion-select session to the bridge record.
pub fn state_from_session(session: &Value) -> LcuStateResponse {
    let my_cell = session["localPlayerCellId"].as_i64().unwrap_or(-1);

    let my_slot = session["myTeam"]
        .as_array()
        .and_then(|team| team.iter().find(|p| p["cellId"].as_i64() == Some(my_cell)));

    let my_champion_id = my_slot
        .and_then(|s| s["championId"].as_i64())
        .unwrap_or(0);

    // The slot's pick intent is only filled while hovering; the pick action
    // carries the hovered champion too.
    let my_pick_intent_id = my_slot
        .and_then(|s| s["championPickIntent"].as_i64())
        .filter(|&id| id != 0)
        .or_else(|| hovered_pick(session, my_cell))
        .unwrap_or(0);

    let assigned_role = my_slot
        .and_then(|s| s["assignedPosition"].as_str())
        .filter(|p| !p.is_empty())
        .map(str::to_uppercase)
        .unwrap_or_else(|| "UNKNOWN".to_string());

    let mut enemy_ids: Vec<i64> = session["theirTeam"]
        .as_array()
        .map(|team| {
            team.iter()
                .take(ENEMY_SLOTS)
                .map(|p| p["championId"].as_i64().unwrap_or(0))
                .collect()
        })
        .unwrap_or_default();
    enemy_ids.resize(ENEMY_SLOTS, 0);

    LcuStateResponse {
        is_connected: true,
        my_champion_id,
        my_pick_intent_id,
        enemy_ids,
        assigned_role,
    }
}

fn hovered_pick(session: &Value, my_cell: i64) -> Option<i64> {
    session["actions"]
        .as_array()?
        .iter()
        .filter_map(Value::as_array)
        .flatten()
        .filter(|a| a["actorCellId"].as_i64() == Some(my_cell) && a["type"].as_str() == Some("pick"))
        .filter_map(|a| a["championId"].as_i64())
        .find(|&id| id != 0)
}

/// One look at the client. No lockfile or no answer means disconnected; a
/// client outside champion select is connected with empty picks.
async fn fetch_bridge_state(client: &reqwest::Client, league_dir: &Path) -> LcuStateResponse {
    let Some(lockfile) = find_lockfile(league_dir) else {
        return LcuStateResponse::default();
    };

    let response = client
        .get(format!("{}{CHAMP_SELECT_PATH}", lockfile.base_url()))
        .basic_auth("riot", Some(&lockfile.password))
        .timeout(Duration::from_secs(2))
        .send()
        .await;

    let response = match response {
        Ok(r) => r,
        Err(e) => {
            debug!(error = %e, "League client not reachable");
            return LcuStateResponse::default();
        }
    };

    if !response.status().is_success() {
        // 404 outside champion select.
        return LcuStateResponse {
            is_connected: true,
            ..LcuStateResponse::default()
        };
    }

    match response.json::<Value>().await {
        Ok(session) => state_from_session(&session),
        Err(e) => {
            warn!(error = %e, "Unreadable champion-select session");
            LcuStateResponse {
                is_connected: true,
                ..LcuStateResponse::default()
            }
        }
    }
}

// ── HTTP server ─────────────────────────────────────────────────────────────

/// Serve `GET /state` on `addr`. Returns the task and the bound address.
pub async fn start_bridge_server(
    addr: &str,
    snapshot: Snapshot,
) -> Result<(JoinHandle<()>, SocketAddr)> {
    let listener = TcpListener::bind(addr).await?;
    let local = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => continue,
            };

            let snapshot = snapshot.clone();
            tokio::spawn(async move {
                handle_connection(stream, snapshot).await;
            });
        }
    });

    Ok((handle, local))
}

/// Handle a single TCP connection with minimal HTTP parsing.
async fn handle_connection(mut stream: tokio::net::TcpStream, snapshot: Snapshot) {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let mut buf = vec![0u8; 8192];
    let n = match stream.read(&mut buf).await {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };

    let request = String::from_utf8_lossy(&buf[..n]);
    let first_line = request.lines().next().unwrap_or("");

    let response = if first_line.starts_with("GET /state") {
        let body = serde_json::to_string(&*snapshot.read().await).unwrap_or_else(|_| "{}".into());
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\nAccess-Control-Allow-Origin: *\r\n\r\n{body}",
            body.len()
        )
    } else if first_line.starts_with("OPTIONS") {
        "HTTP/1.1 204 No Content\r\nAccess-Control-Allow-Origin: *\r\nAccess-Control-Allow-Methods: GET, OPTIONS\r\nAccess-Control-Allow-Headers: Content-Type\r\nConnection: close\r\n\r\n".to_string()
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 9\r\nConnection: close\r\n\r\nnot found".to_string()
    };

    let _ = stream.write_all(response.as_bytes()).await;
}

// ── State ───────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStatus {
    pub running: bool,
    pub addr: Option<String>,
    pub client_connected: bool,
}

/// Managed Tauri state for the bridge's watcher and server tasks.
pub struct BridgeState {
    server: Arc<Mutex<Option<JoinHandle<()>>>>,
    watcher: Arc<Mutex<Option<JoinHandle<()>>>>,
    addr: Arc<Mutex<Option<SocketAddr>>>,
    snapshot: Snapshot,
}

impl Default for BridgeState {
    fn default() -> Self {
        Self {
            server: Arc::new(Mutex::new(None)),
            watcher: Arc::new(Mutex::new(None)),
            addr: Arc::new(Mutex::new(None)),
            snapshot: Arc::new(RwLock::new(LcuStateResponse::default())),
        }
    }
}

impl BridgeState {
    /// Bind the server and start watching the client in `league_dir`.
    pub async fn start(&self, addr: &str, league_dir: PathBuf) -> Result<SocketAddr> {
        let mut server = self.server.lock().await;
        if server.is_some() {
            return Err(CopilotError::Custom("LCU bridge is already running".into()));
        }

        let client = reqwest::Client::builder()
            // The League client serves a self-signed certificate.
            .danger_accept_invalid_certs(true)
            .build()?;

        let (server_task, bound) = start_bridge_server(addr, self.snapshot.clone()).await?;

        let snapshot = self.snapshot.clone();
        let watcher_task = tokio::spawn(async move {
            let mut was_connected = false;
            loop {
                let state = fetch_bridge_state(&client, &league_dir).await;
                if state.is_connected != was_connected {
                    was_connected = state.is_connected;
                    info!(connected = was_connected, "League client connection changed");
                }
                *snapshot.write().await = state;
                tokio::time::sleep(WATCH_INTERVAL).await;
            }
        });

        *server = Some(server_task);
        *self.watcher.lock().await = Some(watcher_task);
        *self.addr.lock().await = Some(bound);

        info!(addr = %bound, "LCU bridge listening");
        Ok(bound)
    }

    pub async fn stop(&self) {
        if let Some(handle) = self.server.lock().await.take() {
            handle.abort();
        }
        if let Some(handle) = self.watcher.lock().await.take() {
            handle.abort();
        }
        *self.addr.lock().await = None;
        *self.snapshot.write().await = LcuStateResponse::default();
    }

    /// Abort both tasks synchronously (for window close handler).
    pub fn kill_sync(&self) {
        for slot in [&self.server, &self.watcher] {
            if let Ok(mut guard) = slot.try_lock() {
                if let Some(handle) = guard.take() {
                    handle.abort();
                }
            }
        }
    }

    pub async fn status(&self) -> BridgeStatus {
        let addr = *self.addr.lock().await;
        BridgeStatus {
            running: addr.is_some(),
            addr: addr.map(|a| a.to_string()),
            client_connected: self.snapshot.read().await.is_connected,
        }
    }
}

// ── Commands ────────────────────────────────────────────────────────────────

#[tauri::command]
pub async fn start_bridge(
    bridge: tauri::State<'_, BridgeState>,
    app: tauri::State<'_, AppState>,
) -> Result<BridgeStatus> {
    let config = app.config().await;
    let league_dir = config
        .league_dir()
        .ok_or_else(|| CopilotError::Custom("Set the League install folder first".into()))?;

    bridge.start(&config.bridge_addr, league_dir).await?;
    Ok(bridge.status().await)
}

#[tauri::command]
pub async fn stop_bridge(bridge: tauri::State<'_, BridgeState>) -> Result<BridgeStatus> {
    bridge.stop().await;
    info!("LCU bridge stopped");
    Ok(bridge.status().await)
}

#[tauri::command]
pub async fn get_bridge_status(bridge: tauri::State<'_, BridgeState>) -> Result<BridgeStatus> {
    Ok(bridge.status().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_lockfile() {
        let lock = parse_lockfile("LeagueClient:12345:54321:s3cr3t:https\n").unwrap();
        assert_eq!(lock.port, 54321);
        assert_eq!(lock.password, "s3cr3t");
        assert_eq!(lock.base_url(), "https://127.0.0.1:54321");

        assert!(parse_lockfile("LeagueClient:12345:notaport:pw:https").is_none());
        assert!(parse_lockfile("too:short").is_none());
    }

    #[test]
    fn test_find_lockfile_checks_alternate_names() {
        let dir = tempfile::tempdir().unwrap();
        assert!(find_lockfile(dir.path()).is_none());

        std::fs::write(
            dir.path().join("LeagueClientUx.lockfile"),
            "LeagueClientUx:1:2999:pw:https",
        )
        .unwrap();
        assert_eq!(find_lockfile(dir.path()).map(|l| l.port), Some(2999));
    }

    #[test]
    fn test_state_from_session() {
        let session = json!({
            "localPlayerCellId": 2,
            "myTeam": [
                { "cellId": 1, "championId": 64, "assignedPosition": "jungle" },
                { "cellId": 2, "championId": 0, "championPickIntent": 103, "assignedPosition": "middle" }
            ],
            "theirTeam": [
                { "cellId": 5, "championId": 238 },
                { "cellId": 6, "championId": 0 }
            ]
        });

        let state = state_from_session(&session);
        assert!(state.is_connected);
        assert_eq!(state.my_champion_id, 0);
        assert_eq!(state.my_pick_intent_id, 103);
        assert_eq!(state.assigned_role, "MIDDLE");
        assert_eq!(state.enemy_ids, vec![238, 0, 0, 0, 0]);
    }

    #[test]
    fn test_hover_read_from_pick_actions() {
        let session = json!({
            "localPlayerCellId": 0,
            "myTeam": [{ "cellId": 0, "championId": 0, "championPickIntent": 0, "assignedPosition": "" }],
            "theirTeam": [],
            "actions": [
                [{ "actorCellId": 0, "type": "ban", "championId": 238 }],
                [{ "actorCellId": 0, "type": "pick", "championId": 222 }]
            ]
        });

        let state = state_from_session(&session);
        assert_eq!(state.my_pick_intent_id, 222);
        assert_eq!(state.assigned_role, "UNKNOWN");
        assert_eq!(state.enemy_ids, vec![0; ENEMY_SLOTS]);
    }

    #[tokio::test]
    async fn test_missing_lockfile_is_disconnected() {
        let dir = tempfile::tempdir().unwrap();
        let state = fetch_bridge_state(&reqwest::Client::new(), dir.path()).await;
        assert_eq!(state, LcuStateResponse::default());
    }

    #[tokio::test]
    async fn test_server_serves_snapshot() {
        let snapshot: Snapshot = Arc::new(RwLock::new(LcuStateResponse {
            is_connected: true,
            my_champion_id: 103,
            my_pick_intent_id: 0,
            enemy_ids: vec![238, 0, 0, 0, 0],
            assigned_role: "MIDDLE".into(),
        }));
        let (handle, addr) = start_bridge_server("127.0.0.1:0", snapshot).await.unwrap();
        let client = reqwest::Client::new();

        let response = client.get(format!("http://{addr}/state")).send().await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            response
                .headers()
                .get("access-control-allow-origin")
                .and_then(|v| v.to_str().ok()),
            Some("*")
        );
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["isConnected"], true);
        assert_eq!(body["myChampionId"], 103);
        assert_eq!(body["enemyIds"][0], 238);
        assert_eq!(body["assignedRole"], "MIDDLE");

        let missing = client.get(format!("http://{addr}/other")).send().await.unwrap();
        assert_eq!(missing.status(), 404);

        handle.abort();
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = BridgeState::default();
        bridge.start("127.0.0.1:0", dir.path().to_path_buf()).await.unwrap();
        assert!(bridge.status().await.running);
        assert!(bridge
            .start("127.0.0.1:0", dir.path().to_path_buf())
            .await
            .is_err());

        bridge.stop().await;
        assert!(!bridge.status().await.running);
    }
}
