use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::commands::session::Role;
use crate::error::Result;
use crate::state::AppState;
use crate::strategy::{MatchupQuery, Strategy};

// ── Selection policy ────────────────────────────────────────────────────────

/// What the view currently has selected. Champions are identified by id.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    pub my_champion: Option<String>,
    pub opponent: Option<String>,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub context: String,
}

impl Selection {
    fn matchup(&self) -> (Option<&str>, Option<&str>, Role) {
        (self.my_champion.as_deref(), self.opponent.as_deref(), self.role)
    }
}

/// Auto-analyze fires when the champion/opponent/role triple changes, both
/// sides are picked, and no free-text context is set. Context edits alone
/// never trigger; with context present analysis is manual.
pub fn should_auto_analyze(previous: Option<&Selection>, next: &Selection) -> bool {
    let changed = previous.map_or(true, |p| p.matchup() != next.matchup());
    changed
        && next.my_champion.is_some()
        && next.opponent.is_some()
        && next.context.trim().is_empty()
}

// ── Generation guard ────────────────────────────────────────────────────────

/// Tracks the newest analysis request so an older response finishing late
/// can be recognised and dropped.
pub struct AnalysisState {
    generation: AtomicU64,
    selection: Mutex<Option<Selection>>,
}

impl Default for AnalysisState {
    fn default() -> Self {
        Self {
            generation: AtomicU64::new(0),
            selection: Mutex::new(None),
        }
    }
}

impl AnalysisState {
    /// Start a request; the returned ticket stays current until the next `begin`.
    pub fn begin(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, ticket: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == ticket
    }

    /// Record the new selection and report whether it should auto-analyze.
    pub async fn select(&self, next: Selection) -> bool {
        let mut guard = self.selection.lock().await;
        let auto = should_auto_analyze(guard.as_ref(), &next);
        *guard = Some(next);
        auto
    }
}

// ── Commands ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyRequest {
    pub my_champion: String,
    pub opponent: String,
    pub role: Role,
    #[serde(default)]
    pub context: Option<String>,
}

impl From<StrategyRequest> for MatchupQuery {
    fn from(req: StrategyRequest) -> Self {
        MatchupQuery {
            my_champion: req.my_champion,
            opponent: req.opponent,
            role: req.role,
            context: req.context,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase", tag = "status", content = "strategy")]
pub enum StrategyOutcome {
    Ready(Strategy),
    /// A newer request started while this one was in flight. The answer was
    /// still cached, but the view should not show it.
    Superseded,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionUpdate {
    pub auto_analyze: bool,
}

#[tauri::command]
pub async fn update_selection(
    selection: Selection,
    analysis: tauri::State<'_, AnalysisState>,
) -> Result<SelectionUpdate> {
    let auto_analyze = analysis.select(selection).await;
    Ok(SelectionUpdate { auto_analyze })
}

#[tauri::command]
pub async fn get_strategy(
    request: StrategyRequest,
    analysis: tauri::State<'_, AnalysisState>,
    app: tauri::State<'_, AppState>,
) -> Result<StrategyOutcome> {
    let ticket = analysis.begin();
    let query = MatchupQuery::from(request);
    let service = app.strategy_service().await;

    let strategy = service.get_strategy(&query).await?;

    if !analysis.is_current(ticket) {
        debug!(ticket, "Discarding superseded strategy response");
        return Ok(StrategyOutcome::Superseded);
    }
    Ok(StrategyOutcome::Ready(strategy))
}

#[tauri::command]
pub async fn clear_strategy_cache(app: tauri::State<'_, AppState>) -> Result<usize> {
    let removed = app.cache().await.run_blocking(|c| c.clear()).await?;
    info!(removed, "Strategy cache cleared");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sel(my: Option<&str>, opp: Option<&str>, role: Role, ctx: &str) -> Selection {
        Selection {
            my_champion: my.map(String::from),
            opponent: opp.map(String::from),
            role,
            context: ctx.into(),
        }
    }

    #[test]
    fn test_auto_analyze_needs_both_champions() {
        assert!(!should_auto_analyze(None, &sel(Some("Ahri"), None, Role::Mid, "")));
        assert!(!should_auto_analyze(None, &sel(None, Some("Zed"), Role::Mid, "")));
        assert!(should_auto_analyze(None, &sel(Some("Ahri"), Some("Zed"), Role::Mid, "")));
    }

    #[test]
    fn test_auto_analyze_only_on_change() {
        let current = sel(Some("Ahri"), Some("Zed"), Role::Mid, "");
        assert!(!should_auto_analyze(Some(&current), &current.clone()));
        assert!(should_auto_analyze(
            Some(&current),
            &sel(Some("Ahri"), Some("Zed"), Role::Jungle, "")
        ));
        assert!(should_auto_analyze(
            Some(&current),
            &sel(Some("Ahri"), Some("Yasuo"), Role::Mid, "")
        ));
    }

    #[test]
    fn test_context_makes_analysis_manual() {
        let with_ctx = sel(Some("Ahri"), Some("Zed"), Role::Mid, "faker vod");
        assert!(!should_auto_analyze(None, &with_ctx));

        // Clearing the context alone is not a matchup change.
        let cleared = sel(Some("Ahri"), Some("Zed"), Role::Mid, "");
        assert!(!should_auto_analyze(Some(&with_ctx), &cleared));
    }

    #[tokio::test]
    async fn test_select_remembers_previous() {
        let state = AnalysisState::default();
        assert!(state.select(sel(Some("Ahri"), Some("Zed"), Role::Mid, "")).await);
        assert!(!state.select(sel(Some("Ahri"), Some("Zed"), Role::Mid, "")).await);
        assert!(state.select(sel(Some("Ahri"), Some("Zed"), Role::Top, "")).await);
    }

    #[test]
    fn test_newer_request_supersedes_older() {
        let state = AnalysisState::default();
        let first = state.begin();
        assert!(state.is_current(first));

        let second = state.begin();
        assert!(!state.is_current(first));
        assert!(state.is_current(second));
    }

    #[test]
    fn test_outcome_wire_format() {
        let json = serde_json::to_value(StrategyOutcome::Superseded).unwrap();
        assert_eq!(json["status"], "superseded");
    }

    #[test]
    fn test_request_deserializes_from_view() {
        let req: StrategyRequest = serde_json::from_str(
            r#"{"myChampion":"阿狸","opponent":"劫","role":"ADC"}"#,
        )
        .unwrap();
        let query = MatchupQuery::from(req);
        assert_eq!(query.role, Role::Adc);
        assert_eq!(query.context, None);
    }
}
