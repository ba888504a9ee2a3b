use tauri::Manager;
use tracing::{info, warn};

mod commands;
mod error;
mod state;
mod strategy;
mod templates;
pub mod util;

use commands::bridge::BridgeState;
use commands::config::CopilotConfig;
use commands::session::SessionPollerState;
use commands::strategy::AnalysisState;
use state::AppState;

pub fn run() {
    let (config, config_error) = match commands::config::read_config() {
        Ok(config) => (config, None),
        Err(e) => (CopilotConfig::default(), Some(e)),
    };
    let log_path = commands::logs::init_logging(&config.log_level);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        log = ?log_path,
        "LCU Copilot starting"
    );
    if let Some(e) = config_error {
        warn!(error = %e, "Ignoring unreadable config file, using defaults");
    }

    let app_state = AppState::new(config);

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .manage(app_state)
        .manage(SessionPollerState::default())
        .manage(AnalysisState::default())
        .manage(BridgeState::default())
        .setup(|app| {
            let handle = app.handle().clone();
            tauri::async_runtime::spawn(async move {
                let app_state = handle.state::<AppState>();

                let cache = app_state.cache().await;
                match cache.run_blocking(|c| c.purge_expired()).await {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "Purged expired strategies"),
                    Err(e) => warn!(error = %e, "Strategy cache purge failed"),
                }

                // The bridge only makes sense once the League folder is known.
                let config = app_state.config().await;
                if let Some(league_dir) = config.league_dir() {
                    let bridge = handle.state::<BridgeState>();
                    if let Err(e) = bridge.start(&config.bridge_addr, league_dir).await {
                        warn!(error = %e, addr = %config.bridge_addr, "LCU bridge not started");
                    }
                }
            });
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            commands::config::load_config,
            commands::config::save_settings,
            commands::catalog::load_catalog,
            commands::catalog::search_champions,
            commands::session::list_roles,
            commands::session::start_session_poller,
            commands::session::stop_session_poller,
            commands::session::get_session_state,
            commands::strategy::update_selection,
            commands::strategy::get_strategy,
            commands::strategy::clear_strategy_cache,
            commands::bridge::start_bridge,
            commands::bridge::stop_bridge,
            commands::bridge::get_bridge_status,
        ])
        .on_window_event(|window, event| {
            if let tauri::WindowEvent::Destroyed = event {
                if let Some(state) = window.try_state::<SessionPollerState>() {
                    state.inner().kill_sync();
                }
                if let Some(state) = window.try_state::<BridgeState>() {
                    state.inner().kill_sync();
                }
            }
        })
        .run(tauri::generate_context!())
        .expect("failed to run LCU Copilot");
}
