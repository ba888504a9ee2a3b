use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::error::{CopilotError, Result};
use crate::state::AppState;

/// One playable champion from the Data Dragon catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Champion {
    /// Stable code, e.g. "Aatrox".
    pub id: String,
    /// Numeric key as the session reports it, e.g. "266".
    pub key: String,
    pub name: String,
    pub title: String,
    pub image: String,
}

/// Champion list for one data version, ordered by `id`.
#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Catalog {
    pub version: String,
    pub champions: Vec<Champion>,
}

impl Catalog {
    pub fn is_empty(&self) -> bool {
        self.champions.is_empty()
    }

    /// Look up a champion by the numeric key used in champion-select payloads.
    pub fn find_by_key(&self, key: i64) -> Option<&Champion> {
        let key = key.to_string();
        self.champions.iter().find(|c| c.key == key)
    }

    /// Picker filter: name or title contains the term, or the id contains it
    /// ignoring case. An empty term matches everything.
    pub fn search(&self, term: &str) -> Vec<&Champion> {
        if term.is_empty() {
            return self.champions.iter().collect();
        }
        let lowered = term.to_lowercase();
        self.champions
            .iter()
            .filter(|c| {
                c.name.contains(term)
                    || c.title.contains(term)
                    || c.id.to_lowercase().contains(&lowered)
            })
            .collect()
    }
}

// ── Data Dragon wire format ─────────────────────────────────────────────────

#[derive(Deserialize)]
struct ChampionFile {
    data: BTreeMap<String, RawChampion>,
}

#[derive(Deserialize)]
struct RawChampion {
    id: String,
    key: String,
    name: String,
    title: String,
    image: RawImage,
}

#[derive(Deserialize)]
struct RawImage {
    full: String,
}

/// Builds the square portrait URL for a champion asset.
pub fn image_url(base: &str, version: &str, file: &str) -> String {
    format!("{base}/cdn/{version}/img/champion/{file}")
}

/// Fetches the champion catalog from Data Dragon.
pub struct CatalogClient {
    client: reqwest::Client,
    base: String,
    locale: String,
}

impl CatalogClient {
    pub fn new(client: reqwest::Client, base: &str, locale: &str) -> Self {
        Self {
            client,
            base: base.trim_end_matches('/').to_string(),
            locale: locale.to_string(),
        }
    }

    /// Newest entry of `api/versions.json`.
    pub async fn latest_version(&self) -> Result<String> {
        let versions: Vec<String> = self
            .client
            .get(format!("{}/api/versions.json", self.base))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        versions
            .into_iter()
            .next()
            .ok_or_else(|| CopilotError::Custom("Data Dragon returned no versions".into()))
    }

    pub async fn champions(&self, version: &str) -> Result<Vec<Champion>> {
        let file: ChampionFile = self
            .client
            .get(format!(
                "{}/cdn/{version}/data/{}/champion.json",
                self.base, self.locale
            ))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(file
            .data
            .into_values()
            .map(|c| Champion {
                image: image_url(&self.base, version, &c.image.full),
                id: c.id,
                key: c.key,
                name: c.name,
                title: c.title,
            })
            .collect())
    }

    pub async fn load(&self) -> Result<Catalog> {
        let version = self.latest_version().await?;
        let champions = self.champions(&version).await?;
        Ok(Catalog { version, champions })
    }
}

/// Load the catalog into managed state. Failures degrade to an empty catalog.
pub async fn refresh_catalog(app: &AppState) -> std::sync::Arc<Catalog> {
    let config = app.config().await;
    let client = CatalogClient::new(app.http().clone(), &config.ddragon_base, &config.locale);

    match client.load().await {
        Ok(catalog) => {
            info!(
                version = %catalog.version,
                champions = catalog.champions.len(),
                "Champion catalog loaded"
            );
            app.set_catalog(catalog).await;
        }
        Err(e) => warn!(error = %e, "Champion catalog unavailable"),
    }
    app.catalog().await
}

// ── Commands ────────────────────────────────────────────────────────────────

/// Returns the catalog, fetching it on first use.
#[tauri::command]
pub async fn load_catalog(app: tauri::State<'_, AppState>) -> Result<Catalog> {
    let catalog = app.catalog().await;
    if !catalog.is_empty() {
        return Ok((*catalog).clone());
    }
    Ok((*refresh_catalog(&app).await).clone())
}

#[tauri::command]
pub async fn search_champions(
    term: String,
    app: tauri::State<'_, AppState>,
) -> Result<Vec<Champion>> {
    let catalog = app.catalog().await;
    Ok(catalog.search(term.trim()).into_iter().cloned().collect())
}
