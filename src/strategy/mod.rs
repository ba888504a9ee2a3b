//! Matchup strategy: result types, the local cache, and the Gemini fetcher.
//!
//! [`StrategyService::get_strategy`] is the single entry point: it answers from
//! the cache when the fingerprint is fresh, otherwise asks Gemini and caches
//! the normalized answer.

pub mod cache;
pub mod fingerprint;
pub mod gemini;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::commands::config::CopilotConfig;
use crate::error::Result;

pub use cache::StrategyCache;
pub use fingerprint::{Fingerprint, MatchupQuery};
pub use gemini::{GeminiClient, GeminiConfig};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebRef {
    pub uri: String,
    pub title: String,
}

/// A grounding citation, shaped `{ "web": { "uri", "title" } }`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSource {
    pub web: WebRef,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StrategyData {
    pub summary: String,
    pub early_game: Vec<String>,
    pub mid_game: Vec<String>,
    pub late_game: Vec<String>,
    pub matchup_tips: String,
    #[serde(default)]
    pub sources: Vec<WebSource>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended_creator: Option<String>,
}

impl StrategyData {
    /// Trim text, drop blank directives, and turn an empty creator into `None`.
    pub fn normalize(&mut self) {
        fn clean(items: &mut Vec<String>) {
            for item in items.iter_mut() {
                *item = item.trim().to_string();
            }
            items.retain(|i| !i.is_empty());
        }

        self.summary = self.summary.trim().to_string();
        self.matchup_tips = self.matchup_tips.trim().to_string();
        clean(&mut self.early_game);
        clean(&mut self.mid_game);
        clean(&mut self.late_game);
        self.recommended_creator = self
            .recommended_creator
            .take()
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty());
    }
}

/// A strategy as handed to the view, flagged when it came from the cache.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Strategy {
    #[serde(flatten)]
    pub data: StrategyData,
    pub is_cached: bool,
}

pub struct StrategyService {
    cache: Arc<StrategyCache>,
    gemini: GeminiClient,
}

impl StrategyService {
    pub fn new(cache: Arc<StrategyCache>, gemini: GeminiClient) -> Self {
        Self { cache, gemini }
    }

    pub fn from_config(config: &CopilotConfig, cache: Arc<StrategyCache>, http: reqwest::Client) -> Self {
        let gemini = GeminiClient::new(
            http,
            GeminiConfig {
                api_key: config.resolved_api_key(),
                model: config.model.clone(),
                base_url: config.gemini_base_url.clone(),
                web_search: config.web_search,
            },
        );
        Self::new(cache, gemini)
    }

    /// Cached answer if fresh, otherwise a Gemini call whose result is cached
    /// under the fingerprint of the raw query.
    pub async fn get_strategy(&self, query: &MatchupQuery) -> Result<Strategy> {
        let fingerprint = query.fingerprint(self.cache.version());

        let key = fingerprint.clone();
        let cached = self
            .cache
            .clone()
            .run_blocking(move |c| Ok(c.lookup(&key)))
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "Strategy cache lookup failed");
                None
            });

        if let Some(data) = cached {
            info!(
                my_champion = %query.my_champion,
                opponent = %query.opponent,
                role = %query.role,
                "Strategy cache hit"
            );
            return Ok(Strategy {
                data,
                is_cached: true,
            });
        }

        let data = self.gemini.generate(query).await.map_err(|e| {
            error!(error = %e, "Strategy fetch failed");
            e
        })?;

        let entry = data.clone();
        let stored = self
            .cache
            .clone()
            .run_blocking(move |c| c.store(&fingerprint, &entry))
            .await;
        if let Err(e) = stored {
            warn!(error = %e, "Failed to cache strategy");
        }
        info!(
            my_champion = %query.my_champion,
            opponent = %query.opponent,
            role = %query.role,
            sources = data.sources.len(),
            "Strategy fetched"
        );

        Ok(Strategy {
            data,
            is_cached: false,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::commands::session::Role;
    use crate::strategy::gemini::tests::gemini_body;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub(crate) fn sample_strategy() -> StrategyData {
        StrategyData {
            summary: "Play around level 6.".into(),
            early_game: vec!["Shove wave".into(), "Ward river".into()],
            mid_game: vec!["Roam bot".into()],
            late_game: vec!["Pick off carries".into()],
            matchup_tips: "Hold charm for his shadow.".into(),
            sources: vec![WebSource {
                web: WebRef {
                    uri: "https://guide.test".into(),
                    title: "Guide".into(),
                },
            }],
            recommended_creator: Some("OneTrickAhri".into()),
        }
    }

    fn service(base_url: &str, dir: &std::path::Path) -> StrategyService {
        let cache = Arc::new(StrategyCache::new(dir, "14.24.1"));
        let gemini = GeminiClient::new(
            reqwest::Client::new(),
            GeminiConfig {
                api_key: Some("test-key".into()),
                model: "gemini-test".into(),
                base_url: base_url.into(),
                web_search: false,
            },
        );
        StrategyService::new(cache, gemini)
    }

    #[test]
    fn test_normalize() {
        let mut data = StrategyData {
            summary: " s ".into(),
            early_game: vec!["  a ".into(), "".into(), "   ".into()],
            mid_game: vec![],
            late_game: vec!["b".into()],
            matchup_tips: "\ntips\n".into(),
            sources: vec![],
            recommended_creator: Some("   ".into()),
        };
        data.normalize();
        assert_eq!(data.summary, "s");
        assert_eq!(data.early_game, vec!["a"]);
        assert_eq!(data.matchup_tips, "tips");
        assert_eq!(data.recommended_creator, None);
    }

    #[test]
    fn test_strategy_serializes_flat() {
        let strategy = Strategy {
            data: sample_strategy(),
            is_cached: true,
        };
        let json = serde_json::to_value(&strategy).unwrap();
        assert_eq!(json["isCached"], true);
        assert_eq!(json["summary"], "Play around level 6.");
        assert_eq!(json["earlyGame"][1], "Ward river");
        assert_eq!(json["sources"][0]["web"]["uri"], "https://guide.test");
        assert_eq!(json["recommendedCreator"], "OneTrickAhri");
    }

    #[tokio::test]
    async fn test_second_request_is_served_from_cache() {
        let server = MockServer::start().await;
        let text = serde_json::to_string(&sample_strategy()).unwrap();
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(gemini_body(&text, serde_json::json!([]))),
            )
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let service = service(&server.uri(), dir.path());
        let query = MatchupQuery::new("Ahri", "Zed", Role::Mid, Some(""));

        let first = service.get_strategy(&query).await.unwrap();
        assert!(!first.is_cached);

        let second = service.get_strategy(&query).await.unwrap();
        assert!(second.is_cached);
        assert_eq!(second.data, first.data);
    }

    #[tokio::test]
    async fn test_failed_fetch_is_not_cached() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let service = service(&server.uri(), dir.path());
        let query = MatchupQuery::new("Ahri", "Zed", Role::Mid, None);

        assert!(service.get_strategy(&query).await.is_err());
        assert!(service.get_strategy(&query).await.is_err());
    }

    #[tokio::test]
    async fn test_role_change_misses_cache() {
        let server = MockServer::start().await;
        let text = serde_json::to_string(&sample_strategy()).unwrap();
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(gemini_body(&text, serde_json::json!([]))),
            )
            .expect(2)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let service = service(&server.uri(), dir.path());

        let mid = MatchupQuery::new("Ahri", "Zed", Role::Mid, None);
        let jungle = MatchupQuery::new("Ahri", "Zed", Role::Jungle, None);
        assert!(!service.get_strategy(&mid).await.unwrap().is_cached);
        assert!(!service.get_strategy(&jungle).await.unwrap().is_cached);
        assert!(service.get_strategy(&mid).await.unwrap().is_cached);
    }
}
