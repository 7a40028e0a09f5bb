//! Seasonal vegetable lookup against the seasonal food guide.

use std::time::Duration;

use chrono::{Datelike, Local, NaiveDate};
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info, instrument};

use localvore_shared::{LocalvoreError, Result, SeasonalConfig};

use crate::engine::USER_AGENT;

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Half-month season slug used by the guide: `early-<month>` through the 15th,
/// `late-<month>` after.
pub fn season_slug(date: NaiveDate) -> String {
    let half = if date.day() <= 15 { "early" } else { "late" };
    format!("{half}-{}", MONTHS[date.month0() as usize])
}

/// State path segment: lower-cased, spaces become `-`.
pub fn state_slug(state: &str) -> String {
    state
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
}

/// Client for the seasonal food guide.
#[derive(Debug, Clone)]
pub struct SeasonalGuide {
    client: Client,
    base_url: String,
}

impl SeasonalGuide {
    pub fn new(config: &SeasonalConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LocalvoreError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Guide page URL for a state and date.
    pub fn url_for(&self, state: &str, date: NaiveDate) -> String {
        format!("{}/{}/{}", self.base_url, state_slug(state), season_slug(date))
    }

    /// Vegetables in season for `state` on `date`, lower-cased and de-duplicated.
    #[instrument(skip_all, fields(state = %state, %date))]
    pub async fn fetch_veggies(&self, state: &str, date: NaiveDate) -> Result<Vec<String>> {
        let url = self.url_for(state, date);
        debug!(%url, "fetching seasonal guide");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| LocalvoreError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(LocalvoreError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| LocalvoreError::Network(format!("{url}: body read failed: {e}")))?;

        let veggies = parse_veggies(&body);
        if veggies.is_empty() {
            return Err(LocalvoreError::validation(format!(
                "no vegetables returned for '{state}', check state spelling"
            )));
        }

        info!(count = veggies.len(), "seasonal veggies fetched");
        Ok(veggies)
    }

    /// Vegetables in season today (local time).
    pub async fn fetch_today(&self, state: &str) -> Result<Vec<String>> {
        self.fetch_veggies(state, Local::now().date_naive()).await
    }
}

/// Vegetable names from a guide page: first non-empty line of each detail card.
///
/// Text nodes are treated as separate lines, so a name never runs into the
/// label of the element after it.
pub fn parse_veggies(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    let card = Selector::parse("#col-veg-detail-card").expect("valid selector");

    let mut veggies: Vec<String> = Vec::new();
    for el in doc.select(&card) {
        let Some(name) = el
            .text()
            .flat_map(str::lines)
            .map(str::trim)
            .find(|l| !l.is_empty())
        else {
            continue;
        };
        let name = name.to_lowercase();
        if !veggies.contains(&name) {
            veggies.push(name);
        }
    }
    veggies
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn fixture() -> String {
        std::fs::read_to_string("../../../fixtures/html/seasonal_tennessee.html")
            .expect("missing fixture: seasonal_tennessee.html")
    }

    fn guide_for(server: &MockServer) -> SeasonalGuide {
        SeasonalGuide::new(&SeasonalConfig {
            base_url: format!("{}/", server.uri()),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn slugs_split_month_on_the_fifteenth() {
        let d = |m, d| NaiveDate::from_ymd_opt(2024, m, d).unwrap();
        assert_eq!(season_slug(d(1, 1)), "early-january");
        assert_eq!(season_slug(d(6, 15)), "early-june");
        assert_eq!(season_slug(d(6, 16)), "late-june");
        assert_eq!(season_slug(d(12, 31)), "late-december");
    }

    #[test]
    fn state_slug_joins_words() {
        assert_eq!(state_slug("New  Mexico "), "new-mexico");
        assert_eq!(state_slug("tennessee"), "tennessee");
    }

    #[test]
    fn parses_fixture_cards() {
        let veggies = parse_veggies(&fixture());
        assert_eq!(veggies, vec!["asparagus", "kale", "spring onions", "strawberries"]);
    }

    #[test]
    fn compact_cards_keep_names_apart_from_labels() {
        let html = r#"<div id="col-veg-detail-card"><h4>Kale</h4><p>In season</p></div><div id="col-veg-detail-card"><a>Asparagus</a><span>Ending soon</span></div>"#;
        assert_eq!(parse_veggies(html), vec!["kale", "asparagus"]);
    }

    #[tokio::test]
    async fn fetches_from_dated_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/new-mexico/early-april"))
            .respond_with(ResponseTemplate::new(200).set_body_string(fixture()))
            .expect(1)
            .mount(&server)
            .await;

        let guide = guide_for(&server);
        let date = NaiveDate::from_ymd_opt(2024, 4, 2).unwrap();
        let veggies = guide.fetch_veggies("New Mexico", date).await.unwrap();
        assert!(veggies.contains(&"kale".to_string()));
    }

    #[tokio::test]
    async fn non_success_is_network_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let guide = guide_for(&server);
        let date = NaiveDate::from_ymd_opt(2024, 4, 20).unwrap();
        let err = guide.fetch_veggies("tennessee", date).await.unwrap_err();
        assert!(matches!(err, LocalvoreError::Network(_)));
    }

    #[tokio::test]
    async fn empty_page_is_validation_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html><body></body></html>"))
            .mount(&server)
            .await;

        let guide = guide_for(&server);
        let date = NaiveDate::from_ymd_opt(2024, 4, 20).unwrap();
        let err = guide.fetch_veggies("tenessee", date).await.unwrap_err();
        assert!(matches!(err, LocalvoreError::Validation { .. }));
        assert!(err.to_string().contains("check state spelling"));
    }
}
