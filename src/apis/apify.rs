use crate::config::ConfigResolver;
use crate::constants::{APIFY_SOURCE, APIFY_TOKEN_ENV};
use crate::error::{ExtractionError, PipelineError};
use crate::types::{CrawlRequest, PlaceSource, RawPlaceRecord, RawReview};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Google Maps places crawled through an Apify actor.
pub struct ApifyPlaceSource {
    client: reqwest::Client,
    token: String,
    base_url: String,
    actor_id: String,
}

impl ApifyPlaceSource {
    pub fn new(
        token: impl Into<String>,
        base_url: impl Into<String>,
        actor_id: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ExtractionError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            token: token.into(),
            base_url: base_url.into(),
            actor_id: actor_id.into(),
        })
    }

    /// Reads the token from `APIFY_TOKEN` and the endpoint from `apify.*`.
    pub fn from_config(config: &ConfigResolver) -> Result<Self, PipelineError> {
        let token = std::env::var(APIFY_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ExtractionError::MissingCredentials(APIFY_TOKEN_ENV))?;
        let base_url = config.get_str("apify.base_url", None)?;
        let actor_id = config.get_str("apify.actor_id", None)?;
        let timeout = Duration::from_secs(config.get_usize("apify.timeout_seconds", None)? as u64);
        Ok(Self::new(token, base_url, actor_id, timeout)?)
    }

    fn run_url(&self) -> String {
        // Actor ids use '~' in place of '/' inside URL paths
        format!(
            "{}/v2/acts/{}/run-sync-get-dataset-items",
            self.base_url.trim_end_matches('/'),
            self.actor_id.replace('/', "~")
        )
    }
}

#[async_trait::async_trait]
impl PlaceSource for ApifyPlaceSource {
    fn source_name(&self) -> &'static str {
        APIFY_SOURCE
    }

    #[instrument(skip(self), fields(query = %request.query))]
    async fn fetch(&self, request: &CrawlRequest) -> Result<Vec<RawPlaceRecord>, ExtractionError> {
        let run_input = run_input(request);
        debug!("Apify run input: {}", run_input);

        let resp = self
            .client
            .post(self.run_url())
            .bearer_auth(&self.token)
            .json(&run_input)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ExtractionError::Status {
                status: status.as_u16(),
                body: body.chars().take(500).collect(),
            });
        }

        let payload: Value = resp.json().await?;
        let items = payload
            .as_array()
            .ok_or_else(|| ExtractionError::Decode("dataset items are not a JSON array".into()))?;

        if items.is_empty() {
            return Err(ExtractionError::NoResults(request.query.clone()));
        }

        let records: Vec<RawPlaceRecord> = items.iter().map(map_item).collect();
        info!("Fetched {} places from Apify", records.len());
        Ok(records)
    }
}

fn run_input(request: &CrawlRequest) -> Value {
    json!({
        "searchStringsArray": [request.query],
        "maxCrawledPlaces": request.max_crawled_places,
        "maxReviews": request.max_reviews,
        "scrapePlaceDetailPage": request.scrape_place_detail_page,
        "reviewsSort": request.reviews_sort,
    })
}

/// Rename one crawler item into the raw record shape.
pub fn map_item(item: &Value) -> RawPlaceRecord {
    let geometry = item
        .get("placeLocation")
        .filter(|v| !v.is_null())
        .or_else(|| item.get("location").filter(|v| !v.is_null()))
        .cloned();

    let reviews = item
        .get("reviews")
        .and_then(Value::as_array)
        .map(|revs| {
            revs.iter()
                .map(|rev| RawReview {
                    author_name: string_field(rev, "name"),
                    rating: rev.get("stars").filter(|v| !v.is_null()).cloned(),
                    text: string_field(rev, "text"),
                    time: string_field(rev, "publishedAtDate"),
                })
                .collect()
        })
        .unwrap_or_default();

    RawPlaceRecord {
        place_id: item.get("placeId").filter(|v| !v.is_null()).cloned(),
        name: item.get("title").filter(|v| !v.is_null()).cloned(),
        rating: item.get("totalScore").filter(|v| !v.is_null()).cloned(),
        user_ratings_total: item.get("reviewsCount").filter(|v| !v.is_null()).cloned(),
        geometry,
        address: item.get("address").filter(|v| !v.is_null()).cloned(),
        types: item.get("categories").filter(|v| !v.is_null()).cloned(),
        reviews,
    }
}

fn string_field(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}
