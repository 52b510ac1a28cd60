//! `RedbeeClient` - Red Bee exposure API client implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use epgcache_xmltv::ChannelDescriptor;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::instrument;
use url::Url;

use super::types::{ComponentResponse, EpgResponse, ListingResponse};
use super::util::to_programme_record;
use crate::error::UpstreamError;
use crate::source::{ChannelSet, FetchWindow, Guide, GuideSource};

/// Default API root.
pub const DEFAULT_BASE_URL: &str = "https://exposure.api.redbee.live";

/// Default customer segment of the listing path.
const DEFAULT_CUSTOMER: &str = "Nova";

/// Default business unit segment of the listing path.
const DEFAULT_BUSINESS_UNIT: &str = "novatvprod";

/// Default channel listing component id.
const DEFAULT_LISTING_COMPONENT: &str = "63b00b6f-cf6d-4bbb-bca5-c5107029608d";

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of body characters quoted in decode errors.
const BODY_PREVIEW_CHARS: usize = 200;

/// Red Bee exposure API client.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct RedbeeClient {
    /// HTTP client (reqwest, gzip enabled, bounded timeout).
    http_client: Client,
    /// API root.
    base_url: Url,
    /// Path of the channel listing component.
    listing_path: String,
}

/// Builder for `RedbeeClient`.
#[derive(Debug)]
#[allow(clippy::module_name_repetitions)]
pub struct RedbeeClientBuilder {
    base_url: Option<Url>,
    user_agent: Option<String>,
    timeout: Option<Duration>,
    customer: Option<String>,
    business_unit: Option<String>,
    listing_component: Option<String>,
}

impl RedbeeClientBuilder {
    /// Creates a new builder.
    const fn new() -> Self {
        Self {
            base_url: None,
            user_agent: None,
            timeout: None,
            customer: None,
            business_unit: None,
            listing_component: None,
        }
    }

    /// Overrides the API root (for wiremock in tests).
    #[must_use]
    pub fn base_url(mut self, url: Url) -> Self {
        self.base_url = Some(url);
        self
    }

    /// Sets the User-Agent (required).
    #[must_use]
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Sets the per-request timeout (default: 30s).
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the customer (default: `Nova`).
    #[must_use]
    pub fn customer(mut self, customer: impl Into<String>) -> Self {
        self.customer = Some(customer.into());
        self
    }

    /// Sets the business unit (default: `novatvprod`).
    #[must_use]
    pub fn business_unit(mut self, business_unit: impl Into<String>) -> Self {
        self.business_unit = Some(business_unit.into());
        self
    }

    /// Sets the channel listing component id.
    #[must_use]
    pub fn listing_component(mut self, id: impl Into<String>) -> Self {
        self.listing_component = Some(id.into());
        self
    }

    /// Builds the client.
    ///
    /// # Errors
    ///
    /// - `user_agent` is not set.
    /// - `reqwest::Client` build fails.
    pub fn build(self) -> Result<RedbeeClient> {
        let user_agent = self.user_agent.context("user_agent is required")?;

        let base_url = if let Some(url) = self.base_url {
            url
        } else {
            Url::parse(DEFAULT_BASE_URL).context("invalid default base URL")?
        };

        let listing_path = format!(
            "/api/internal/customer/{}/businessunit/{}/component/{}",
            self.customer.as_deref().unwrap_or(DEFAULT_CUSTOMER),
            self.business_unit.as_deref().unwrap_or(DEFAULT_BUSINESS_UNIT),
            self.listing_component
                .as_deref()
                .unwrap_or(DEFAULT_LISTING_COMPONENT),
        );

        let http_client = Client::builder()
            .user_agent(&user_agent)
            .gzip(true)
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .context("failed to build HTTP client")?;

        Ok(RedbeeClient {
            http_client,
            base_url,
            listing_path,
        })
    }
}

/// Returns `true` for HTTP statuses worth retrying.
fn is_transient_status(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
}

/// Classifies a failed `send()`.
///
/// Timeouts, refused/reset connections and interrupted bodies are transient;
/// requests that could not even be built, or redirect loops, are permanent.
fn classify_send_error(url: &Url, err: reqwest::Error) -> UpstreamError {
    if err.is_builder() || err.is_redirect() {
        UpstreamError::permanent(format!("GET {url} could not be sent"), Some(Box::new(err)))
    } else if err.is_timeout() {
        UpstreamError::transient(format!("GET {url} timed out"), Some(Box::new(err)))
    } else {
        UpstreamError::transient(format!("GET {url} failed"), Some(Box::new(err)))
    }
}

impl RedbeeClient {
    /// Creates a new builder.
    #[must_use]
    pub const fn builder() -> RedbeeClientBuilder {
        RedbeeClientBuilder::new()
    }

    /// Resolves an API path (as returned in `internalUrl`) against the root.
    fn resolve(&self, path: &str) -> Result<Url, UpstreamError> {
        let joined = format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|e| {
            UpstreamError::permanent(format!("invalid API URL: {joined}"), Some(Box::new(e)))
        })
    }

    /// Builds a JSON decode error message with a preview of the body.
    fn json_decode_error(url: &Url, body: &str) -> String {
        let preview: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
        format!(
            "JSON decoding failed for {url} (len={}): {preview}",
            body.len()
        )
    }

    /// Sends a GET request and decodes the JSON body.
    async fn get_json<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<T, UpstreamError> {
        tracing::debug!(%url, "Red Bee API request");

        let response = self
            .http_client
            .get(url.clone())
            .query(query)
            .send()
            .await
            .map_err(|e| classify_send_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("GET {url} returned HTTP {status}");
            return Err(if is_transient_status(status) {
                UpstreamError::transient(message, None)
            } else {
                UpstreamError::permanent(message, None)
            });
        }

        let body = response.text().await.map_err(|e| {
            UpstreamError::transient(format!("failed to read body of {url}"), Some(Box::new(e)))
        })?;
        tracing::debug!(%url, body_len = body.len(), "Response body received");

        serde_json::from_str(&body).map_err(|e| {
            UpstreamError::permanent(Self::json_decode_error(&url, &body), Some(Box::new(e)))
        })
    }

    /// Fetches the channel listing component.
    async fn fetch_listing(&self) -> Result<ListingResponse, UpstreamError> {
        let url = self.resolve(&self.listing_path)?;
        self.get_json(url, &[("deviceGroup", "web")]).await
    }
}

impl GuideSource for RedbeeClient {
    #[instrument(skip_all)]
    async fn fetch(
        &self,
        channels: &ChannelSet,
        window: &FetchWindow,
    ) -> Result<Guide, UpstreamError> {
        let listing = self.fetch_listing().await?;
        let mut guide = Guide::default();

        for entry in listing.channels {
            let info = entry.channel;
            let Some(slug) = info.slugs.first().cloned() else {
                tracing::warn!(title = %info.title, "Listed channel has no slug, skipping");
                continue;
            };
            if !channels.includes(&slug) {
                continue;
            }

            guide.channels.push(ChannelDescriptor {
                id: slug.clone(),
                display_name: info.title.clone(),
                icon: info.images.iter().find_map(|i| i.url.clone()),
            });

            let Some(action) = info.action else {
                tracing::warn!(channel = %slug, "No component link for channel");
                continue;
            };
            let component: ComponentResponse =
                self.get_json(self.resolve(&action.internal_url)?, &[]).await?;
            let Some(epg_path) = component.epg_url() else {
                tracing::warn!(channel = %slug, "No EPG URL for channel");
                continue;
            };
            let epg: EpgResponse = self.get_json(self.resolve(epg_path)?, &[]).await?;

            let before = guide.programmes.len();
            for asset in epg.assets {
                match to_programme_record(&slug, asset) {
                    // Invalid spans are kept so the transformer reports them.
                    Ok(record)
                        if !record.has_valid_span()
                            || window.overlaps(record.start, record.end) =>
                    {
                        guide.programmes.push(record);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(channel = %slug, error = %e, "Skipping undecodable asset");
                        guide.skipped_assets = guide.skipped_assets.saturating_add(1);
                    }
                }
            }
            tracing::debug!(
                channel = %slug,
                programmes = guide.programmes.len().saturating_sub(before),
                "Channel EPG fetched"
            );
        }

        for wanted in channels.selected() {
            if !guide.channels.iter().any(|c| &c.id == wanted) {
                tracing::warn!(channel = %wanted, "Selected channel not present in listing");
            }
        }

        tracing::info!(
            channels = guide.channels.len(),
            programmes = guide.programmes.len(),
            skipped_assets = guide.skipped_assets,
            "Guide fetched"
        );
        Ok(guide)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::indexing_slicing)]

    use chrono::{TimeDelta, TimeZone, Utc};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const LISTING_PATH: &str = "/api/internal/customer/Nova/businessunit/novatvprod/component/63b00b6f-cf6d-4bbb-bca5-c5107029608d";

    fn client_for(server: &MockServer) -> RedbeeClient {
        RedbeeClient::builder()
            .base_url(server.uri().parse().unwrap())
            .user_agent("test/0.0.0")
            .timeout(Duration::from_millis(500))
            .build()
            .unwrap()
    }

    async fn mount_json(server: &MockServer, at: &str, body: &str) {
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "application/json")
                    .set_body_string(body),
            )
            .mount(server)
            .await;
    }

    async fn mount_full_guide(server: &MockServer) {
        mount_json(
            server,
            LISTING_PATH,
            include_str!("../../../../fixtures/redbee/listing.json"),
        )
        .await;
        mount_json(
            server,
            "/api/internal/component/channel-nova",
            include_str!("../../../../fixtures/redbee/component_nova.json"),
        )
        .await;
        mount_json(
            server,
            "/api/internal/component/channel-doma",
            include_str!("../../../../fixtures/redbee/component_doma.json"),
        )
        .await;
        mount_json(
            server,
            "/api/internal/component/channel-cinema",
            include_str!("../../../../fixtures/redbee/component_cinema.json"),
        )
        .await;
        mount_json(
            server,
            "/api/internal/epg/nova-tv",
            include_str!("../../../../fixtures/redbee/epg_nova.json"),
        )
        .await;
        mount_json(
            server,
            "/api/internal/epg/nova-cinema",
            include_str!("../../../../fixtures/redbee/epg_cinema.json"),
        )
        .await;
    }

    #[test]
    fn test_builder_requires_user_agent() {
        // Arrange & Act
        let result = RedbeeClient::builder().build();

        // Assert
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("user_agent is required")
        );
    }

    #[test]
    fn test_builder_default_listing_path() {
        // Arrange & Act
        let client = RedbeeClient::builder()
            .user_agent("test/0.0.0")
            .build()
            .unwrap();

        // Assert
        assert_eq!(client.base_url.as_str(), "https://exposure.api.redbee.live/");
        assert_eq!(client.listing_path, LISTING_PATH);
    }

    #[test]
    fn test_builder_custom_listing_path() {
        // Arrange & Act
        let client = RedbeeClient::builder()
            .user_agent("test/0.0.0")
            .customer("Acme")
            .business_unit("acmeprod")
            .listing_component("abc")
            .build()
            .unwrap();

        // Assert
        assert_eq!(
            client.listing_path,
            "/api/internal/customer/Acme/businessunit/acmeprod/component/abc"
        );
    }

    #[test]
    fn test_resolve_keeps_query_string() {
        // Arrange
        let client = RedbeeClient::builder()
            .base_url(Url::parse("http://localhost:8080/").unwrap())
            .user_agent("test/0.0.0")
            .build()
            .unwrap();

        // Act
        let url = client.resolve("/api/internal/epg/x?from=1").unwrap();

        // Assert
        assert_eq!(url.as_str(), "http://localhost:8080/api/internal/epg/x?from=1");
    }

    #[test]
    fn test_transient_statuses() {
        // Arrange & Act & Assert
        assert!(is_transient_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::REQUEST_TIMEOUT));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
    }

    #[tokio::test]
    async fn test_fetch_full_guide() {
        // Arrange
        let server = MockServer::start().await;
        mount_full_guide(&server).await;
        let client = client_for(&server);

        // Act
        let guide = client
            .fetch(&ChannelSet::all(), &FetchWindow::unbounded())
            .await
            .unwrap();

        // Assert
        let ids: Vec<&str> = guide.channels.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["nova-tv", "doma", "nova-cinema"]);
        assert_eq!(guide.channels[0].display_name, "Nova TV");
        assert_eq!(
            guide.channels[0].icon.as_deref(),
            Some("https://img.example/nova.png")
        );
        assert_eq!(guide.channels[1].icon, None);

        // 3 decodable nova assets (one with an inverted span) + 1 cinema asset.
        assert_eq!(guide.programmes.len(), 4);
        assert_eq!(guide.skipped_assets, 1);
        let family = guide
            .programmes
            .iter()
            .find(|p| p.title == "Family Matters")
            .unwrap();
        assert_eq!(family.season, Some(3));
        assert_eq!(family.episode, Some(7));
        let movie = guide
            .programmes
            .iter()
            .find(|p| p.channel_id == "nova-cinema")
            .unwrap();
        assert_eq!(movie.description, "");
    }

    #[tokio::test]
    async fn test_listing_sends_device_group() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LISTING_PATH))
            .and(query_param("deviceGroup", "web"))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"channels": []}"#))
            .expect(1)
            .mount(&server)
            .await;
        let client = client_for(&server);

        // Act
        let guide = client
            .fetch(&ChannelSet::all(), &FetchWindow::unbounded())
            .await
            .unwrap();

        // Assert
        assert!(guide.channels.is_empty());
    }

    #[tokio::test]
    async fn test_fetch_only_selected_channels() {
        // Arrange
        let server = MockServer::start().await;
        mount_full_guide(&server).await;
        Mock::given(method("GET"))
            .and(path("/api/internal/component/channel-nova"))
            .respond_with(ResponseTemplate::new(500))
            .with_priority(1)
            .expect(0)
            .mount(&server)
            .await;
        let client = client_for(&server);

        // Act
        let guide = client
            .fetch(
                &ChannelSet::only(["nova-cinema", "doma"]),
                &FetchWindow::unbounded(),
            )
            .await
            .unwrap();

        // Assert
        let ids: Vec<&str> = guide.channels.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["doma", "nova-cinema"]);
        assert_eq!(guide.programmes.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_applies_window() {
        // Arrange
        let server = MockServer::start().await;
        mount_full_guide(&server).await;
        let client = client_for(&server);
        let noon = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let window = FetchWindow::around(noon, Some(TimeDelta::hours(1)), None);

        // Act
        let guide = client.fetch(&ChannelSet::all(), &window).await.unwrap();

        // Assert
        let titles: Vec<&str> = guide.programmes.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Evening News", "Broken Slot", "Late Movie"]);
    }

    #[tokio::test]
    async fn test_inverted_span_outside_window_reaches_transform() {
        // Arrange
        let server = MockServer::start().await;
        mount_full_guide(&server).await;
        let client = client_for(&server);
        let noon = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let window =
            FetchWindow::around(noon, Some(TimeDelta::hours(1)), Some(TimeDelta::hours(2)));

        // Act
        let guide = client
            .fetch(&ChannelSet::only(["nova-tv"]), &window)
            .await
            .unwrap();
        let (document, report) = epgcache_xmltv::transform(guide.programmes, &guide.channels);

        // Assert
        assert_eq!(report.malformed_count(), 1);
        assert_eq!(report.accepted, 0);
        assert_eq!(document.channels().len(), 1);
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LISTING_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        let client = client_for(&server);

        // Act
        let err = client
            .fetch(&ChannelSet::all(), &FetchWindow::unbounded())
            .await
            .unwrap_err();

        // Assert
        assert!(err.is_transient());
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_rate_limited_is_transient() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        let client = client_for(&server);

        // Act
        let err = client
            .fetch(&ChannelSet::all(), &FetchWindow::unbounded())
            .await
            .unwrap_err();

        // Assert
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_client_error_is_permanent() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LISTING_PATH))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let client = client_for(&server);

        // Act
        let err = client
            .fetch(&ChannelSet::all(), &FetchWindow::unbounded())
            .await
            .unwrap_err();

        // Assert
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_invalid_json_is_permanent() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LISTING_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
            .mount(&server)
            .await;
        let client = client_for(&server);

        // Act
        let err = client
            .fetch(&ChannelSet::all(), &FetchWindow::unbounded())
            .await
            .unwrap_err();

        // Assert
        assert!(!err.is_transient());
        assert!(err.to_string().contains("maintenance"));
    }

    #[tokio::test]
    async fn test_timeout_is_transient() {
        // Arrange
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LISTING_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"channels": []}"#)
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;
        let client = client_for(&server);

        // Act
        let err = client
            .fetch(&ChannelSet::all(), &FetchWindow::unbounded())
            .await
            .unwrap_err();

        // Assert
        assert!(err.is_transient());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn test_epg_failure_aborts_fetch() {
        // Arrange
        let server = MockServer::start().await;
        mount_json(
            &server,
            LISTING_PATH,
            include_str!("../../../../fixtures/redbee/listing.json"),
        )
        .await;
        mount_json(
            &server,
            "/api/internal/component/channel-nova",
            include_str!("../../../../fixtures/redbee/component_nova.json"),
        )
        .await;
        Mock::given(method("GET"))
            .and(path("/api/internal/epg/nova-tv"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;
        let client = client_for(&server);

        // Act
        let result = client
            .fetch(&ChannelSet::only(["nova-tv"]), &FetchWindow::unbounded())
            .await;

        // Assert
        assert!(result.unwrap_err().is_transient());
    }
}
