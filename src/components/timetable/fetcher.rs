use super::models::{SourceFormat, SourceKind};
use crate::config::Config;
use crate::error::{config_error, network_error, DashResult, Error};
use crate::utils::time::{default_window, parse_http_date};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use reqwest::header::LAST_MODIFIED;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

/// Inclusive date range requested from the export endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

/// Where the next snapshot should come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceRequest {
    /// Calendar text supplied directly by the user
    File { content: String },
    /// Timetable file served by the host application
    StaticEndpoint,
    /// Remote export keyed by a student or group identifier
    Identifier {
        identifier: String,
        window: Option<DateWindow>,
    },
}

impl SourceRequest {
    pub fn kind(&self) -> SourceKind {
        match self {
            SourceRequest::File { .. } => SourceKind::File,
            SourceRequest::StaticEndpoint => SourceKind::StaticEndpoint,
            SourceRequest::Identifier { .. } => SourceKind::Identifier,
        }
    }
}

/// Raw schedule text together with how to read it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedSource {
    pub body: String,
    pub format: SourceFormat,
    /// Server-declared modification time
    pub last_modified: Option<DateTime<Utc>>,
}

impl FetchedSource {
    /// Wrap uploaded calendar text
    pub fn from_file(content: &str) -> Self {
        Self {
            body: content.to_string(),
            format: SourceFormat::ICalendar,
            last_modified: None,
        }
    }
}

/// Anything that can produce raw schedule text for a request
#[async_trait]
pub trait ScheduleSource: Send + Sync {
    async fn fetch(&self, request: &SourceRequest) -> DashResult<FetchedSource>;
}

/// HTTP-backed schedule source
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    static_url: Url,
    export_url: Option<Url>,
    export_type: String,
    tz: Tz,
}

impl HttpFetcher {
    /// Build a fetcher from the timetable settings in `config`
    pub fn new(config: &Config) -> DashResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| config_error(&format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            static_url: static_url(&config.timetable_base_url, &config.timetable_resource_path)?,
            export_url: config
                .timetable_export_url
                .as_deref()
                .map(|url| {
                    Url::parse(url)
                        .map_err(|e| config_error(&format!("Invalid export URL {}: {}", url, e)))
                })
                .transpose()?,
            export_type: config.timetable_export_type.clone(),
            tz: config.tz()?,
        })
    }

    async fn fetch_static(&self) -> DashResult<FetchedSource> {
        debug!(url = %self.static_url, "Fetching static timetable");

        let response = self
            .client
            .get(self.static_url.clone())
            .send()
            .await
            .map_err(|e| network_error(&format!("Failed to fetch timetable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::NotFound(format!(
                "{} returned HTTP {}",
                self.static_url,
                response.status()
            )));
        }

        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_http_date);

        let body = response
            .text()
            .await
            .map_err(|e| network_error(&format!("Failed to read timetable body: {}", e)))?;

        Ok(FetchedSource {
            body,
            format: SourceFormat::ICalendar,
            last_modified,
        })
    }

    async fn fetch_export(
        &self,
        identifier: &str,
        window: Option<DateWindow>,
    ) -> DashResult<FetchedSource> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(Error::RequestRejected("Identifier must not be empty".to_string()));
        }

        let mut url = self
            .export_url
            .clone()
            .ok_or_else(|| config_error("TIMETABLE_EXPORT_URL is not set"))?;

        let window = window.unwrap_or_else(|| {
            let (from, to) = default_window(Utc::now(), self.tz);
            DateWindow { from, to }
        });

        url.query_pairs_mut()
            .append_pair("identifier", identifier)
            .append_pair("dateFrom", &window.from.format("%Y-%m-%d").to_string())
            .append_pair("dateTo", &window.to.format("%Y-%m-%d").to_string())
            .append_pair("type", &self.export_type);

        info!(identifier, from = %window.from, to = %window.to, "Fetching timetable export");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network_error(&format!("Failed to fetch export: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            return Err(Error::RequestRejected(format!(
                "Export returned HTTP {} - {}",
                status,
                error_body.trim()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| network_error(&format!("Failed to read export body: {}", e)))?;

        Ok(FetchedSource {
            body,
            format: SourceFormat::Tabular,
            last_modified: None,
        })
    }
}

#[async_trait]
impl ScheduleSource for HttpFetcher {
    async fn fetch(&self, request: &SourceRequest) -> DashResult<FetchedSource> {
        match request {
            SourceRequest::File { content } => Ok(FetchedSource::from_file(content)),
            SourceRequest::StaticEndpoint => self.fetch_static().await,
            SourceRequest::Identifier { identifier, window } => {
                self.fetch_export(identifier, *window).await
            }
        }
    }
}

/// Join the resource path onto the base URL, treating the base as a directory
fn static_url(base: &str, resource_path: &str) -> DashResult<Url> {
    let mut base =
        Url::parse(base).map_err(|e| config_error(&format!("Invalid base URL {}: {}", base, e)))?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    base.join(resource_path.trim_start_matches('/'))
        .map_err(|e| config_error(&format!("Invalid resource path {}: {}", resource_path, e)))
}
