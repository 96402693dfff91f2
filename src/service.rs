//! Remote flight logging service.

use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;
use crate::event_log::TrackingEventLogEntry;
use crate::persistence::artifact::RemoteSave;
use crate::processors::landing::LandingReport;
use crate::types::{FuelTanks, PrimaryTracking, TrackingStatus};

/// Periodic progress report
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    pub flight_id: String,
    pub reported_at: DateTime<Utc>,
    pub sim_utc: Option<DateTime<Utc>>,
    pub status: TrackingStatus,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_ft: f64,
    pub radio_height_ft: f64,
    pub heading_true_deg: f64,
    pub ground_speed_kt: f64,
    pub airspeed_true_kt: f64,
    pub vertical_speed_fpm: f64,
    pub on_ground: bool,
    pub fuel_gallons: Option<f64>,
}

impl PositionReport {
    pub fn new(
        flight_id: &str,
        reported_at: DateTime<Utc>,
        status: TrackingStatus,
        primary: &PrimaryTracking,
        fuel: Option<&FuelTanks>,
        sim_utc: Option<DateTime<Utc>>,
    ) -> Self {
        PositionReport {
            flight_id: flight_id.to_string(),
            reported_at,
            sim_utc,
            status,
            latitude: primary.latitude,
            longitude: primary.longitude,
            altitude_ft: primary.altitude_ft,
            radio_height_ft: primary.radio_height_ft,
            heading_true_deg: primary.heading_true_deg,
            ground_speed_kt: primary.ground_speed_kt,
            airspeed_true_kt: primary.airspeed_true_kt,
            vertical_speed_fpm: primary.vertical_speed_fpm,
            on_ground: primary.on_ground,
            fuel_gallons: fuel.map(|f| f.total_gallons()),
        }
    }
}

/// Everything submitted when a flight completes
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub flight_id: String,
    pub completed_at: DateTime<Utc>,
    pub position: Option<PositionReport>,
    pub tracking_started_at: Option<DateTime<Utc>>,
    pub paused_secs: f64,
    pub time_saved_secs: f64,
    pub crashed: bool,
    pub landings: Vec<LandingReport>,
    pub events: Vec<TrackingEventLogEntry>,
    /// Base64 of the final save file
    pub save_base64: String,
}

#[async_trait]
pub trait FlightService: Send + Sync {
    async fn pause_flight(&self, flight_id: &str) -> Result<(), ServiceError>;
    async fn abort_flight(&self, flight_id: &str) -> Result<(), ServiceError>;
    async fn position_report(&self, report: &PositionReport) -> Result<(), ServiceError>;
    async fn upload_auto_save(&self, flight_id: &str, blob: &[u8]) -> Result<(), ServiceError>;
    async fn download_auto_save(&self, flight_id: &str) -> Result<Option<RemoteSave>, ServiceError>;
    async fn complete_flight(&self, report: &FinalReport) -> Result<(), ServiceError>;
}

#[derive(Serialize, Deserialize)]
struct AutoSaveBody {
    saved_at: DateTime<Utc>,
    blob: String,
}

/// JSON-over-HTTP flight service client
///
/// Timeouts and 5xx responses are retried up to three times with a
/// doubling delay; everything else is returned to the caller.
pub struct HttpFlightService {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpFlightService {
    const MAX_ATTEMPTS: u32 = 3;

    pub fn new(base_url: &str, token: Option<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("flight_tracker/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        HttpFlightService {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn url(&self, flight_id: &str, action: &str) -> String {
        format!("{}/flights/{}/{}", self.base_url, flight_id, action)
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<reqwest::Response, ServiceError> {
        let mut last_error = ServiceError::Timeout;
        for attempt in 0..Self::MAX_ATTEMPTS {
            let mut builder = self.request(method.clone(), url);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let error = match builder.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                    return Ok(response)
                }
                Ok(response) => {
                    let code = response.status().as_u16();
                    let text = response.text().await.unwrap_or_default();
                    let error = classify_status(code, &text);
                    if code < 500 {
                        return Err(error);
                    }
                    error
                }
                Err(e) if e.is_timeout() => ServiceError::Timeout,
                Err(e) => return Err(ServiceError::Other(e.to_string())),
            };

            let backoff = 2u64.pow(attempt);
            log::warn!(
                "{} failed on attempt {}/{} ({}), retrying in {}s",
                url,
                attempt + 1,
                Self::MAX_ATTEMPTS,
                error,
                backoff
            );
            last_error = error;
            tokio::time::sleep(Duration::from_secs(backoff)).await;
        }
        Err(last_error)
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &str, body: Option<&B>) -> Result<(), ServiceError> {
        let response = self.send(reqwest::Method::POST, url, body).await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ServiceError::Http(404));
        }
        Ok(())
    }
}

/// Map a non-success status to an error, keeping the server's message
/// for client errors
fn classify_status(code: u16, body: &str) -> ServiceError {
    let message = body.trim();
    if (400..500).contains(&code) && !message.is_empty() {
        ServiceError::Rejected(format!("{}: {}", code, message))
    } else {
        ServiceError::Http(code)
    }
}

#[async_trait]
impl FlightService for HttpFlightService {
    async fn pause_flight(&self, flight_id: &str) -> Result<(), ServiceError> {
        self.post::<()>(&self.url(flight_id, "pause"), None).await
    }

    async fn abort_flight(&self, flight_id: &str) -> Result<(), ServiceError> {
        self.post::<()>(&self.url(flight_id, "abort"), None).await
    }

    async fn position_report(&self, report: &PositionReport) -> Result<(), ServiceError> {
        self.post(&self.url(&report.flight_id, "position"), Some(report)).await
    }

    async fn upload_auto_save(&self, flight_id: &str, blob: &[u8]) -> Result<(), ServiceError> {
        let body = AutoSaveBody { saved_at: Utc::now(), blob: BASE64.encode(blob) };
        self.post(&self.url(flight_id, "autosave"), Some(&body)).await
    }

    async fn download_auto_save(&self, flight_id: &str) -> Result<Option<RemoteSave>, ServiceError> {
        let response = self
            .send::<()>(reqwest::Method::GET, &self.url(flight_id, "autosave"), None)
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: AutoSaveBody = response
            .json()
            .await
            .map_err(|e| ServiceError::Other(format!("Invalid auto-save response: {}", e)))?;
        let blob = BASE64
            .decode(body.blob.as_bytes())
            .map_err(|e| ServiceError::Other(format!("Invalid auto-save blob: {}", e)))?;
        Ok(Some(RemoteSave { saved_at: body.saved_at, blob }))
    }

    async fn complete_flight(&self, report: &FinalReport) -> Result<(), ServiceError> {
        self.post(&self.url(&report.flight_id, "complete"), Some(report)).await
    }
}

/// Service used when no endpoint is configured: logs and succeeds
#[derive(Debug, Default)]
pub struct OfflineFlightService;

#[async_trait]
impl FlightService for OfflineFlightService {
    async fn pause_flight(&self, flight_id: &str) -> Result<(), ServiceError> {
        log::info!("[offline] pause flight {}", flight_id);
        Ok(())
    }

    async fn abort_flight(&self, flight_id: &str) -> Result<(), ServiceError> {
        log::info!("[offline] abort flight {}", flight_id);
        Ok(())
    }

    async fn position_report(&self, report: &PositionReport) -> Result<(), ServiceError> {
        log::debug!(
            "[offline] position {} {:.5},{:.5} {:.0} ft",
            report.flight_id,
            report.latitude,
            report.longitude,
            report.altitude_ft
        );
        Ok(())
    }

    async fn upload_auto_save(&self, flight_id: &str, blob: &[u8]) -> Result<(), ServiceError> {
        log::debug!("[offline] auto-save {} ({} bytes)", flight_id, blob.len());
        Ok(())
    }

    async fn download_auto_save(&self, _flight_id: &str) -> Result<Option<RemoteSave>, ServiceError> {
        Ok(None)
    }

    async fn complete_flight(&self, report: &FinalReport) -> Result<(), ServiceError> {
        log::info!(
            "[offline] complete flight {}: {} landing(s), {} event(s), save {} bytes (base64)",
            report.flight_id,
            report.landings.len(),
            report.events.len(),
            report.save_base64.len()
        );
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_building() {
        let service = HttpFlightService::new("https://example.invalid/api/", None);
        assert_eq!(
            service.url("F-42", "complete"),
            "https://example.invalid/api/flights/F-42/complete"
        );
    }

    #[test]
    fn test_classify_status() {
        assert_eq!(
            classify_status(409, "flight already completed\n"),
            ServiceError::Rejected("409: flight already completed".to_string())
        );
        assert_eq!(classify_status(400, "  "), ServiceError::Http(400));
        assert_eq!(classify_status(503, "busy"), ServiceError::Http(503));
    }

    #[test]
    fn test_position_report_from_snapshot() {
        let primary = PrimaryTracking {
            latitude: 47.1,
            longitude: 8.2,
            altitude_ft: 4500.0,
            ground_speed_kt: 140.0,
            ..Default::default()
        };
        let report = PositionReport::new("F1", Utc::now(), TrackingStatus::Tracking, &primary, None, None);
        assert_eq!(report.latitude, 47.1);
        assert_eq!(report.fuel_gallons, None);
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"status\":\"Tracking\""));
    }

    #[tokio::test]
    async fn test_offline_service_accepts_everything() {
        let service = OfflineFlightService;
        assert!(service.pause_flight("F1").await.is_ok());
        assert!(service.download_auto_save("F1").await.unwrap().is_none());
    }
}
