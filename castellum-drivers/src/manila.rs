//! Reference driver for asset-type `"manila-shares"`: network-attached
//! shares exposing a single usage metric, `bytes_used`, as an absolute byte
//! count against the share's provisioned size (spec §10).

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use castellum_core::{Asset, AssetStatus, Resource};
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

use crate::registry::DriverInfo;
use crate::{AssetTypeDriver, DriverError, ResizeOutcome};

#[derive(Debug, Clone, Deserialize)]
struct ShareSummary {
    id: Uuid,
}

#[derive(Debug, Clone, Deserialize)]
struct ShareListResponse {
    shares: Vec<ShareSummary>,
}

#[derive(Debug, Clone, Deserialize)]
struct ShareDetail {
    size_bytes: u64,
    bytes_used: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct ShareDetailResponse {
    share: ShareDetail,
}

#[derive(Debug, Clone, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// HTTP client against a Manila-shaped share-management API. One instance
/// is shared process-wide through the `DriverRegistry`.
pub struct ManilaDriver {
    base_url: String,
    client: reqwest::Client,
    info: DriverInfo,
}

impl ManilaDriver {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::ClientBuilder::new()
            .timeout(Duration::from_secs(20))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        let info = DriverInfo {
            asset_type: "manila-shares".to_string(),
            usage_metrics: vec!["bytes_used".to_string()],
            reports_absolute_usage: true,
            max_asset_size: None,
            conflicts_with: Vec::new(),
        };

        Self {
            base_url,
            client,
            info,
        }
    }

    fn shares_url(&self, resource: &Resource) -> String {
        format!(
            "{}/v2/{}/shares?all_tenants=0",
            self.base_url, resource.scope_id
        )
    }

    fn share_url(&self, resource: &Resource, asset_uuid: Uuid) -> String {
        format!(
            "{}/v2/{}/shares/{}",
            self.base_url, resource.scope_id, asset_uuid
        )
    }

    fn resize_url(&self, resource: &Resource, asset_uuid: Uuid) -> String {
        format!(
            "{}/v2/{}/shares/{}/action",
            self.base_url, resource.scope_id, asset_uuid
        )
    }

    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<ErrorResponse>().await {
            Ok(body) => body.message,
            Err(_) => format!("HTTP {status}"),
        }
    }
}

#[async_trait]
impl AssetTypeDriver for ManilaDriver {
    fn info(&self) -> &DriverInfo {
        &self.info
    }

    async fn list_assets(&self, resource: &Resource) -> Result<HashSet<Uuid>, DriverError> {
        let url = self.shares_url(resource);
        debug!(%url, "listing manila shares");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                DriverError::Transient(e.to_string())
            } else {
                DriverError::Transient(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(DriverError::Transient(Self::error_message(response).await));
        }

        let body: ShareListResponse = response
            .json()
            .await
            .map_err(|e| DriverError::Transient(format!("invalid share list response: {e}")))?;

        Ok(body.shares.into_iter().map(|s| s.id).collect())
    }

    async fn get_status(
        &self,
        resource: &Resource,
        asset_uuid: Uuid,
    ) -> Result<AssetStatus, DriverError> {
        let url = self.share_url(resource, asset_uuid);
        debug!(%url, "fetching manila share status");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| DriverError::Transient(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(DriverError::Permanent(format!(
                "share {asset_uuid} no longer exists"
            )));
        }
        if !response.status().is_success() {
            return Err(DriverError::Transient(Self::error_message(response).await));
        }

        let body: ShareDetailResponse = response
            .json()
            .await
            .map_err(|e| DriverError::Transient(format!("invalid share detail response: {e}")))?;

        let mut usage = castellum_core::Usage::new();
        usage.insert("bytes_used".to_string(), body.share.bytes_used as f64);

        Ok(AssetStatus {
            size: body.share.size_bytes,
            usage,
            strict_min: Some(body.share.bytes_used),
            strict_max: None,
        })
    }

    async fn set_size(
        &self,
        resource: &Resource,
        asset: &Asset,
        new_size: u64,
    ) -> Result<ResizeOutcome, DriverError> {
        let url = self.resize_url(resource, asset.uuid);
        let action = if new_size >= asset.status.size {
            serde_json::json!({ "extend": { "new_size": new_size } })
        } else {
            serde_json::json!({ "shrink": { "new_size": new_size } })
        };

        let response = self
            .client
            .post(&url)
            .json(&action)
            .send()
            .await
            .map_err(|e| DriverError::Transient(e.to_string()))?;

        if response.status().is_success() {
            return Ok(ResizeOutcome::Succeeded);
        }

        if response.status().is_client_error() {
            let message = Self::error_message(response).await;
            return Ok(ResizeOutcome::Failed { message });
        }

        Err(DriverError::Transient(Self::error_message(response).await))
    }

    async fn check_resource_allowed(&self, _resource: &Resource) -> Result<(), DriverError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use castellum_core::ResourceLogic;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_resource(id: Uuid) -> Resource {
        Resource {
            id,
            scope_id: "project-1".to_string(),
            domain_id: "domain-1".to_string(),
            asset_type: "manila-shares".to_string(),
            config: None,
            logic: ResourceLogic {
                low_thresholds: Default::default(),
                high_thresholds: Default::default(),
                critical_thresholds: Default::default(),
                low_delay_secs: 0,
                high_delay_secs: 0,
                step: castellum_core::StepRule::Single,
                min_size: None,
                max_size: None,
                min_free_size: None,
                min_free_size_is_critical: false,
                low_requires_greenlight: false,
                high_requires_greenlight: false,
            },
            scrape_error_message: None,
            next_scrape_at: chrono::Utc::now(),
            scrape_duration_secs: None,
            seeded: false,
        }
    }

    #[tokio::test]
    async fn list_assets_parses_share_ids() {
        let server = MockServer::start().await;
        let share_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path("/v2/project-1/shares"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "shares": [{ "id": share_id }]
            })))
            .mount(&server)
            .await;

        let driver = ManilaDriver::new(server.uri());
        let resource = test_resource(Uuid::new_v4());
        let assets = driver.list_assets(&resource).await.unwrap();

        assert_eq!(assets.len(), 1);
        assert!(assets.contains(&share_id));
    }

    #[tokio::test]
    async fn get_status_maps_bytes_used_metric() {
        let server = MockServer::start().await;
        let share_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path(format!("/v2/project-1/shares/{share_id}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "share": { "size_bytes": 1024, "bytes_used": 512 }
            })))
            .mount(&server)
            .await;

        let driver = ManilaDriver::new(server.uri());
        let resource = test_resource(Uuid::new_v4());
        let status = driver.get_status(&resource, share_id).await.unwrap();

        assert_eq!(status.size, 1024);
        assert_eq!(status.usage.get("bytes_used"), Some(&512.0));
    }

    #[tokio::test]
    async fn get_status_missing_share_is_permanent() {
        let server = MockServer::start().await;
        let share_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path(format!("/v2/project-1/shares/{share_id}")))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let driver = ManilaDriver::new(server.uri());
        let resource = test_resource(Uuid::new_v4());
        let err = driver.get_status(&resource, share_id).await.unwrap_err();

        assert!(matches!(err, DriverError::Permanent(_)));
    }

    #[tokio::test]
    async fn set_size_client_rejection_is_failed_outcome() {
        let server = MockServer::start().await;
        let share_id = Uuid::new_v4();
        Mock::given(method("POST"))
            .and(path(format!("/v2/project-1/shares/{share_id}/action")))
            .respond_with(ResponseTemplate::new(422).set_body_json(serde_json::json!({
                "message": "quota exceeded"
            })))
            .mount(&server)
            .await;

        let driver = ManilaDriver::new(server.uri());
        let resource = test_resource(Uuid::new_v4());
        let asset = Asset {
            id: Uuid::new_v4(),
            resource_id: resource.id,
            uuid: share_id,
            status: AssetStatus {
                size: 1024,
                usage: Default::default(),
                strict_min: None,
                strict_max: None,
            },
            expected_size: None,
            resized_at: None,
            scrape_error_message: None,
            next_scrape_at: chrono::Utc::now(),
            scrape_duration_secs: None,
            never_scraped: false,
        };

        let outcome = driver.set_size(&resource, &asset, 2048).await.unwrap();
        match outcome {
            ResizeOutcome::Failed { message } => assert_eq!(message, "quota exceeded"),
            other => panic!("expected Failed outcome, got {other:?}"),
        }
    }
}
