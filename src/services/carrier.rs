//! Shipping carrier client
//!
//! Thin wrapper around the carrier's REST API: client-credentials token,
//! order registration and order lookup. A bearer token is fetched for every
//! operation; nothing is cached here.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::CarrierConfig;
use crate::error::ProviderError;

const PROVIDER: &str = "carrier";

#[async_trait]
pub trait Carrier: Send + Sync {
    /// OAuth client-credentials grant
    async fn access_token(&self) -> Result<String, ProviderError>;

    /// Register a shipment. A response without an entity uuid is a rejection.
    async fn create_order(
        &self,
        request: &CarrierOrderRequest,
        token: &str,
    ) -> Result<CreatedOrder, ProviderError>;

    async fn get_order(&self, entity_uuid: &str, token: &str)
        -> Result<CarrierOrderInfo, ProviderError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierOrderRequest {
    /// Our order id, echoed back by the carrier
    pub number: String,
    pub tariff_code: u32,
    pub sender: CarrierContact,
    pub recipient: CarrierContact,
    pub from_location: CarrierLocation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to_location: Option<CarrierLocation>,
    /// Pickup point code for door-to-office tariffs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_point: Option<String>,
    pub packages: Vec<CarrierPackage>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierContact {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company: Option<String>,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub phones: Vec<CarrierPhone>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierPhone {
    pub number: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    pub address: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarrierPackage {
    pub number: String,
    /// Grams
    pub weight: u32,
    /// Centimetres
    pub length: u32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedOrder {
    pub entity_uuid: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierOrderInfo {
    pub tracking_number: Option<String>,
    /// Status codes, most recent first
    pub statuses: Vec<String>,
}

impl CarrierOrderInfo {
    pub fn latest_status(&self) -> Option<&str> {
        self.statuses.first().map(String::as_str)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EntityEnvelope<T> {
    entity: Option<T>,
    #[serde(default)]
    requests: Vec<RequestState>,
}

#[derive(Debug, Deserialize)]
struct RequestState {
    #[serde(default)]
    state: String,
    #[serde(default)]
    errors: Vec<RequestError>,
}

#[derive(Debug, Deserialize)]
struct RequestError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct EntityRef {
    #[serde(default)]
    uuid: String,
}

#[derive(Debug, Deserialize)]
struct OrderEntity {
    cdek_number: Option<String>,
    #[serde(default)]
    statuses: Vec<StatusEntry>,
}

#[derive(Debug, Deserialize)]
struct StatusEntry {
    code: String,
}

/// HTTP implementation of [`Carrier`]
#[derive(Clone)]
pub struct CarrierClient {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl CarrierClient {
    pub fn new(config: &CarrierConfig) -> Result<Self, ProviderError> {
        Self::with_timeout(
            config.base_url.clone(),
            config.client_id.clone(),
            config.client_secret.clone(),
            config.timeout,
        )
    }

    pub fn with_timeout(
        base_url: String,
        client_id: String,
        client_secret: String,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER,
                source,
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
        })
    }

    async fn read_body<T>(response: reqwest::Response) -> Result<T, ProviderError>
    where
        T: serde::de::DeserializeOwned,
    {
        let status = response.status();
        let body = response.text().await.map_err(|source| ProviderError::Transport {
            provider: PROVIDER,
            source,
        })?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ProviderError::malformed(PROVIDER, e.to_string()))
    }
}

fn describe_errors(requests: &[RequestState]) -> String {
    let errors: Vec<String> = requests
        .iter()
        .flat_map(|r| r.errors.iter())
        .map(|e| format!("{}: {}", e.code, e.message))
        .collect();

    if errors.is_empty() {
        let states: Vec<&str> = requests.iter().map(|r| r.state.as_str()).collect();
        format!("no entity returned (request states: {:?})", states)
    } else {
        errors.join("; ")
    }
}

#[async_trait]
impl Carrier for CarrierClient {
    async fn access_token(&self) -> Result<String, ProviderError> {
        let url = format!("{}/oauth/token", self.base_url);

        let response = self
            .client
            .post(&url)
            .query(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER,
                source,
            })?;

        let token: TokenResponse = Self::read_body(response).await?;

        token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProviderError::malformed(PROVIDER, "token response without access_token"))
    }

    async fn create_order(
        &self,
        request: &CarrierOrderRequest,
        token: &str,
    ) -> Result<CreatedOrder, ProviderError> {
        let url = format!("{}/orders", self.base_url);

        tracing::debug!(number = %request.number, tariff_code = request.tariff_code, "Registering carrier order");

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(request)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER,
                source,
            })?;

        let envelope: EntityEnvelope<EntityRef> = Self::read_body(response).await?;

        match envelope.entity {
            Some(entity) if !entity.uuid.is_empty() => Ok(CreatedOrder {
                entity_uuid: entity.uuid,
            }),
            _ => Err(ProviderError::rejected(PROVIDER, describe_errors(&envelope.requests))),
        }
    }

    async fn get_order(
        &self,
        entity_uuid: &str,
        token: &str,
    ) -> Result<CarrierOrderInfo, ProviderError> {
        let url = format!("{}/orders/{}", self.base_url, entity_uuid);

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER,
                source,
            })?;

        let envelope: EntityEnvelope<OrderEntity> = Self::read_body(response).await?;
        let entity = envelope
            .entity
            .ok_or_else(|| ProviderError::malformed(PROVIDER, describe_errors(&envelope.requests)))?;

        Ok(CarrierOrderInfo {
            tracking_number: entity.cdek_number.filter(|n| !n.is_empty()),
            statuses: entity.statuses.into_iter().map(|s| s.code).collect(),
        })
    }
}
