//! Payment gateway client
//!
//! REST/JSON acquiring API with credentials passed in the query string.
//! Two-stage payments: the order is registered as a pre-authorization and the
//! customer is sent to the hosted payment page returned by the gateway.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};

use crate::config::GatewayConfig;
use crate::error::ProviderError;

const PROVIDER: &str = "payment gateway";

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn register_pre_auth(&self, request: &PreAuthRequest)
        -> Result<PreAuthResponse, ProviderError>;

    async fn order_status(&self, gateway_order_id: &str) -> Result<GatewayOrderStatus, ProviderError>;

    /// Returns the gateway's error code verbatim; interpreting it is up to the
    /// caller.
    async fn reverse(&self, gateway_order_id: &str) -> Result<ReversalResponse, ProviderError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreAuthRequest {
    /// Merchant order reference, unique per payment attempt
    pub order_ref: String,
    pub amount: Decimal,
    pub return_url: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreAuthResponse {
    pub gateway_order_id: String,
    pub form_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOrderStatus {
    /// 0 means the authorization went through
    pub action_code: i32,
    pub bank_status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversalResponse {
    pub error_code: String,
    pub error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterResponse {
    order_id: Option<String>,
    form_url: Option<String>,
    #[serde(default, deserialize_with = "code_string")]
    error_code: Option<String>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatusExtendedResponse {
    action_code: Option<i32>,
    #[serde(default, deserialize_with = "code_string")]
    order_status: Option<String>,
    #[serde(default, deserialize_with = "code_string")]
    error_code: Option<String>,
    error_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReverseResponse {
    #[serde(default, deserialize_with = "code_string")]
    error_code: Option<String>,
    error_message: Option<String>,
}

/// The gateway sends codes as either JSON strings or numbers
fn code_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn is_error(code: &Option<String>) -> bool {
    matches!(code.as_deref(), Some(c) if c != "0")
}

/// Amount in minor currency units, as the gateway expects
pub fn to_minor_units(amount: Decimal) -> Option<i64> {
    (amount * Decimal::ONE_HUNDRED).round().to_i64()
}

/// HTTP implementation of [`PaymentGateway`]
#[derive(Clone)]
pub struct PaymentGatewayClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
}

impl PaymentGatewayClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, ProviderError> {
        Self::with_timeout(
            config.base_url.clone(),
            config.username.clone(),
            config.password.clone(),
            config.timeout,
        )
    }

    pub fn with_timeout(
        base_url: String,
        username: String,
        password: String,
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
            username,
            password,
        })
    }

    async fn call<T>(&self, method: &str, params: &[(&str, &str)]) -> Result<T, ProviderError>
    where
        T: serde::de::DeserializeOwned,
    {
        let url = format!("{}/{}", self.base_url, method);

        let response = self
            .client
            .post(&url)
            .query(&[("userName", self.username.as_str()), ("password", self.password.as_str())])
            .query(params)
            .send()
            .await
            .map_err(|source| ProviderError::Transport {
                provider: PROVIDER,
                source,
            })?;

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

#[async_trait]
impl PaymentGateway for PaymentGatewayClient {
    async fn register_pre_auth(
        &self,
        request: &PreAuthRequest,
    ) -> Result<PreAuthResponse, ProviderError> {
        let amount = to_minor_units(request.amount)
            .ok_or_else(|| ProviderError::rejected(PROVIDER, format!("amount {} out of range", request.amount)))?
            .to_string();

        let response: RegisterResponse = self
            .call(
                "registerPreAuth.do",
                &[
                    ("orderNumber", request.order_ref.as_str()),
                    ("amount", amount.as_str()),
                    ("returnUrl", request.return_url.as_str()),
                    ("description", request.description.as_str()),
                ],
            )
            .await?;

        if is_error(&response.error_code) {
            return Err(ProviderError::rejected(
                PROVIDER,
                format!(
                    "errorCode {}: {}",
                    response.error_code.unwrap_or_default(),
                    response.error_message.unwrap_or_default()
                ),
            ));
        }

        match (response.order_id, response.form_url) {
            (Some(gateway_order_id), Some(form_url))
                if !gateway_order_id.is_empty() && !form_url.is_empty() =>
            {
                Ok(PreAuthResponse {
                    gateway_order_id,
                    form_url,
                })
            }
            _ => Err(ProviderError::malformed(PROVIDER, "registration without orderId or formUrl")),
        }
    }

    async fn order_status(&self, gateway_order_id: &str) -> Result<GatewayOrderStatus, ProviderError> {
        let response: StatusExtendedResponse = self
            .call("getOrderStatusExtended.do", &[("orderId", gateway_order_id)])
            .await?;

        if is_error(&response.error_code) {
            return Err(ProviderError::rejected(
                PROVIDER,
                format!(
                    "errorCode {}: {}",
                    response.error_code.unwrap_or_default(),
                    response.error_message.unwrap_or_default()
                ),
            ));
        }

        let action_code = response
            .action_code
            .ok_or_else(|| ProviderError::malformed(PROVIDER, "status without actionCode"))?;

        Ok(GatewayOrderStatus {
            action_code,
            bank_status: response.order_status,
        })
    }

    async fn reverse(&self, gateway_order_id: &str) -> Result<ReversalResponse, ProviderError> {
        let response: ReverseResponse = self
            .call("reverse.do", &[("orderId", gateway_order_id)])
            .await?;

        Ok(ReversalResponse {
            error_code: response.error_code.unwrap_or_else(|| "0".to_string()),
            error_message: response.error_message,
        })
    }
}
