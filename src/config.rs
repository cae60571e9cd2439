//! Process configuration loaded once from the environment
//!
//! Everything the engine needs (database, provider credentials, provider
//! magic codes, scheduler sizing) lives in [`AppConfig`] and is handed to the
//! components that need it at construction time.

use std::env;
use std::time::Duration;

use crate::error::ConfigError;

const ENV_DATABASE_URL: &str = "DATABASE_URL";
const ENV_BIND_ADDR: &str = "BIND_ADDR";
const ENV_STORE_TIMEOUT: &str = "STORE_TIMEOUT_SECS";
const ENV_NOTIFIER_URL: &str = "NOTIFIER_URL";

const ENV_RECONCILE_INTERVAL: &str = "RECONCILE_INTERVAL_SECS";
const ENV_RECONCILE_WORKERS: &str = "RECONCILE_WORKERS";

const ENV_GATEWAY_URL: &str = "PAYMENT_GATEWAY_URL";
const ENV_GATEWAY_USER: &str = "PAYMENT_GATEWAY_USER";
const ENV_GATEWAY_PASSWORD: &str = "PAYMENT_GATEWAY_PASSWORD";
const ENV_GATEWAY_RETURN_URL: &str = "PAYMENT_RETURN_URL";
const ENV_GATEWAY_TIMEOUT: &str = "PAYMENT_GATEWAY_TIMEOUT_SECS";
const ENV_REVERSAL_OK_CODES: &str = "PAYMENT_REVERSAL_OK_CODES";

const ENV_CARRIER_URL: &str = "CARRIER_URL";
const ENV_CARRIER_CLIENT_ID: &str = "CARRIER_CLIENT_ID";
const ENV_CARRIER_SECRET: &str = "CARRIER_CLIENT_SECRET";
const ENV_CARRIER_TIMEOUT: &str = "CARRIER_TIMEOUT_SECS";
const ENV_CARRIER_DELIVERED_CODE: &str = "CARRIER_DELIVERED_CODE";
const ENV_TARIFF_DOOR_TO_DOOR: &str = "CARRIER_TARIFF_DOOR_TO_DOOR";
const ENV_TARIFF_DOOR_TO_OFFICE: &str = "CARRIER_TARIFF_DOOR_TO_OFFICE";
const ENV_SENDER_COMPANY: &str = "CARRIER_SENDER_COMPANY";
const ENV_SENDER_NAME: &str = "CARRIER_SENDER_NAME";
const ENV_SENDER_PHONE: &str = "CARRIER_SENDER_PHONE";
const ENV_SENDER_CITY_CODE: &str = "CARRIER_SENDER_CITY_CODE";
const ENV_SENDER_ADDRESS: &str = "CARRIER_SENDER_ADDRESS";
const ENV_ITEM_WEIGHT: &str = "PACKAGE_ITEM_WEIGHT_GRAMS";
const ENV_ITEM_LENGTH: &str = "PACKAGE_ITEM_LENGTH_CM";
const ENV_ITEM_WIDTH: &str = "PACKAGE_ITEM_WIDTH_CM";
const ENV_ITEM_HEIGHT: &str = "PACKAGE_ITEM_HEIGHT_CM";

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_STORE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 5;
const DEFAULT_RECONCILE_WORKERS: usize = 60;
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_REVERSAL_OK_CODES: &str = "6,7";
const DEFAULT_DELIVERED_CODE: &str = "4";
const DEFAULT_TARIFF_DOOR_TO_DOOR: u32 = 139;
const DEFAULT_TARIFF_DOOR_TO_OFFICE: u32 = 138;
const DEFAULT_SENDER_CITY_CODE: i32 = 44;
const DEFAULT_ITEM_WEIGHT_GRAMS: u32 = 900;
const DEFAULT_ITEM_LENGTH_CM: u32 = 32;
const DEFAULT_ITEM_WIDTH_CM: u32 = 32;
const DEFAULT_ITEM_HEIGHT_CM: u32 = 4;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,
    /// Deadline applied to every store round-trip
    pub store_timeout: Duration,
    /// Mail service endpoint; notifications are only logged when unset
    pub notifier_url: Option<String>,
    pub scheduler: SchedulerConfig,
    pub gateway: GatewayConfig,
    pub carrier: CarrierConfig,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    /// Workers per reconciler
    pub workers: usize,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub return_url: String,
    pub timeout: Duration,
    /// Reversal error codes that count as "reversed" or "already reversed"
    pub reversal_ok_codes: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CarrierConfig {
    pub base_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub timeout: Duration,
    /// Carrier status code meaning the parcel reached the recipient
    pub delivered_code: String,
    pub tariffs: TariffCodes,
    pub sender: SenderConfig,
    pub package: PackageSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TariffCodes {
    pub door_to_door: u32,
    pub door_to_office: u32,
}

#[derive(Debug, Clone)]
pub struct SenderConfig {
    pub company: String,
    pub name: String,
    pub phone: String,
    pub city_code: i32,
    pub address: String,
}

/// Physical dimensions of one printed item, packed one per parcel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageSpec {
    pub item_weight_grams: u32,
    pub length_cm: u32,
    pub width_cm: u32,
    pub height_cm: u32,
}

impl Default for TariffCodes {
    fn default() -> Self {
        Self {
            door_to_door: DEFAULT_TARIFF_DOOR_TO_DOOR,
            door_to_office: DEFAULT_TARIFF_DOOR_TO_OFFICE,
        }
    }
}

impl Default for PackageSpec {
    fn default() -> Self {
        Self {
            item_weight_grams: DEFAULT_ITEM_WEIGHT_GRAMS,
            length_cm: DEFAULT_ITEM_LENGTH_CM,
            width_cm: DEFAULT_ITEM_WIDTH_CM,
            height_cm: DEFAULT_ITEM_HEIGHT_CM,
        }
    }
}

impl AppConfig {
    /// Load configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| -> Result<String, ConfigError> {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };
        let optional = |name: &'static str, default: &str| -> String {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let scheduler = SchedulerConfig {
            tick_interval: Duration::from_secs(parse_or(
                &lookup,
                ENV_RECONCILE_INTERVAL,
                DEFAULT_RECONCILE_INTERVAL_SECS,
            )?),
            workers: parse_or(&lookup, ENV_RECONCILE_WORKERS, DEFAULT_RECONCILE_WORKERS)?,
        };
        // tokio intervals cannot tick at zero period
        if scheduler.tick_interval.is_zero() {
            return Err(ConfigError::Invalid {
                name: ENV_RECONCILE_INTERVAL,
                value: "0".to_string(),
            });
        }
        if scheduler.workers == 0 {
            return Err(ConfigError::Invalid {
                name: ENV_RECONCILE_WORKERS,
                value: "0".to_string(),
            });
        }

        let gateway = GatewayConfig {
            base_url: required(ENV_GATEWAY_URL)?,
            username: required(ENV_GATEWAY_USER)?,
            password: required(ENV_GATEWAY_PASSWORD)?,
            return_url: required(ENV_GATEWAY_RETURN_URL)?,
            timeout: Duration::from_secs(parse_or(
                &lookup,
                ENV_GATEWAY_TIMEOUT,
                DEFAULT_PROVIDER_TIMEOUT_SECS,
            )?),
            reversal_ok_codes: split_list(&optional(ENV_REVERSAL_OK_CODES, DEFAULT_REVERSAL_OK_CODES)),
        };

        let carrier = CarrierConfig {
            base_url: required(ENV_CARRIER_URL)?,
            client_id: required(ENV_CARRIER_CLIENT_ID)?,
            client_secret: required(ENV_CARRIER_SECRET)?,
            timeout: Duration::from_secs(parse_or(
                &lookup,
                ENV_CARRIER_TIMEOUT,
                DEFAULT_PROVIDER_TIMEOUT_SECS,
            )?),
            delivered_code: optional(ENV_CARRIER_DELIVERED_CODE, DEFAULT_DELIVERED_CODE),
            tariffs: TariffCodes {
                door_to_door: parse_or(&lookup, ENV_TARIFF_DOOR_TO_DOOR, DEFAULT_TARIFF_DOOR_TO_DOOR)?,
                door_to_office: parse_or(
                    &lookup,
                    ENV_TARIFF_DOOR_TO_OFFICE,
                    DEFAULT_TARIFF_DOOR_TO_OFFICE,
                )?,
            },
            sender: SenderConfig {
                company: required(ENV_SENDER_COMPANY)?,
                name: required(ENV_SENDER_NAME)?,
                phone: required(ENV_SENDER_PHONE)?,
                city_code: parse_or(&lookup, ENV_SENDER_CITY_CODE, DEFAULT_SENDER_CITY_CODE)?,
                address: required(ENV_SENDER_ADDRESS)?,
            },
            package: PackageSpec {
                item_weight_grams: parse_or(&lookup, ENV_ITEM_WEIGHT, DEFAULT_ITEM_WEIGHT_GRAMS)?,
                length_cm: parse_or(&lookup, ENV_ITEM_LENGTH, DEFAULT_ITEM_LENGTH_CM)?,
                width_cm: parse_or(&lookup, ENV_ITEM_WIDTH, DEFAULT_ITEM_WIDTH_CM)?,
                height_cm: parse_or(&lookup, ENV_ITEM_HEIGHT, DEFAULT_ITEM_HEIGHT_CM)?,
            },
        };

        Ok(Self {
            database_url: required(ENV_DATABASE_URL)?,
            bind_addr: optional(ENV_BIND_ADDR, DEFAULT_BIND_ADDR),
            store_timeout: Duration::from_secs(parse_or(
                &lookup,
                ENV_STORE_TIMEOUT,
                DEFAULT_STORE_TIMEOUT_SECS,
            )?),
            notifier_url: lookup(ENV_NOTIFIER_URL).filter(|v| !v.trim().is_empty()),
            scheduler,
            gateway,
            carrier,
        })
    }
}

fn parse_or<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(name) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
        _ => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
