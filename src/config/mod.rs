//! Application configuration module
//!
//! Type-safe configuration loading from environment variables using the
//! `config` and `dotenvy` crates. Values are read with the `PAYLANE`
//! prefix and nested sections use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use paylane::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//! ```

mod error;
mod gateway;
mod server;

pub use error::{ConfigError, ValidationError};
pub use gateway::{AlipayConfig, EpayConfig, GatewayHttpConfig, WechatConfig};
pub use server::{Environment, ServerConfig};

use serde::Deserialize;

/// Root application configuration.
///
/// Each gateway section is optional: a provider left unconfigured is simply
/// absent from the gateway registry and its payment method is rejected at
/// order creation.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server configuration (host, port, environment, public base URL)
    #[serde(default)]
    pub server: ServerConfig,

    /// Aggregator gateway credentials
    pub epay: Option<EpayConfig>,

    /// Direct wallet gateway credentials (RSA2)
    pub alipay: Option<AlipayConfig>,

    /// Direct wallet gateway credentials (XML transport)
    pub wechat: Option<WechatConfig>,

    /// Outbound HTTP behavior for gateway calls
    #[serde(default)]
    pub gateway_http: GatewayHttpConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Loads `.env` first (development convenience), then reads variables
    /// like `PAYLANE__SERVER__PORT=8080` or
    /// `PAYLANE__WECHAT__MCH_ID=1234567890`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or cannot be
    /// parsed into the expected types.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("PAYLANE")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configured section is invalid, or
    /// if no gateway is configured at all.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.server.validate()?;
        self.gateway_http.validate()?;

        if self.epay.is_none() && self.alipay.is_none() && self.wechat.is_none() {
            return Err(ValidationError::MissingRequired(
                "at least one gateway section (epay, alipay, wechat)",
            ));
        }

        if let Some(epay) = &self.epay {
            epay.validate()?;
        }
        if let Some(alipay) = &self.alipay {
            alipay.validate(self.is_production())?;
        }
        if let Some(wechat) = &self.wechat {
            wechat.validate()?;
        }
        Ok(())
    }

    /// Check if running in production environment
    pub fn is_production(&self) -> bool {
        self.server.is_production()
    }
}
