//! Gateway adapters, one per provider.

mod alipay;
mod epay;
mod wechat;

pub use alipay::AlipayGateway;
pub use epay::EpayGateway;
pub use wechat::WechatGateway;

use std::sync::Arc;

use crate::config::AppConfig;
use crate::domain::signing::ParamMap;
use crate::ports::{GatewayError, GatewayRegistry};

/// Build the provider registry from whatever gateway sections are
/// configured. One shared HTTP client carries the bounded timeout for all
/// outbound calls.
pub fn build_registry(config: &AppConfig) -> Result<GatewayRegistry, GatewayError> {
    let http = reqwest::Client::builder()
        .timeout(config.gateway_http.timeout())
        .build()
        .map_err(|e| GatewayError::Unavailable(format!("http client: {}", e)))?;

    let mut registry = GatewayRegistry::new();

    if let Some(epay) = &config.epay {
        registry = registry.register(Arc::new(EpayGateway::new(epay.clone(), http.clone())));
    }
    if let Some(alipay) = &config.alipay {
        registry = registry.register(Arc::new(AlipayGateway::new(alipay.clone(), http.clone())?));
    }
    if let Some(wechat) = &config.wechat {
        registry = registry.register(Arc::new(WechatGateway::new(wechat.clone(), http.clone())));
    }

    Ok(registry)
}

/// Format minor units as the decimal major-unit string some providers
/// require (`1900` -> `"19.00"`).
pub(crate) fn format_major_units(amount_minor: u64) -> String {
    format!("{}.{:02}", amount_minor / 100, amount_minor % 100)
}

/// Decode a urlencoded body or query string into a canonical map.
pub(crate) fn form_to_params(raw: &[u8]) -> Result<ParamMap, GatewayError> {
    let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(raw)
        .map_err(|e| GatewayError::MalformedCallback(format!("form decode: {}", e)))?;
    Ok(pairs.into_iter().collect())
}
