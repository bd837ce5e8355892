//! Aggregator gateway adapter.
//!
//! Speaks the common aggregator protocol: form-encoded requests signed with
//! the sorted-key MD5 scheme, a JSON creation response carrying a pay URL
//! or QR content, and form/query callbacks acknowledged with a bare
//! `success`/`fail` body. The aggregator has no status-query endpoint;
//! order state is resolved exclusively through callbacks.

use async_trait::async_trait;

use crate::config::EpayConfig;
use crate::domain::order::{OrderNo, PaymentMethod};
use crate::domain::signing::{DigestCasing, ParamMap, SignatureScheme, SortedDigestScheme};
use crate::ports::{
    CallbackAck, CallbackNotice, ClaimedResult, CreatePaymentRequest, GatewayError,
    GatewayOrderStatus, PaymentCreated, PaymentGateway, PaymentInstructions,
};

use super::{form_to_params, format_major_units};

pub struct EpayGateway {
    config: EpayConfig,
    scheme: SortedDigestScheme,
    http: reqwest::Client,
}

impl EpayGateway {
    pub fn new(config: EpayConfig, http: reqwest::Client) -> Self {
        let scheme = SortedDigestScheme::new(config.merchant_key.clone(), DigestCasing::Lower);
        Self {
            config,
            scheme,
            http,
        }
    }

    fn build_create_params(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<ParamMap, GatewayError> {
        let mut params = ParamMap::new();
        params.insert("pid".into(), self.config.merchant_id.clone());
        params.insert("type".into(), self.config.channel.clone());
        params.insert("out_trade_no".into(), request.order_no.as_str().to_string());
        params.insert("name".into(), request.description.clone());
        params.insert("money".into(), format_major_units(request.amount_minor));
        params.insert("notify_url".into(), request.notify_url.clone());
        if let Some(return_url) = &request.return_url {
            params.insert("return_url".into(), return_url.clone());
        }
        params.insert("sign_type".into(), "MD5".into());

        let sign = self
            .scheme
            .sign(&params)
            .map_err(|e| GatewayError::Signing(e.to_string()))?;
        params.insert("sign".into(), sign);
        Ok(params)
    }
}

#[async_trait]
impl PaymentGateway for EpayGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Epay
    }

    async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<PaymentCreated, GatewayError> {
        let params = self.build_create_params(&request)?;

        let response = self
            .http
            .post(&self.config.api_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Unavailable(format!(
                "aggregator answered {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Rejected(format!("unexpected response body: {}", e)))?;

        let accepted = body.get("code").and_then(|c| c.as_i64()) == Some(1);
        if !accepted {
            let message = body
                .get("msg")
                .and_then(|m| m.as_str())
                .unwrap_or("payment creation refused");
            return Err(GatewayError::Rejected(message.to_string()));
        }

        let provider_ref = body
            .get("trade_no")
            .and_then(|t| t.as_str())
            .map(str::to_string);

        if let Some(url) = body.get("payurl").and_then(|u| u.as_str()) {
            return Ok(PaymentCreated {
                instructions: PaymentInstructions::Redirect {
                    url: url.to_string(),
                },
                provider_ref,
            });
        }
        if let Some(qr) = body.get("qrcode").and_then(|q| q.as_str()) {
            return Ok(PaymentCreated {
                instructions: PaymentInstructions::QrCode {
                    content: qr.to_string(),
                },
                provider_ref,
            });
        }

        Err(GatewayError::Rejected(
            "response carried neither pay url nor qr code".to_string(),
        ))
    }

    fn parse_callback(&self, raw: &[u8]) -> Result<CallbackNotice, GatewayError> {
        let params = form_to_params(raw)?;

        let order_no = params
            .get("out_trade_no")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| GatewayError::MalformedCallback("missing out_trade_no".into()))?;

        let claimed_result = match params.get("trade_status").map(String::as_str) {
            Some("TRADE_SUCCESS") => ClaimedResult::Success,
            _ => ClaimedResult::Failure,
        };

        let claimed_transaction_id = match params.get("trade_no") {
            Some(trade_no) if !trade_no.is_empty() => trade_no.clone(),
            _ if claimed_result == ClaimedResult::Success => {
                return Err(GatewayError::MalformedCallback("missing trade_no".into()))
            }
            _ => String::new(),
        };

        Ok(CallbackNotice {
            provider: PaymentMethod::Epay,
            order_no: OrderNo::from_string(order_no.clone()),
            claimed_transaction_id,
            claimed_result,
            params,
        })
    }

    fn verify_callback(&self, notice: &CallbackNotice) -> bool {
        match notice.params.get("sign") {
            Some(token) => self.scheme.verify(&notice.params, token),
            None => false,
        }
    }

    async fn query_status(&self, _order_no: &OrderNo) -> Result<GatewayOrderStatus, GatewayError> {
        Err(GatewayError::NotSupported("aggregator status query"))
    }

    fn ack_success(&self) -> CallbackAck {
        CallbackAck::text("success")
    }

    fn ack_failure(&self) -> CallbackAck {
        CallbackAck::text("fail")
    }
}
