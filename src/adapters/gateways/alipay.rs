//! Direct wallet gateway adapter with RSA2 signatures.
//!
//! Payment creation is a signed redirect: the full parameter set, including
//! the JSON `biz_content` envelope, is signed with the merchant private key
//! and appended to the gateway URL as a query string. Callbacks arrive as
//! urlencoded form posts verified against the gateway's public key. The
//! provider supports a synchronous trade query used to resolve orders whose
//! callbacks never arrived.

use async_trait::async_trait;
use chrono::Utc;

use crate::config::AlipayConfig;
use crate::domain::order::{OrderNo, PaymentMethod};
use crate::domain::signing::{ParamMap, RsaScheme, SignatureScheme};
use crate::ports::{
    CallbackAck, CallbackNotice, ClaimedResult, CreatePaymentRequest, GatewayError,
    GatewayOrderStatus, PaymentCreated, PaymentGateway, PaymentInstructions,
};

use super::format_major_units;

pub struct AlipayGateway {
    config: AlipayConfig,
    scheme: RsaScheme,
    http: reqwest::Client,
}

impl AlipayGateway {
    /// Construct the adapter, loading key material eagerly so a bad PEM
    /// fails at startup rather than on the first payment.
    pub fn new(config: AlipayConfig, http: reqwest::Client) -> Result<Self, GatewayError> {
        use secrecy::ExposeSecret;

        let scheme = if config.sandbox_skip_verification {
            RsaScheme::sandbox_unverified(config.private_key_pem.expose_secret())
        } else {
            RsaScheme::new(
                config.private_key_pem.expose_secret(),
                &config.gateway_public_key_pem,
            )
        }
        .map_err(|e| GatewayError::Signing(e.to_string()))?;

        Ok(Self {
            config,
            scheme,
            http,
        })
    }

    /// Common request envelope shared by every gateway method.
    fn base_params(&self, method: &str) -> ParamMap {
        let mut params = ParamMap::new();
        params.insert("app_id".into(), self.config.app_id.clone());
        params.insert("method".into(), method.into());
        params.insert("format".into(), "JSON".into());
        params.insert("charset".into(), "utf-8".into());
        params.insert("sign_type".into(), "RSA2".into());
        params.insert(
            "timestamp".into(),
            Utc::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        params.insert("version".into(), "1.0".into());
        params
    }

    fn build_page_pay_params(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<ParamMap, GatewayError> {
        let biz_content = serde_json::json!({
            "out_trade_no": request.order_no.as_str(),
            "product_code": "FAST_INSTANT_TRADE_PAY",
            "total_amount": format_major_units(request.amount_minor),
            "subject": request.description,
        });

        let mut params = self.base_params("alipay.trade.page.pay");
        params.insert("biz_content".into(), biz_content.to_string());
        params.insert("notify_url".into(), request.notify_url.clone());
        if let Some(return_url) = &request.return_url {
            params.insert("return_url".into(), return_url.clone());
        }

        let sign = self
            .scheme
            .sign(&params)
            .map_err(|e| GatewayError::Signing(e.to_string()))?;
        params.insert("sign".into(), sign);
        Ok(params)
    }

    fn build_query_params(&self, order_no: &OrderNo) -> Result<ParamMap, GatewayError> {
        let biz_content = serde_json::json!({ "out_trade_no": order_no.as_str() });

        let mut params = self.base_params("alipay.trade.query");
        params.insert("biz_content".into(), biz_content.to_string());

        let sign = self
            .scheme
            .sign(&params)
            .map_err(|e| GatewayError::Signing(e.to_string()))?;
        params.insert("sign".into(), sign);
        Ok(params)
    }
}

#[async_trait]
impl PaymentGateway for AlipayGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Alipay
    }

    async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<PaymentCreated, GatewayError> {
        let params = self.build_page_pay_params(&request)?;
        let query = serde_urlencoded::to_string(&params)
            .map_err(|e| GatewayError::Signing(e.to_string()))?;

        // Page pay is a redirect; the gateway is not contacted until the
        // payer's browser follows the URL, so creation cannot fail with
        // Unavailable here.
        Ok(PaymentCreated {
            instructions: PaymentInstructions::Redirect {
                url: format!("{}?{}", self.config.gateway_url, query),
            },
            provider_ref: None,
        })
    }

    fn parse_callback(&self, raw: &[u8]) -> Result<CallbackNotice, GatewayError> {
        let params = super::form_to_params(raw)?;

        let order_no = params
            .get("out_trade_no")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| GatewayError::MalformedCallback("missing out_trade_no".into()))?;

        let claimed_result = match params.get("trade_status").map(String::as_str) {
            Some("TRADE_SUCCESS") | Some("TRADE_FINISHED") => ClaimedResult::Success,
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
            provider: PaymentMethod::Alipay,
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

    async fn query_status(&self, order_no: &OrderNo) -> Result<GatewayOrderStatus, GatewayError> {
        let params = self.build_query_params(order_no)?;

        let response = self
            .http
            .post(&self.config.gateway_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Unavailable(format!(
                "gateway answered {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::Rejected(format!("unexpected response body: {}", e)))?;

        let reply = body
            .get("alipay_trade_query_response")
            .ok_or_else(|| GatewayError::Rejected("missing query response envelope".into()))?;

        if reply.get("code").and_then(|c| c.as_str()) != Some("10000") {
            let message = reply
                .get("sub_msg")
                .or_else(|| reply.get("msg"))
                .and_then(|m| m.as_str())
                .unwrap_or("trade query refused");
            return Err(GatewayError::Rejected(message.to_string()));
        }

        match reply.get("trade_status").and_then(|s| s.as_str()) {
            Some("TRADE_SUCCESS") | Some("TRADE_FINISHED") => {
                let transaction_id = reply
                    .get("trade_no")
                    .and_then(|t| t.as_str())
                    .ok_or_else(|| {
                        GatewayError::Rejected("paid trade without trade_no".into())
                    })?;
                Ok(GatewayOrderStatus::Paid {
                    transaction_id: transaction_id.to_string(),
                })
            }
            Some("TRADE_CLOSED") => Ok(GatewayOrderStatus::Failed),
            // WAIT_BUYER_PAY and anything unrecognized: not a confirmation,
            // leave the order alone.
            _ => Ok(GatewayOrderStatus::Pending),
        }
    }

    fn ack_success(&self) -> CallbackAck {
        CallbackAck::text("success")
    }

    fn ack_failure(&self) -> CallbackAck {
        CallbackAck::text("failure")
    }
}
