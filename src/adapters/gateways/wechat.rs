//! Direct wallet gateway adapter with XML transport.
//!
//! Every exchange is a flat XML document: requests are the parameter map
//! rendered as `<xml><k>v</k></xml>` with an uppercase sorted-key digest in
//! the `sign` element, responses and callbacks come back the same way. The
//! unified-order endpoint returns a QR payload (`code_url`) for native
//! payments.

use async_trait::async_trait;

use crate::config::WechatConfig;
use crate::domain::order::{OrderNo, PaymentMethod};
use crate::domain::signing::{
    document_to_map, map_to_document, DigestCasing, ParamMap, SignatureScheme,
    SortedDigestScheme,
};
use crate::ports::{
    CallbackAck, CallbackNotice, ClaimedResult, CreatePaymentRequest, GatewayError,
    GatewayOrderStatus, PaymentCreated, PaymentGateway, PaymentInstructions,
};

const ACK_SUCCESS: &str = "<xml><return_code><![CDATA[SUCCESS]]></return_code><return_msg><![CDATA[OK]]></return_msg></xml>";
const ACK_FAILURE: &str = "<xml><return_code><![CDATA[FAIL]]></return_code><return_msg><![CDATA[invalid notification]]></return_msg></xml>";

pub struct WechatGateway {
    config: WechatConfig,
    scheme: SortedDigestScheme,
    http: reqwest::Client,
}

impl WechatGateway {
    pub fn new(config: WechatConfig, http: reqwest::Client) -> Self {
        let scheme = SortedDigestScheme::new(config.api_key.clone(), DigestCasing::Upper);
        Self {
            config,
            scheme,
            http,
        }
    }

    fn nonce() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }

    fn build_unified_order_params(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<ParamMap, GatewayError> {
        let mut params = ParamMap::new();
        params.insert("appid".into(), self.config.app_id.clone());
        params.insert("mch_id".into(), self.config.mch_id.clone());
        params.insert("nonce_str".into(), Self::nonce());
        params.insert("body".into(), request.description.clone());
        params.insert("out_trade_no".into(), request.order_no.as_str().to_string());
        params.insert("total_fee".into(), request.amount_minor.to_string());
        params.insert("spbill_create_ip".into(), "127.0.0.1".into());
        params.insert("notify_url".into(), request.notify_url.clone());
        params.insert("trade_type".into(), "NATIVE".into());

        let sign = self
            .scheme
            .sign(&params)
            .map_err(|e| GatewayError::Signing(e.to_string()))?;
        params.insert("sign".into(), sign);
        Ok(params)
    }

    fn build_query_params(&self, order_no: &OrderNo) -> Result<ParamMap, GatewayError> {
        let mut params = ParamMap::new();
        params.insert("appid".into(), self.config.app_id.clone());
        params.insert("mch_id".into(), self.config.mch_id.clone());
        params.insert("nonce_str".into(), Self::nonce());
        params.insert("out_trade_no".into(), order_no.as_str().to_string());

        let sign = self
            .scheme
            .sign(&params)
            .map_err(|e| GatewayError::Signing(e.to_string()))?;
        params.insert("sign".into(), sign);
        Ok(params)
    }

    async fn post_document(&self, url: &str, params: &ParamMap) -> Result<ParamMap, GatewayError> {
        let response = self
            .http
            .post(url)
            .header("Content-Type", "text/xml; charset=utf-8")
            .body(map_to_document(params))
            .send()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(GatewayError::Unavailable(format!(
                "gateway answered {}",
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::Unavailable(e.to_string()))?;

        document_to_map(&body)
            .map_err(|e| GatewayError::Rejected(format!("unexpected response body: {}", e)))
    }
}

#[async_trait]
impl PaymentGateway for WechatGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Wechat
    }

    async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<PaymentCreated, GatewayError> {
        let params = self.build_unified_order_params(&request)?;
        let reply = self
            .post_document(&self.config.unified_order_url, &params)
            .await?;

        let accepted = reply.get("return_code").map(String::as_str) == Some("SUCCESS")
            && reply.get("result_code").map(String::as_str) == Some("SUCCESS");

        if !accepted {
            let message = reply
                .get("err_code_des")
                .or_else(|| reply.get("return_msg"))
                .map(String::as_str)
                .unwrap_or("payment creation refused");
            return Err(GatewayError::Rejected(message.to_string()));
        }

        let code_url = reply
            .get("code_url")
            .filter(|u| !u.is_empty())
            .ok_or_else(|| GatewayError::Rejected("response carried no code_url".into()))?;

        Ok(PaymentCreated {
            instructions: PaymentInstructions::QrCode {
                content: code_url.clone(),
            },
            provider_ref: reply.get("prepay_id").cloned(),
        })
    }

    fn parse_callback(&self, raw: &[u8]) -> Result<CallbackNotice, GatewayError> {
        let document = std::str::from_utf8(raw)
            .map_err(|e| GatewayError::MalformedCallback(format!("not utf-8: {}", e)))?;
        let params = document_to_map(document)
            .map_err(|e| GatewayError::MalformedCallback(e.to_string()))?;

        let order_no = params
            .get("out_trade_no")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| GatewayError::MalformedCallback("missing out_trade_no".into()))?;

        let claimed_result = if params.get("return_code").map(String::as_str) == Some("SUCCESS")
            && params.get("result_code").map(String::as_str) == Some("SUCCESS")
        {
            ClaimedResult::Success
        } else {
            ClaimedResult::Failure
        };

        let claimed_transaction_id = match params.get("transaction_id") {
            Some(id) if !id.is_empty() => id.clone(),
            _ if claimed_result == ClaimedResult::Success => {
                return Err(GatewayError::MalformedCallback(
                    "missing transaction_id".into(),
                ))
            }
            _ => String::new(),
        };

        Ok(CallbackNotice {
            provider: PaymentMethod::Wechat,
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
        let reply = self.post_document(&self.config.query_url, &params).await?;

        if reply.get("return_code").map(String::as_str) != Some("SUCCESS")
            || reply.get("result_code").map(String::as_str) != Some("SUCCESS")
        {
            let message = reply
                .get("err_code_des")
                .or_else(|| reply.get("return_msg"))
                .map(String::as_str)
                .unwrap_or("trade query refused");
            return Err(GatewayError::Rejected(message.to_string()));
        }

        match reply.get("trade_state").map(String::as_str) {
            Some("SUCCESS") => {
                let transaction_id = reply
                    .get("transaction_id")
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        GatewayError::Rejected("paid trade without transaction_id".into())
                    })?;
                Ok(GatewayOrderStatus::Paid {
                    transaction_id: transaction_id.clone(),
                })
            }
            Some("PAYERROR") | Some("CLOSED") | Some("REVOKED") => Ok(GatewayOrderStatus::Failed),
            // NOTPAY, USERPAYING, REFUND, or anything unrecognized: no
            // confirmation either way.
            _ => Ok(GatewayOrderStatus::Pending),
        }
    }

    fn ack_success(&self) -> CallbackAck {
        CallbackAck::xml(ACK_SUCCESS)
    }

    fn ack_failure(&self) -> CallbackAck {
        CallbackAck::xml(ACK_FAILURE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn gateway() -> WechatGateway {
        WechatGateway::new(
            WechatConfig {
                app_id: "wx1234567890abcdef".to_string(),
                mch_id: "1900000109".to_string(),
                api_key: SecretString::new("wechat-api-key".into()),
                unified_order_url: "https://api.mch.weixin.qq.com/pay/unifiedorder".to_string(),
                query_url: "https://api.mch.weixin.qq.com/pay/orderquery".to_string(),
            },
            reqwest::Client::new(),
        )
    }

    fn create_request() -> CreatePaymentRequest {
        CreatePaymentRequest {
            order_no: OrderNo::from_string("ORDER20260301120000AB12CD34"),
            amount_minor: 1900,
            description: "Pixelrift Studio - Basic plan".to_string(),
            notify_url: "https://shop.example.com/api/payment/notify/wechat".to_string(),
            return_url: None,
        }
    }

    fn signed_callback_document(gateway: &WechatGateway, result_code: &str) -> String {
        let mut params = ParamMap::new();
        params.insert("appid".into(), "wx1234567890abcdef".into());
        params.insert("mch_id".into(), "1900000109".into());
        params.insert("out_trade_no".into(), "ORDER20260301120000AB12CD34".into());
        params.insert("transaction_id".into(), "4200001234202603011234567890".into());
        params.insert("return_code".into(), "SUCCESS".into());
        params.insert("result_code".into(), result_code.into());
        params.insert("total_fee".into(), "1900".into());
        let sign = gateway.scheme.sign(&params).unwrap();
        params.insert("sign".into(), sign);

        map_to_document(&params)
    }

    // ══════════════════════════════════════════════════════════════
    // Request construction
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn unified_order_params_are_signed_with_minor_units() {
        let gateway = gateway();
        let params = gateway.build_unified_order_params(&create_request()).unwrap();

        assert_eq!(params.get("total_fee").map(String::as_str), Some("1900"));
        assert_eq!(params.get("trade_type").map(String::as_str), Some("NATIVE"));
        assert_eq!(params.get("nonce_str").map(String::len), Some(32));

        let sign = params.get("sign").unwrap();
        assert_eq!(sign, &sign.to_uppercase());
        assert!(gateway.scheme.verify(&params, sign));
    }

    #[test]
    fn unified_order_document_round_trips() {
        let gateway = gateway();
        let params = gateway.build_unified_order_params(&create_request()).unwrap();

        let document = map_to_document(&params);
        let parsed = document_to_map(&document).unwrap();

        assert_eq!(parsed, params);
    }

    // ══════════════════════════════════════════════════════════════
    // Callback parsing and verification
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn parses_and_verifies_success_notification() {
        let gateway = gateway();
        let document = signed_callback_document(&gateway, "SUCCESS");

        let notice = gateway.parse_callback(document.as_bytes()).unwrap();

        assert_eq!(notice.provider, PaymentMethod::Wechat);
        assert_eq!(notice.claimed_result, ClaimedResult::Success);
        assert_eq!(
            notice.claimed_transaction_id,
            "4200001234202603011234567890"
        );
        assert!(gateway.verify_callback(&notice));
    }

    #[test]
    fn tampered_notification_fails_verification() {
        let gateway = gateway();
        let document = signed_callback_document(&gateway, "SUCCESS")
            .replace("<total_fee>1900</total_fee>", "<total_fee>1</total_fee>");

        let notice = gateway.parse_callback(document.as_bytes()).unwrap();

        assert!(!gateway.verify_callback(&notice));
    }

    #[test]
    fn notification_signed_with_wrong_key_fails_verification() {
        let gateway = gateway();
        let forger = WechatGateway::new(
            WechatConfig {
                app_id: "wx1234567890abcdef".to_string(),
                mch_id: "1900000109".to_string(),
                api_key: SecretString::new("guessed-key".into()),
                unified_order_url: "https://api.mch.weixin.qq.com/pay/unifiedorder".to_string(),
                query_url: "https://api.mch.weixin.qq.com/pay/orderquery".to_string(),
            },
            reqwest::Client::new(),
        );
        let document = signed_callback_document(&forger, "SUCCESS");

        let notice = gateway.parse_callback(document.as_bytes()).unwrap();

        assert!(!gateway.verify_callback(&notice));
    }

    #[test]
    fn unsigned_notification_fails_verification() {
        let gateway = gateway();
        let document = "<xml><out_trade_no>ORDER1</out_trade_no>\
             <transaction_id>T1</transaction_id>\
             <return_code>SUCCESS</return_code>\
             <result_code>SUCCESS</result_code></xml>";

        let notice = gateway.parse_callback(document.as_bytes()).unwrap();

        assert!(!gateway.verify_callback(&notice));
    }

    #[test]
    fn failed_result_code_claims_failure() {
        let gateway = gateway();
        let document = signed_callback_document(&gateway, "FAIL");

        let notice = gateway.parse_callback(document.as_bytes()).unwrap();

        assert_eq!(notice.claimed_result, ClaimedResult::Failure);
    }

    #[test]
    fn broken_document_is_malformed() {
        let gateway = gateway();
        let result = gateway.parse_callback(b"<xml><out_trade_no>ORDER1");
        assert!(matches!(result, Err(GatewayError::MalformedCallback(_))));
    }

    #[test]
    fn document_without_order_no_is_malformed() {
        let gateway = gateway();
        let result =
            gateway.parse_callback(b"<xml><return_code>SUCCESS</return_code></xml>");
        assert!(matches!(result, Err(GatewayError::MalformedCallback(_))));
    }

    // ══════════════════════════════════════════════════════════════
    // Provider contract
    // ══════════════════════════════════════════════════════════════

    #[test]
    fn acks_are_xml_documents() {
        let gateway = gateway();

        let success = document_to_map(&gateway.ack_success().body).unwrap();
        assert_eq!(success.get("return_code").map(String::as_str), Some("SUCCESS"));

        let failure = document_to_map(&gateway.ack_failure().body).unwrap();
        assert_eq!(failure.get("return_code").map(String::as_str), Some("FAIL"));
    }
}
