//! Client-facing order operations.
//!
//! Creation, polling, the out-of-band "I paid" claim, synchronous
//! reconciliation against the gateway, and refunds. All mutation goes
//! through the reconciliation engine; this service never writes order state
//! directly except for the initial insert.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::order::{Order, OrderNo, PaymentError, PaymentMethod, Plan, UserRef};
use crate::ports::{
    CreatePaymentRequest, GatewayOrderStatus, GatewayRegistry, OrderStore, PaymentCreated,
};

use super::reconciliation::{PaidEvidence, ReconcileOutcome, ReconciliationEngine};

/// Command to create a purchase order.
#[derive(Debug, Clone)]
pub struct CreateOrderCommand {
    pub user_ref: UserRef,
    pub plan: Plan,
    pub payment_method: PaymentMethod,
}

/// A created order plus what the client needs to pay it.
#[derive(Debug, Clone)]
pub struct CreatedOrder {
    pub order: Order,
    pub payment: PaymentCreated,
}

/// Result of a synchronous reconciliation attempt.
#[derive(Debug, Clone)]
pub enum ReconcileResult {
    /// The gateway confirmed an outcome and the order transitioned (or the
    /// transition was already applied).
    Transitioned(ReconcileOutcome),

    /// The gateway reported no final outcome; the order is unchanged.
    Unchanged(Order),
}

/// Application service over orders.
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    gateways: Arc<GatewayRegistry>,
    engine: Arc<ReconciliationEngine>,

    /// Public base URL for building per-provider callback URLs.
    public_base_url: String,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        gateways: Arc<GatewayRegistry>,
        engine: Arc<ReconciliationEngine>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            orders,
            gateways,
            engine,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn notify_url(&self, method: PaymentMethod) -> String {
        format!("{}/api/payment/notify/{}", self.public_base_url, method)
    }

    fn return_url(&self, order_no: &OrderNo) -> String {
        format!(
            "{}/payment/result?order_no={}",
            self.public_base_url, order_no
        )
    }

    /// Create a `Pending` order and open the payment with the provider.
    ///
    /// On gateway failure the order stays `Pending` with no gateway fields
    /// written: the charge outcome is unknown, so a late callback can still
    /// resolve it, and the client may retry with a fresh order.
    pub async fn create_order(
        &self,
        command: CreateOrderCommand,
    ) -> Result<CreatedOrder, PaymentError> {
        let gateway = self.gateways.get(command.payment_method)?;

        let order = Order::create(
            command.user_ref,
            command.plan,
            command.payment_method,
            Utc::now(),
        );
        self.orders.insert(order.clone()).await?;

        tracing::info!(
            order_no = %order.order_no,
            user_ref = %order.user_ref,
            plan = %order.plan,
            method = %order.payment_method,
            amount_minor = order.amount_minor,
            "order created"
        );

        let request = CreatePaymentRequest {
            order_no: order.order_no.clone(),
            amount_minor: order.amount_minor,
            description: format!("Pixelrift Studio - {} plan", order.plan.display_name()),
            notify_url: self.notify_url(order.payment_method),
            return_url: Some(self.return_url(&order.order_no)),
        };

        match gateway.create_payment(request).await {
            Ok(payment) => Ok(CreatedOrder { order, payment }),
            Err(err) => {
                tracing::warn!(
                    order_no = %order.order_no,
                    error = %err,
                    "payment creation failed; order left pending"
                );
                Err(err.into())
            }
        }
    }

    /// Fetch a single order.
    pub async fn get_order(&self, order_no: &OrderNo) -> Result<Order, PaymentError> {
        self.orders
            .get(order_no)
            .await?
            .ok_or_else(|| PaymentError::OrderNotFound(order_no.clone()))
    }

    /// List a user's orders, most recent first.
    pub async fn list_orders(&self, user_ref: &UserRef) -> Result<Vec<Order>, PaymentError> {
        Ok(self.orders.list_by_user(user_ref).await?)
    }

    /// Record the client's out-of-band "I paid" claim.
    pub async fn claim_paid(&self, order_no: &OrderNo) -> Result<ReconcileOutcome, PaymentError> {
        self.engine.claim_paid(order_no).await
    }

    /// Ask the gateway for the order's status and reconcile accordingly.
    ///
    /// A gateway-confirmed success drives the same verified path as a
    /// callback; an explicit failure marks the order failed; anything else
    /// leaves the order untouched (failed-unknown semantics).
    pub async fn reconcile(&self, order_no: &OrderNo) -> Result<ReconcileResult, PaymentError> {
        let order = self.get_order(order_no).await?;
        let gateway = self.gateways.get(order.payment_method)?;

        match gateway.query_status(order_no).await {
            Ok(GatewayOrderStatus::Paid { transaction_id }) => {
                let outcome = self
                    .engine
                    .confirm_paid(
                        order_no,
                        &transaction_id,
                        PaidEvidence::VerifiedQuery {
                            provider: order.payment_method,
                        },
                    )
                    .await?;
                Ok(ReconcileResult::Transitioned(outcome))
            }
            Ok(GatewayOrderStatus::Failed) => {
                let outcome = self.engine.note_failed(order_no).await?;
                Ok(ReconcileResult::Transitioned(outcome))
            }
            Ok(GatewayOrderStatus::Pending) => Ok(ReconcileResult::Unchanged(order)),
            Err(err) => Err(err.into()),
        }
    }

    /// Refund a paid order. Membership is not revoked here; revocation is a
    /// policy decision left to the operator tooling.
    pub async fn refund(&self, order_no: &OrderNo) -> Result<ReconcileOutcome, PaymentError> {
        let outcome = self.engine.refund(order_no).await?;
        tracing::info!(order_no = %order_no, "order refunded");
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::store::{InMemoryMembershipStore, InMemoryOrderStore};
    use crate::application::{ActivationStatus, MembershipActivator};
    use crate::domain::order::{OrderStatus, TransitionEffect};
    use crate::ports::{
        CallbackAck, CallbackNotice, GatewayError, PaymentGateway, PaymentInstructions,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    // ══════════════════════════════════════════════════════════════
    // Test Infrastructure
    // ══════════════════════════════════════════════════════════════

    /// Scriptable gateway double.
    struct FakeGateway {
        method: PaymentMethod,
        create_result: Mutex<Option<Result<PaymentCreated, GatewayError>>>,
        query_result: Mutex<Option<Result<GatewayOrderStatus, GatewayError>>>,
        create_calls: AtomicU32,
    }

    impl FakeGateway {
        fn new(method: PaymentMethod) -> Self {
            Self {
                method,
                create_result: Mutex::new(None),
                query_result: Mutex::new(None),
                create_calls: AtomicU32::new(0),
            }
        }

        fn redirect(method: PaymentMethod) -> Self {
            let gateway = Self::new(method);
            *gateway.create_result.lock().unwrap() = Some(Ok(PaymentCreated {
                instructions: PaymentInstructions::Redirect {
                    url: "https://gateway.example.com/pay".to_string(),
                },
                provider_ref: Some("REF-1".to_string()),
            }));
            gateway
        }

        fn unavailable(method: PaymentMethod) -> Self {
            let gateway = Self::new(method);
            *gateway.create_result.lock().unwrap() =
                Some(Err(GatewayError::Unavailable("timeout".to_string())));
            gateway
        }

        fn with_query(self, result: Result<GatewayOrderStatus, GatewayError>) -> Self {
            *self.query_result.lock().unwrap() = Some(result);
            self
        }
    }

    #[async_trait]
    impl PaymentGateway for FakeGateway {
        fn method(&self) -> PaymentMethod {
            self.method
        }

        async fn create_payment(
            &self,
            _request: CreatePaymentRequest,
        ) -> Result<PaymentCreated, GatewayError> {
            self.create_calls.fetch_add(1, Ordering::SeqCst);
            self.create_result
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(Err(GatewayError::Unavailable("unscripted".to_string())))
        }

        fn parse_callback(&self, _raw: &[u8]) -> Result<CallbackNotice, GatewayError> {
            Err(GatewayError::MalformedCallback("unscripted".to_string()))
        }

        fn verify_callback(&self, _notice: &CallbackNotice) -> bool {
            false
        }

        async fn query_status(
            &self,
            _order_no: &OrderNo,
        ) -> Result<GatewayOrderStatus, GatewayError> {
            self.query_result
                .lock()
                .unwrap()
                .clone()
                .unwrap_or(Err(GatewayError::NotSupported("status query")))
        }

        fn ack_success(&self) -> CallbackAck {
            CallbackAck::text("success")
        }

        fn ack_failure(&self) -> CallbackAck {
            CallbackAck::text("fail")
        }
    }

    struct Fixture {
        service: OrderService,
        orders: Arc<InMemoryOrderStore>,
        memberships: Arc<InMemoryMembershipStore>,
    }

    fn fixture(gateway: FakeGateway) -> Fixture {
        let orders = Arc::new(InMemoryOrderStore::new());
        let memberships = Arc::new(InMemoryMembershipStore::new());
        let engine = Arc::new(ReconciliationEngine::new(
            orders.clone(),
            MembershipActivator::new(memberships.clone()),
        ));
        let registry = Arc::new(GatewayRegistry::new().register(Arc::new(gateway)));

        Fixture {
            service: OrderService::new(
                orders.clone(),
                registry,
                engine,
                "https://shop.example.com/",
            ),
            orders,
            memberships,
        }
    }

    fn command() -> CreateOrderCommand {
        CreateOrderCommand {
            user_ref: UserRef::new("acct-42"),
            plan: Plan::Basic,
            payment_method: PaymentMethod::Epay,
        }
    }

    // ══════════════════════════════════════════════════════════════
    // Creation
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn creates_pending_order_with_payment_instructions() {
        let f = fixture(FakeGateway::redirect(PaymentMethod::Epay));

        let created = f.service.create_order(command()).await.unwrap();

        assert_eq!(created.order.status, OrderStatus::Pending);
        assert_eq!(created.order.amount_minor, 1900);
        assert!(matches!(
            created.payment.instructions,
            PaymentInstructions::Redirect { .. }
        ));

        let stored = f.orders.get(&created.order.order_no).await.unwrap();
        assert!(stored.is_some());
    }

    #[tokio::test]
    async fn gateway_failure_surfaces_retryable_error_and_keeps_order_pending() {
        let f = fixture(FakeGateway::unavailable(PaymentMethod::Epay));

        let result = f.service.create_order(command()).await;

        let err = result.unwrap_err();
        assert!(matches!(err, PaymentError::GatewayUnavailable(_)));
        assert!(err.is_retryable());

        // The order exists, stays Pending, and carries no gateway state.
        let orders = f.orders.list_by_user(&UserRef::new("acct-42")).await.unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].status, OrderStatus::Pending);
        assert!(orders[0].gateway_transaction_id.is_none());
    }

    #[tokio::test]
    async fn unconfigured_method_is_rejected_before_creating_anything() {
        let f = fixture(FakeGateway::redirect(PaymentMethod::Epay));

        let result = f
            .service
            .create_order(CreateOrderCommand {
                payment_method: PaymentMethod::Wechat,
                ..command()
            })
            .await;

        assert!(matches!(
            result,
            Err(PaymentError::MethodNotConfigured(PaymentMethod::Wechat))
        ));
        let orders = f.orders.list_by_user(&UserRef::new("acct-42")).await.unwrap();
        assert!(orders.is_empty());
    }

    // ══════════════════════════════════════════════════════════════
    // Reconciliation via status query
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn reconcile_confirms_paid_order_and_activates() {
        let f = fixture(
            FakeGateway::redirect(PaymentMethod::Epay).with_query(Ok(GatewayOrderStatus::Paid {
                transaction_id: "TXN-9".to_string(),
            })),
        );
        let created = f.service.create_order(command()).await.unwrap();

        let result = f.service.reconcile(&created.order.order_no).await.unwrap();

        let ReconcileResult::Transitioned(outcome) = result else {
            panic!("expected a transition");
        };
        assert_eq!(outcome.effect, TransitionEffect::Applied);
        assert_eq!(outcome.activation, Some(ActivationStatus::Granted));
        assert_eq!(f.memberships.grant_count(), 1);
    }

    #[tokio::test]
    async fn reconcile_leaves_pending_order_alone() {
        let f = fixture(
            FakeGateway::redirect(PaymentMethod::Epay)
                .with_query(Ok(GatewayOrderStatus::Pending)),
        );
        let created = f.service.create_order(command()).await.unwrap();

        let result = f.service.reconcile(&created.order.order_no).await.unwrap();

        assert!(matches!(result, ReconcileResult::Unchanged(_)));
        let stored = f.orders.get(&created.order.order_no).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(stored.version, 1);
    }

    #[tokio::test]
    async fn reconcile_marks_failed_order() {
        let f = fixture(
            FakeGateway::redirect(PaymentMethod::Epay)
                .with_query(Ok(GatewayOrderStatus::Failed)),
        );
        let created = f.service.create_order(command()).await.unwrap();

        f.service.reconcile(&created.order.order_no).await.unwrap();

        let stored = f.orders.get(&created.order.order_no).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Failed);
        assert_eq!(f.memberships.grant_count(), 0);
    }

    #[tokio::test]
    async fn reconcile_surfaces_unsupported_query() {
        let f = fixture(FakeGateway::redirect(PaymentMethod::Epay));
        let created = f.service.create_order(command()).await.unwrap();

        let result = f.service.reconcile(&created.order.order_no).await;

        assert!(matches!(
            result,
            Err(PaymentError::GatewayNotSupported(_))
        ));
    }

    // ══════════════════════════════════════════════════════════════
    // Claim-paid and refund
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn claim_paid_moves_order_to_awaiting_confirmation() {
        let f = fixture(FakeGateway::redirect(PaymentMethod::Epay));
        let created = f.service.create_order(command()).await.unwrap();

        f.service.claim_paid(&created.order.order_no).await.unwrap();

        let stored = f.orders.get(&created.order.order_no).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::AwaitingConfirmation);
        assert_eq!(f.memberships.grant_count(), 0);
    }

    #[tokio::test]
    async fn refund_requires_paid_order() {
        let f = fixture(FakeGateway::redirect(PaymentMethod::Epay));
        let created = f.service.create_order(command()).await.unwrap();

        let result = f.service.refund(&created.order.order_no).await;

        assert!(matches!(
            result,
            Err(PaymentError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn notify_urls_are_per_provider() {
        let f = fixture(FakeGateway::redirect(PaymentMethod::Epay));
        assert_eq!(
            f.service.notify_url(PaymentMethod::Wechat),
            "https://shop.example.com/api/payment/notify/wechat"
        );
        assert_eq!(
            f.service.notify_url(PaymentMethod::Epay),
            "https://shop.example.com/api/payment/notify/epay"
        );
    }
}
