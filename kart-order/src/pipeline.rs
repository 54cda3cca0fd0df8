use kart_core::models::{LineItem, Order, PaymentMode, ShipmentResult};
use kart_core::repository::{OrderRepository, RepositoryError};
use kart_core::{AuthContext, GatewayError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::intake::{CheckoutInput, IntakeError, OrderIntake};
use crate::payment::PaymentService;
use crate::reconciler::StatusReconciler;
use crate::shipment::{OrchestrationError, OrchestrationReport, ShipmentOrchestrator};

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutReceipt {
    pub order_id: Uuid,
    pub gateway_order_id: Option<String>,
    /// Present when a COD order was shipped during this call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment: Option<ShipmentResult>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyPaymentInput {
    pub order_id: Uuid,
    pub gateway_order_id: String,
    pub payment_id: String,
    pub signature: String,
}

#[derive(Debug, Clone)]
pub struct VerifiedPayment {
    pub order_id: Uuid,
    pub shipment: Option<ShipmentResult>,
    pub report: Option<OrchestrationReport>,
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Missing auth context")]
    MissingAuth,
    #[error("{0}")]
    Invalid(String),
    #[error("Idempotency key {0} is already in use")]
    Conflict(String),
    #[error("Payment signature mismatch")]
    InvalidSignature,
    #[error("Gateway order {0} does not belong to this order")]
    GatewayOrderMismatch(String),
    #[error("Order {0} is not paid through the gateway")]
    NotGatewayOrder(Uuid),
    #[error("Order not found: {0}")]
    NotFound(Uuid),
    #[error("Datastore failure: {0}")]
    Persistence(#[from] RepositoryError),
    #[error("Payment gateway failure: {0}")]
    PaymentGateway(#[from] GatewayError),
    #[error(transparent)]
    Shipment(#[from] OrchestrationError),
}

impl From<IntakeError> for PipelineError {
    fn from(err: IntakeError) -> Self {
        match err {
            IntakeError::MissingAuth => PipelineError::MissingAuth,
            IntakeError::Invalid(msg) => PipelineError::Invalid(msg),
            IntakeError::KeyConflict(key) => PipelineError::Conflict(key),
            IntakeError::Persistence(e) => PipelineError::Persistence(e),
        }
    }
}

/// Composes intake, payment, shipment and reconciliation per request.
pub struct PipelineCoordinator {
    repo: Arc<dyn OrderRepository>,
    intake: OrderIntake,
    payments: PaymentService,
    shipments: ShipmentOrchestrator,
    reconciler: StatusReconciler,
}

impl PipelineCoordinator {
    pub fn new(
        repo: Arc<dyn OrderRepository>,
        payments: PaymentService,
        shipments: ShipmentOrchestrator,
    ) -> Self {
        Self {
            intake: OrderIntake::new(repo.clone()),
            reconciler: StatusReconciler::new(repo.clone()),
            repo,
            payments,
            shipments,
        }
    }

    /// COD orders are shipped right away; online-payment orders get a gateway
    /// intent and ship once the payment is verified. Replaying a checkout with
    /// the same idempotency key finishes whatever the first attempt left undone.
    pub async fn checkout(
        &self,
        input: &CheckoutInput,
        auth: Option<&AuthContext>,
    ) -> Result<CheckoutReceipt, PipelineError> {
        let outcome = self.intake.create_order(input, auth).await?;
        let auth = auth.ok_or(PipelineError::MissingAuth)?;
        let mut order = outcome.order;

        match order.payment_method {
            PaymentMode::Cod => {
                let shipment = if order.shipments.is_empty() {
                    self.ship(auth, &order, &outcome.line_items)
                        .await?
                        .map(|(result, _)| result)
                } else {
                    None
                };
                Ok(CheckoutReceipt {
                    order_id: order.id,
                    gateway_order_id: None,
                    shipment,
                })
            }
            PaymentMode::Gateway => {
                if order.gateway_order_id.is_none() {
                    let receipt = order.id.to_string();
                    let intent = self
                        .payments
                        .create_intent(order.amount, &order.currency, &receipt)
                        .await?;
                    let stored = self.repo.set_gateway_order_id(auth, order.id, &intent.id).await;
                    if let Err(e) = stored {
                        error!(
                            order_id = %order.id,
                            gateway_order_id = %intent.id,
                            error = %e,
                            "Payment intent created but not stored on the order"
                        );
                        return Err(e.into());
                    }
                    order.gateway_order_id = Some(intent.id);
                }
                Ok(CheckoutReceipt {
                    order_id: order.id,
                    gateway_order_id: order.gateway_order_id,
                    shipment: None,
                })
            }
        }
    }

    /// Check the client's payment confirmation, mark the order paid and book
    /// its shipment. A bad signature leaves the order untouched, and so does a
    /// signature for any gateway order other than the one issued for this order.
    pub async fn verify_payment(
        &self,
        input: &VerifyPaymentInput,
        auth: Option<&AuthContext>,
    ) -> Result<VerifiedPayment, PipelineError> {
        let auth = auth.ok_or(PipelineError::MissingAuth)?;

        if !self
            .payments
            .verify(&input.gateway_order_id, &input.payment_id, &input.signature)
        {
            warn!(
                order_id = %input.order_id,
                gateway_order_id = %input.gateway_order_id,
                "Payment signature mismatch"
            );
            return Err(PipelineError::InvalidSignature);
        }

        let order = self
            .repo
            .get_order(auth, input.order_id)
            .await?
            .ok_or(PipelineError::NotFound(input.order_id))?;

        if order.payment_method != PaymentMode::Gateway {
            warn!(order_id = %order.id, "Payment confirmation sent for a COD order");
            return Err(PipelineError::NotGatewayOrder(order.id));
        }
        if order.gateway_order_id.as_deref() != Some(input.gateway_order_id.as_str()) {
            warn!(
                order_id = %order.id,
                expected = ?order.gateway_order_id,
                gateway_order_id = %input.gateway_order_id,
                "Payment confirmation is for another gateway order"
            );
            return Err(PipelineError::GatewayOrderMismatch(input.gateway_order_id.clone()));
        }

        if !order.is_paid() {
            self.repo.mark_paid(auth, order.id, &input.payment_id).await?;
            info!(order_id = %order.id, payment_id = %input.payment_id, "Payment verified");
        }

        if let Some(existing) = order.latest_shipment() {
            info!(
                order_id = %order.id,
                shipment_id = existing.shipment_id,
                "Order already shipped, nothing to do"
            );
            return Ok(VerifiedPayment {
                order_id: order.id,
                shipment: None,
                report: None,
            });
        }

        let items = self.repo.list_line_items(auth, order.id).await?;
        let (shipment, report) = match self.ship(auth, &order, &items).await? {
            Some((shipment, report)) => (Some(shipment), Some(report)),
            None => (None, None),
        };

        Ok(VerifiedPayment {
            order_id: order.id,
            shipment,
            report,
        })
    }

    /// Book the shipment unless another request already holds the order's
    /// shipping claim. The claim is released only when CREATE failed without
    /// possibly reaching the aggregator.
    async fn ship(
        &self,
        auth: &AuthContext,
        order: &Order,
        items: &[LineItem],
    ) -> Result<Option<(ShipmentResult, OrchestrationReport)>, PipelineError> {
        if !self.repo.claim_shipment(auth, order.id).await? {
            info!(order_id = %order.id, "Shipment already booked or in progress");
            return Ok(None);
        }

        let outcome = match self.shipments.run(order, items).await {
            Ok(outcome) => outcome,
            Err(OrchestrationError::CreateFailed(e)) => {
                if e.is_retryable() && !e.is_unsent() {
                    error!(
                        order_id = %order.id,
                        error = %e,
                        "Shipment may exist at the aggregator, claim kept for manual review"
                    );
                } else if let Err(release) =
                    self.repo.release_shipment_claim(auth, order.id).await
                {
                    error!(
                        order_id = %order.id,
                        error = %release,
                        "Failed to release shipping claim"
                    );
                }
                return Err(OrchestrationError::CreateFailed(e).into());
            }
        };

        self.reconciler
            .update(auth, order.id, &outcome.result, order.payment_method)
            .await;
        Ok(Some((outcome.result, outcome.report)))
    }
}
