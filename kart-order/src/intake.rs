use kart_core::models::{CartItem, LineItem, NewOrder, Order, PaymentMode, ShippingAddress};
use kart_core::repository::{OrderRepository, RepositoryError};
use kart_core::AuthContext;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// A checkout as submitted by the storefront.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutInput {
    pub idempotency_key: String,
    /// Minor units
    pub amount: i64,
    pub currency: String,
    pub cart_items: Vec<CartItem>,
    pub customer_id: String,
    pub shipping_address: ShippingAddress,
    pub payment_mode: PaymentMode,
}

#[derive(Debug, Clone)]
pub struct IntakeOutcome {
    pub order: Order,
    pub line_items: Vec<LineItem>,
    /// The idempotency key matched an earlier checkout; nothing was written.
    pub replayed: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("Missing auth context")]
    MissingAuth,
    #[error("Invalid checkout: {0}")]
    Invalid(String),
    #[error("Idempotency key {0} is already in use")]
    KeyConflict(String),
    #[error("Failed to persist order: {0}")]
    Persistence(#[from] RepositoryError),
}

/// Validates a checkout and persists the order with its line items.
pub struct OrderIntake {
    repo: Arc<dyn OrderRepository>,
}

impl OrderIntake {
    pub fn new(repo: Arc<dyn OrderRepository>) -> Self {
        Self { repo }
    }

    /// The order row is mandatory; line items are written after it and their
    /// failure is logged while the created order is still returned.
    pub async fn create_order(
        &self,
        input: &CheckoutInput,
        auth: Option<&AuthContext>,
    ) -> Result<IntakeOutcome, IntakeError> {
        let auth = auth.ok_or(IntakeError::MissingAuth)?;
        validate(input)?;

        let existing = self
            .repo
            .find_by_idempotency_key(auth, &input.customer_id, &input.idempotency_key)
            .await?;
        if let Some(existing) = existing {
            return self.replay(auth, existing).await;
        }

        let new_order = NewOrder {
            id: Uuid::new_v4(),
            idempotency_key: input.idempotency_key.clone(),
            customer_id: input.customer_id.clone(),
            amount: input.amount,
            currency: input.currency.to_uppercase(),
            payment_method: input.payment_mode,
            shipping_address: input.shipping_address.clone(),
        };

        let cart_total: Decimal = input
            .cart_items
            .iter()
            .map(|item| item.price * Decimal::from(item.quantity))
            .sum();
        if cart_total != new_order.total_amount() {
            warn!(
                idempotency_key = %input.idempotency_key,
                amount = %new_order.total_amount(),
                cart_total = %cart_total,
                "Checkout amount differs from cart total"
            );
        }

        let order = match self.repo.insert_order(auth, &new_order).await {
            Ok(order) => order,
            Err(RepositoryError::DuplicateKey(key)) => {
                // lost a race with a concurrent retry of the same checkout
                let existing = self
                    .repo
                    .find_by_idempotency_key(auth, &input.customer_id, &key)
                    .await?;
                return match existing {
                    Some(existing) => self.replay(auth, existing).await,
                    None => {
                        warn!(
                            customer_id = %input.customer_id,
                            idempotency_key = %key,
                            "Idempotency key taken by an order this caller cannot read"
                        );
                        Err(IntakeError::KeyConflict(key))
                    }
                };
            }
            Err(e) => {
                error!(customer_id = %input.customer_id, error = %e, "Order insert failed");
                return Err(e.into());
            }
        };

        let line_items: Vec<LineItem> = input
            .cart_items
            .iter()
            .enumerate()
            .map(|(position, item)| LineItem::snapshot(order.id, position as i32, item))
            .collect();

        let line_items = match self.repo.insert_line_items(auth, order.id, &line_items).await {
            Ok(()) => line_items,
            Err(e) => {
                error!(
                    order_id = %order.id,
                    error = %e,
                    "Line item insert failed, order kept without items"
                );
                Vec::new()
            }
        };

        info!(
            order_id = %order.id,
            customer_id = %order.customer_id,
            payment_method = %order.payment_method,
            items = line_items.len(),
            "Order created"
        );

        Ok(IntakeOutcome {
            order,
            line_items,
            replayed: false,
        })
    }

    async fn replay(&self, auth: &AuthContext, order: Order) -> Result<IntakeOutcome, IntakeError> {
        info!(order_id = %order.id, "Checkout replayed for existing idempotency key");
        let line_items = self.repo.list_line_items(auth, order.id).await?;
        Ok(IntakeOutcome {
            order,
            line_items,
            replayed: true,
        })
    }
}

fn validate(input: &CheckoutInput) -> Result<(), IntakeError> {
    if input.idempotency_key.trim().is_empty() {
        return Err(IntakeError::Invalid("idempotency_key is required".into()));
    }
    if input.amount <= 0 {
        return Err(IntakeError::Invalid("amount must be positive".into()));
    }
    if input.currency.len() != 3 || !input.currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(IntakeError::Invalid(format!("unsupported currency: {}", input.currency)));
    }
    if input.customer_id.trim().is_empty() {
        return Err(IntakeError::Invalid("customer_id is required".into()));
    }
    if input.cart_items.is_empty() {
        return Err(IntakeError::Invalid("cart is empty".into()));
    }
    if let Some(item) = input.cart_items.iter().find(|i| i.quantity < 1) {
        return Err(IntakeError::Invalid(format!(
            "quantity must be at least 1 for product {}",
            item.product_id
        )));
    }
    if let Some(item) = input.cart_items.iter().find(|i| i.price.is_sign_negative()) {
        return Err(IntakeError::Invalid(format!(
            "negative price for product {}",
            item.product_id
        )));
    }
    Ok(())
}
