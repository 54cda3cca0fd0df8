pub mod intake;
pub mod payment;
pub mod pipeline;
pub mod reconciler;
pub mod shipment;
pub mod token_cache;

#[cfg(test)]
pub(crate) mod testing;

pub use intake::{CheckoutInput, IntakeError, OrderIntake};
#[cfg(any(test, feature = "test-support"))]
pub use payment::sign_payment;
pub use payment::PaymentService;
pub use pipeline::{
    CheckoutReceipt, PipelineCoordinator, PipelineError, VerifiedPayment, VerifyPaymentInput,
};
pub use reconciler::{derive_order_status, StatusReconciler};
pub use shipment::{
    OrchestrationError, OrchestrationReport, ShipmentOrchestrator, ShipmentOutcome,
    ShippingSettings, Stage, StageOutcome,
};
pub use token_cache::TokenCache;
