use kart_core::Masked;
use kart_order::PipelineCoordinator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    /// `None` when payment or shipping credentials are missing from config;
    /// order endpoints then answer 500 instead of the process refusing to start.
    pub pipeline: Option<Arc<PipelineCoordinator>>,
    pub jwt_secret: Masked<String>,
}

impl AppState {
    pub fn new(pipeline: Option<Arc<PipelineCoordinator>>, jwt_secret: Masked<String>) -> Self {
        Self { pipeline, jwt_secret }
    }
}
