use std::sync::Arc;

use crate::{gateway::StkGateway, payment::registry::Payments};

#[derive(Clone, axum::extract::FromRef)]
pub struct AppState {
    pub gateway: Arc<dyn StkGateway>,
    pub payments: Payments,
}

impl AppState {
    pub fn new(gateway: Arc<dyn StkGateway>) -> Self {
        Self {
            gateway,
            payments: Payments::default(),
        }
    }
}
