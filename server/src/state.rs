use std::sync::Arc;

use batchconv::{JobCoordinator, ServiceConfig};

/// Shared application state available to all handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<JobCoordinator>,
    pub service: Arc<ServiceConfig>,
}

impl AppState {
    pub fn new(service: ServiceConfig) -> Self {
        let coordinator = JobCoordinator::from_config(&service);
        Self::with_coordinator(service, coordinator)
    }

    pub fn with_coordinator(service: ServiceConfig, coordinator: JobCoordinator) -> Self {
        Self {
            coordinator: Arc::new(coordinator),
            service: Arc::new(service),
        }
    }
}
