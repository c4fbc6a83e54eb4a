use std::sync::Arc;

use application::AccountService;

use crate::hub::Hub;
use crate::registry::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub account_service: Arc<AccountService>,
    pub hub: Arc<Hub>,
}

impl AppState {
    pub fn new(account_service: Arc<AccountService>, outbound_buffer: usize) -> Self {
        let hub = Hub::new(
            account_service.clone(),
            Arc::new(SessionRegistry::new()),
            outbound_buffer,
        );
        Self {
            account_service,
            hub: Arc::new(hub),
        }
    }
}
