use std::sync::Arc;

use crate::{config::Settings, service::ServiceContext};

#[derive(Clone)]
pub struct AppState {
    pub context: Arc<ServiceContext>,
    pub settings: Arc<Settings>,
}

impl AppState {
    pub fn new(context: Arc<ServiceContext>, settings: Arc<Settings>) -> Self {
        Self { context, settings }
    }
}
