use std::sync::Arc;

use crate::alerts::AlertManager;
use crate::engine::Engine;
use crate::ws::WsGateway;

/// Shared handle every handler reads from. Holds no business logic itself;
/// `engine` and `alert_manager` do.
pub struct AppState {
    pub engine: Arc<Engine>,
    pub alert_manager: Arc<AlertManager>,
    pub ws_gateway: Arc<WsGateway>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>, alert_manager: Arc<AlertManager>, ws_gateway: Arc<WsGateway>) -> Self {
        Self {
            engine,
            alert_manager,
            ws_gateway,
        }
    }
}
