use std::sync::Arc;

use hub::Hub;
use ledger::PgLedger;

/// Shared application state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<PgLedger>,
    pub hub: Hub,
}
