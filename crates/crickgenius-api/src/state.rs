use std::sync::Arc;

use crickgenius_assistant::generator::ResponseGenerator;
use crickgenius_db::Database;

use crate::session::SessionConfig;

pub type AppState = Arc<AppStateInner>;

/// Everything a handler needs, built once at startup.
pub struct AppStateInner {
    pub db: Database,
    pub generator: ResponseGenerator,
    pub session: SessionConfig,
}
