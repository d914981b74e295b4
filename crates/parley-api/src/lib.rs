pub mod auth;
pub mod channels;
pub mod dm_groups;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod users;
pub mod workspaces;

use std::sync::Arc;

use parley_db::Database;
use parley_gateway::dispatcher::Dispatcher;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub dispatcher: Dispatcher,
}
