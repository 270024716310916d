pub mod app;
pub mod basket_handlers;
pub mod config;
pub mod directory;
pub mod invitation_handlers;
pub mod invitations;
pub mod merchant_handlers;
pub mod metrics;
pub mod middleware;
pub mod notifications;
pub mod repo;
pub mod store_handlers;
pub mod tokens;
pub mod user_handlers;

pub use app::{build_router, AppState, Backends};
