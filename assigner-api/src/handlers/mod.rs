mod admin;
mod app;
mod assign;
mod error;

pub use app::add_routes;
pub use app::AppState;
