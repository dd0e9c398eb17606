pub mod chat;
pub mod files;
pub mod health;
pub mod state;
pub mod threads;

pub use state::AppState;
