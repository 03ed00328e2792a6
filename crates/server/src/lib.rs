pub mod errors;
pub mod routes;
pub mod session;
pub mod startup;
pub mod views;

pub use routes::auth::ServerState;
pub use startup::{build_state, run};
