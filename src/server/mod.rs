mod handlers;
mod models;
mod page;
mod state;
mod translate;

pub use handlers::{router, run_server};
pub use state::{Backend, ServerState};
