mod handlers;
mod server;

pub use server::{build_router, QueryServer, ServerState};
