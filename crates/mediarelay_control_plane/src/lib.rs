pub mod app;

pub use app::{build_router, serve, LIVENESS_BODY};
