pub mod health;
pub mod metrics;
pub mod resource;
pub mod shared;
pub mod system;

pub use health::{health_check, healthz};
pub use metrics::{metrics_handler, setup_metrics_recorder, MetricsState};
