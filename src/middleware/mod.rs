pub mod enforcement;
pub mod metrics;
pub mod request_id;

pub use enforcement::enforce;
pub use metrics::metrics_middleware;
pub use request_id::{request_id_middleware, RequestId};
