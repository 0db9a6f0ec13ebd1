//! Freezer Observability
//!
//! Prometheus metrics for the remote freezer: write-path throughput, read
//! path hit rates, remote store latency and the frozen/buffered gauges.
//!
//! # Usage
//!
//! ```no_run
//! use freezer_observability::{exporter, metrics};
//!
//! metrics::init();
//! let text = exporter::gather_text().unwrap();
//! println!("{text}");
//! ```

pub mod exporter;
pub mod metrics;

pub use exporter::gather_text;
pub use metrics::{init, REGISTRY};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_does_not_panic() {
        init();
    }

    #[test]
    fn test_registry_accessible() {
        init();
        let _registry = &*REGISTRY;
    }

    #[test]
    fn test_double_init_is_safe() {
        init();
        init();
    }
}
