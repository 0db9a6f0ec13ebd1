use prometheus::{Encoder, TextEncoder};

use crate::metrics::REGISTRY;

/// Render every registered metric in the Prometheus text exposition format.
pub fn gather_text() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer)?;

    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{self, GROUPS_UPLOADED_TOTAL};

    #[test]
    fn test_gather_contains_freezer_metrics() {
        metrics::init();
        GROUPS_UPLOADED_TOTAL.inc();

        let text = gather_text().unwrap();
        assert!(text.contains("freezer_groups_uploaded_total"));
    }
}
