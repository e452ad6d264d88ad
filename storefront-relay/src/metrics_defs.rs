use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with method (GET, POST, OPTIONS or other).",
};

pub const REQUESTS: MetricDef = MetricDef {
    name: "requests",
    metric_type: MetricType::Counter,
    description: "Handled requests. Tagged with status.",
};

pub const UPSTREAM_QUERIES: MetricDef = MetricDef {
    name: "upstream.queries",
    metric_type: MetricType::Counter,
    description: "Queries relayed to the Storefront API. Tagged with query_type, success.",
};

pub const TELEMETRY_FAILURES: MetricDef = MetricDef {
    name: "telemetry.failures",
    metric_type: MetricType::Counter,
    description: "Telemetry records that could not be delivered",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    REQUESTS,
    UPSTREAM_QUERIES,
    TELEMETRY_FAILURES,
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_all_metrics_are_distinct_and_cover_every_type() {
        let names: HashSet<_> = ALL_METRICS.iter().map(|def| def.name).collect();
        assert_eq!(names.len(), ALL_METRICS.len());

        let types: HashSet<_> = ALL_METRICS.iter().map(|def| def.metric_type).collect();
        assert!(types.contains(&MetricType::Counter));
        assert!(types.contains(&MetricType::Histogram));
        assert_eq!(types.len(), 2);
    }
}
