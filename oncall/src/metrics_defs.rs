//! Metrics definitions for the on-call service.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CACHE_HIT: MetricDef = MetricDef {
    name: "cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of memoized lookups served from a live or in-flight entry",
};

pub const CACHE_MISS: MetricDef = MetricDef {
    name: "cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of memoized lookups which started a new computation",
};

pub const CACHE_PURGED: MetricDef = MetricDef {
    name: "cache.purged",
    metric_type: MetricType::Counter,
    description: "Number of entries removed after their hard expiry",
};

pub const PAGERDUTY_REQUEST_DURATION: MetricDef = MetricDef {
    name: "pagerduty.request.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete a PagerDuty on-call query in seconds",
};

pub const REQUESTS: MetricDef = MetricDef {
    name: "requests",
    metric_type: MetricType::Counter,
    description: "Number of on-call requests handled, tagged by outcome",
};

pub const ALL_METRICS: &[MetricDef] = &[
    CACHE_HIT,
    CACHE_MISS,
    CACHE_PURGED,
    PAGERDUTY_REQUEST_DURATION,
    REQUESTS,
];
