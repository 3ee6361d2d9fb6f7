//! Metrics definitions for the gate.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CACHE_HIT: MetricDef = MetricDef {
    name: "gate.cache.hit",
    metric_type: MetricType::Counter,
    description: "Number of launches served from the cached destination",
};

pub const CACHE_MISS: MetricDef = MetricDef {
    name: "gate.cache.miss",
    metric_type: MetricType::Counter,
    description: "Number of launches with no usable cached destination",
};

pub const CACHE_WRITE: MetricDef = MetricDef {
    name: "gate.cache.write",
    metric_type: MetricType::Counter,
    description: "Number of resolved destinations written to the cache",
};

pub const PUSH_TOKEN_TIMEOUT: MetricDef = MetricDef {
    name: "gate.params.push_token_timeout",
    metric_type: MetricType::Counter,
    description: "Number of runs that gave up waiting for the push token",
};

pub const OUTCOME: MetricDef = MetricDef {
    name: "gate.outcome",
    metric_type: MetricType::Counter,
    description: "Committed gate outcomes, tagged by outcome and failure kind",
};

pub const LATE_RESULT_DISCARDED: MetricDef = MetricDef {
    name: "gate.late_result_discarded",
    metric_type: MetricType::Counter,
    description: "Pipeline results that arrived after the deadline had committed",
};

pub const RESOLVE_DURATION: MetricDef = MetricDef {
    name: "gate.resolve.duration",
    metric_type: MetricType::Histogram,
    description: "Time from launch to committed outcome in seconds",
};

pub const ALL_METRICS: &[MetricDef] = &[
    CACHE_HIT,
    CACHE_MISS,
    CACHE_WRITE,
    PUSH_TOKEN_TIMEOUT,
    OUTCOME,
    LATE_RESULT_DISCARDED,
    RESOLVE_DURATION,
];
