//! Metrics definitions for the Chevereto integration.

use shared::metrics_defs::{MetricDef, MetricType};

pub const PROBE_RESULT: MetricDef = MetricDef {
    name: "chevereto.probe.result",
    metric_type: MetricType::Counter,
    description: "Connectivity probes by classified result",
};

pub const UPLOAD_RESULT: MetricDef = MetricDef {
    name: "chevereto.upload.result",
    metric_type: MetricType::Counter,
    description: "Relayed uploads by outcome",
};

pub const UPLOAD_DURATION: MetricDef = MetricDef {
    name: "chevereto.upload.duration",
    metric_type: MetricType::Histogram,
    description: "Time spent sending an upload to Chevereto and reading its response, in seconds",
};

pub const SETTINGS_SAVED: MetricDef = MetricDef {
    name: "chevereto.settings.saved",
    metric_type: MetricType::Counter,
    description: "Number of accepted settings writes",
};

pub const ALL_METRICS: &[MetricDef] = &[PROBE_RESULT, UPLOAD_RESULT, UPLOAD_DURATION, SETTINGS_SAVED];
