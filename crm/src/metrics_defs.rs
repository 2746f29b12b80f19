//! Metrics definitions for the CRM client.

use shared::metrics_defs::{MetricDef, MetricType};

pub const CRM_REQUESTS: MetricDef = MetricDef {
    name: "crm.requests",
    metric_type: MetricType::Counter,
    description: "Number of requests sent to the CRM. Tagged with operation, outcome.",
};

pub const CRM_REQUEST_DURATION: MetricDef = MetricDef {
    name: "crm.request.duration",
    metric_type: MetricType::Histogram,
    description: "CRM request duration in seconds. Tagged with operation.",
};

pub const CRM_TAG_PAGES: MetricDef = MetricDef {
    name: "crm.tags.pages",
    metric_type: MetricType::Histogram,
    description: "Number of pages fetched to list all tags",
};

pub const ALL_METRICS: &[MetricDef] = &[CRM_REQUESTS, CRM_REQUEST_DURATION, CRM_TAG_PAGES];
