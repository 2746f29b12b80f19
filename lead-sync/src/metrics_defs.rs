use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Request duration in seconds. Tagged with status.",
};

pub const REQUESTS_INFLIGHT: MetricDef = MetricDef {
    name: "requests.inflight",
    metric_type: MetricType::Gauge,
    description: "Number of requests currently being processed",
};

pub const SYNC_FAILURES: MetricDef = MetricDef {
    name: "sync.failures",
    metric_type: MetricType::Counter,
    description: "Number of failed sync requests. Tagged with kind.",
};

pub const CONTACTS_CREATED: MetricDef = MetricDef {
    name: "sync.contacts.created",
    metric_type: MetricType::Counter,
    description: "Number of contacts created in the CRM",
};

pub const TAGS_CREATED: MetricDef = MetricDef {
    name: "sync.tags.created",
    metric_type: MetricType::Counter,
    description: "Number of tags created in the CRM",
};

pub const TAG_ISSUES: MetricDef = MetricDef {
    name: "sync.tags.issues",
    metric_type: MetricType::Counter,
    description: "Tag operations skipped under the lenient policy. Tagged with stage.",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    REQUESTS_INFLIGHT,
    SYNC_FAILURES,
    CONTACTS_CREATED,
    TAGS_CREATED,
    TAG_ISSUES,
];
