pub mod metric_sender;
pub mod metrics;

pub use metric_sender::{MetricEventTx, MetricTx};
pub use metrics::{EventSource, Metric, MetricEvent};
