use std::{
    convert::Infallible,
    fmt::Debug,
    sync::{Arc, Mutex, PoisonError},
};

use crate::metrics::{Metric, MetricEvent};

use super::MetricEventTx;

#[derive(Default, Clone, Copy)]
pub struct MockMetricEventTx;

impl MockMetricEventTx {
    fn push_inner(&self, ev: impl Debug) {
        log::debug!("mock metric received: {ev:?}");
    }
}

impl MetricEventTx for MockMetricEventTx {
    type Error = Infallible;

    async fn push<M: Metric + Send + 'static>(
        &self,
        ev: MetricEvent<M>,
    ) -> Result<(), Self::Error> {
        self.push_inner(ev);

        Ok(())
    }
}

/// Keeps every received event as JSON, for assertions.
#[derive(Default, Clone)]
pub struct RecordingMetricEventTx {
    events: Arc<Mutex<Vec<serde_json::Value>>>,
}

impl RecordingMetricEventTx {
    pub fn events(&self) -> Vec<serde_json::Value> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn tags(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|ev| ev["tag"].as_str().map(str::to_string))
            .collect()
    }
}

impl MetricEventTx for RecordingMetricEventTx {
    type Error = serde_json::Error;

    async fn push<M: Metric + Send + 'static>(
        &self,
        ev: MetricEvent<M>,
    ) -> Result<(), Self::Error> {
        let value = serde_json::to_value(&ev)?;
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value);
        Ok(())
    }
}
