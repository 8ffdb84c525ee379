//! Dependency health probe.
//!
//! | Component | `ok` | otherwise |
//! |-----------|------|-----------|
//! | `CSV` | a live source answered | `degraded` (fallback data served) |
//! | `Claude` | summary call succeeded | `fail` |

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::feed::{FeedFetcher, FeedOrigin};
use crate::summary::{SummaryGenerator, Verbosity};
use crate::{Metric, UtcDateTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Ok,
    Degraded,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    pub name: &'static str,
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub ok: bool,
    pub timestamp: UtcDateTime,
    pub components: Vec<ComponentHealth>,
}

impl HealthReport {
    fn from_components(components: Vec<ComponentHealth>) -> Self {
        Self {
            ok: components
                .iter()
                .all(|component| component.status == ComponentStatus::Ok),
            timestamp: UtcDateTime::now(),
            components,
        }
    }

    pub fn component(&self, name: &str) -> Option<&ComponentHealth> {
        self.components
            .iter()
            .find(|component| component.name == name)
    }

    /// 503 only when the feed is degraded and the summary API failed too.
    pub fn status_code(&self) -> u16 {
        let csv_degraded = self
            .component(CSV_COMPONENT)
            .is_some_and(|component| component.status != ComponentStatus::Ok);
        let summary_failed = self
            .component(SUMMARY_COMPONENT)
            .is_some_and(|component| component.status != ComponentStatus::Ok);
        if csv_degraded && summary_failed {
            503
        } else {
            200
        }
    }
}

pub const CSV_COMPONENT: &str = "CSV";
pub const SUMMARY_COMPONENT: &str = "Claude";

#[derive(Clone)]
pub struct HealthProbe {
    fetcher: FeedFetcher,
    summarizer: Arc<dyn SummaryGenerator>,
    summary_timeout: Duration,
}

impl HealthProbe {
    pub fn new(
        fetcher: FeedFetcher,
        summarizer: Arc<dyn SummaryGenerator>,
        summary_timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            summarizer,
            summary_timeout,
        }
    }

    /// Probes the feed and the summary API concurrently.
    pub async fn run(&self) -> HealthReport {
        let (feed, summary) = tokio::join!(self.probe_feed(), self.probe_summary());
        HealthReport::from_components(vec![feed, summary])
    }

    async fn probe_feed(&self) -> ComponentHealth {
        let outcome = self.fetcher.fetch_with_report().await;
        match outcome.origin {
            FeedOrigin::Live { source } => ComponentHealth {
                name: CSV_COMPONENT,
                status: ComponentStatus::Ok,
                detail: Some(source),
            },
            FeedOrigin::Fallback => ComponentHealth {
                name: CSV_COMPONENT,
                status: ComponentStatus::Degraded,
                detail: outcome.failures.last().map(ToString::to_string),
            },
        }
    }

    async fn probe_summary(&self) -> ComponentHealth {
        let call = self
            .summarizer
            .summarize(Metric::F1Score, &[], Verbosity::Brief);
        let failure = match tokio::time::timeout(self.summary_timeout, call).await {
            Ok(Ok(_)) => {
                return ComponentHealth {
                    name: SUMMARY_COMPONENT,
                    status: ComponentStatus::Ok,
                    detail: None,
                }
            }
            Ok(Err(error)) => error.to_string(),
            Err(_) => format!(
                "summary timed out after {}ms",
                self.summary_timeout.as_millis()
            ),
        };
        warn!(error = %failure, "summary health probe failed");
        ComponentHealth {
            name: SUMMARY_COMPONENT,
            status: ComponentStatus::Fail,
            detail: Some(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(name: &'static str, status: ComponentStatus) -> ComponentHealth {
        ComponentHealth {
            name,
            status,
            detail: None,
        }
    }

    #[test]
    fn unavailable_only_when_both_components_are_down() {
        let both_down = HealthReport::from_components(vec![
            component(CSV_COMPONENT, ComponentStatus::Degraded),
            component(SUMMARY_COMPONENT, ComponentStatus::Fail),
        ]);
        let feed_down = HealthReport::from_components(vec![
            component(CSV_COMPONENT, ComponentStatus::Degraded),
            component(SUMMARY_COMPONENT, ComponentStatus::Ok),
        ]);
        let all_up = HealthReport::from_components(vec![
            component(CSV_COMPONENT, ComponentStatus::Ok),
            component(SUMMARY_COMPONENT, ComponentStatus::Ok),
        ]);

        assert_eq!((both_down.ok, both_down.status_code()), (false, 503));
        assert_eq!((feed_down.ok, feed_down.status_code()), (false, 200));
        assert_eq!((all_up.ok, all_up.status_code()), (true, 200));
    }

    #[test]
    fn statuses_serialize_lowercase() {
        let value =
            serde_json::to_value(component(CSV_COMPONENT, ComponentStatus::Degraded)).expect("json");
        assert_eq!(value["name"], "CSV");
        assert_eq!(value["status"], "degraded");
    }
}
