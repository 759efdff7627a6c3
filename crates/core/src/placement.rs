use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pod::{ObjectKey, Pod, POD_SCHEDULED};

/// The scheduling-relevant view of one pod.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementRecord {
    pub key: ObjectKey,
    pub created_at: Option<DateTime<Utc>>,
    /// The `PodScheduled` condition, if the pod carries one.
    pub scheduled: Option<ScheduledCondition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledCondition {
    pub status: String,
    pub transitioned_at: Option<DateTime<Utc>>,
}

impl PlacementRecord {
    pub fn from_pod(pod: &Pod) -> Self {
        let scheduled = pod.condition(POD_SCHEDULED).map(|c| ScheduledCondition {
            status: c.status.clone(),
            transitioned_at: c.last_transition_time,
        });
        Self {
            key: pod.key(),
            created_at: pod.metadata.creation_timestamp,
            scheduled,
        }
    }

    /// Whether the scheduled condition is present and `True`.
    pub fn is_scheduled(&self) -> bool {
        self.scheduled.as_ref().is_some_and(|c| c.status == "True")
    }

    /// Time from creation to the scheduled transition.
    ///
    /// `None` for unscheduled pods. Missing timestamps and transitions that
    /// precede creation (clock skew between API servers) yield zero.
    pub fn scheduling_latency(&self) -> Option<Duration> {
        if !self.is_scheduled() {
            return None;
        }
        let transitioned = self.scheduled.as_ref().and_then(|c| c.transitioned_at);
        let latency = match (self.created_at, transitioned) {
            (Some(created), Some(transitioned)) => {
                (transitioned - created).to_std().unwrap_or(Duration::ZERO)
            }
            _ => Duration::ZERO,
        };
        Some(latency)
    }
}

impl From<&Pod> for PlacementRecord {
    fn from(pod: &Pod) -> Self {
        Self::from_pod(pod)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pod::{PodCondition, PodStatus};
    use chrono::TimeZone;

    fn pod_with_condition(status: &str, created_s: i64, transition_s: i64) -> Pod {
        let mut pod = Pod::named("bench", "probe-0");
        pod.metadata.creation_timestamp = Some(Utc.timestamp_opt(created_s, 0).unwrap());
        pod.status = Some(PodStatus {
            conditions: vec![PodCondition {
                condition_type: POD_SCHEDULED.to_string(),
                status: status.to_string(),
                last_transition_time: Some(Utc.timestamp_opt(transition_s, 0).unwrap()),
                reason: None,
                message: None,
            }],
            ..Default::default()
        });
        pod
    }

    #[test]
    fn test_scheduled_latency() {
        let record = PlacementRecord::from_pod(&pod_with_condition("True", 100, 103));
        assert!(record.is_scheduled());
        assert_eq!(record.scheduling_latency(), Some(Duration::from_secs(3)));
        assert_eq!(record.key, ObjectKey::new("bench", "probe-0"));
    }

    #[test]
    fn test_false_condition_is_unscheduled() {
        let record = PlacementRecord::from_pod(&pod_with_condition("False", 100, 103));
        assert!(!record.is_scheduled());
        assert_eq!(record.scheduling_latency(), None);
    }

    #[test]
    fn test_missing_condition_is_unscheduled() {
        let record = PlacementRecord::from_pod(&Pod::named("bench", "bare"));
        assert!(record.scheduled.is_none());
        assert!(!record.is_scheduled());
    }

    #[test]
    fn test_clock_skew_clamps_to_zero() {
        let record = PlacementRecord::from_pod(&pod_with_condition("True", 200, 199));
        assert_eq!(record.scheduling_latency(), Some(Duration::ZERO));
    }
}
