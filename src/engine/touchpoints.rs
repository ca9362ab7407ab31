//! Touchpoint ledger: append-only interaction log with filtered views
//! and rollup statistics.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::domain::{NewTouchpoint, Sentiment, Touchpoint, TouchpointFilter, TouchpointType};
use crate::error::Result;
use crate::store::Store;

/// Touchpoints recorded on one calendar day.
#[derive(Debug, Clone)]
pub struct DayGroup {
    pub date: NaiveDate,
    pub touchpoints: Vec<Touchpoint>,
}

/// Rollup over a set of touchpoints.
#[derive(Debug, Clone, Default)]
pub struct TouchpointStats {
    pub total: usize,
    pub positive: usize,
    pub follow_ups_required: usize,
    pub most_common_type: Option<TouchpointType>,
}

/// The append-only interaction ledger.
pub struct Ledger {
    store: Arc<Store>,
}

impl Ledger {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Record an interaction. The donor move link is resolved from the
    /// client's active move at write time; a touchpoint may exist for a
    /// client with no active pipeline entry.
    #[instrument(skip(self, new), fields(client = %new.client_id))]
    pub async fn record(&self, new: NewTouchpoint) -> Result<Touchpoint> {
        let donor_move_id = self
            .store
            .active_move_for_client(new.client_id)
            .await
            .map(|m| m.id);

        let now = Utc::now();
        let touchpoint = Touchpoint {
            id: Uuid::new_v4(),
            client_id: new.client_id,
            donor_move_id,
            cultivation_plan_id: new.cultivation_plan_id,
            cultivation_task_id: new.cultivation_task_id,
            touchpoint_type: new.touchpoint_type,
            touchpoint_date: new.touchpoint_date.unwrap_or(now),
            direction: new.direction,
            subject: new.subject,
            description: new.description,
            outcome: new.outcome,
            sentiment: new.sentiment,
            engagement_level: new.engagement_level,
            follow_up_required: new.follow_up_required,
            follow_up_date: new.follow_up_date,
            follow_up_notes: new.follow_up_notes,
            recorded_by: new.recorded_by,
            related_donation_id: new.related_donation_id,
            related_activity_id: new.related_activity_id,
            attachments: new.attachments,
            created_at: now,
            updated_at: now,
        };

        let touchpoint = self.store.append_touchpoint(touchpoint).await?;
        info!(
            touchpoint_id = %touchpoint.id,
            touchpoint_type = touchpoint.touchpoint_type.as_str(),
            "touchpoint recorded"
        );
        Ok(touchpoint)
    }

    pub async fn get(&self, id: Uuid) -> Result<Touchpoint> {
        self.store.get_touchpoint(id).await
    }

    /// Touchpoints within the trailing window, filtered, newest first.
    pub async fn query_recent(
        &self,
        window_days: i64,
        filter: &TouchpointFilter,
    ) -> Vec<Touchpoint> {
        self.query_recent_at(Utc::now(), window_days, filter).await
    }

    /// `query_recent` against an explicit "now".
    pub async fn query_recent_at(
        &self,
        now: DateTime<Utc>,
        window_days: i64,
        filter: &TouchpointFilter,
    ) -> Vec<Touchpoint> {
        let cutoff = now - Duration::days(window_days);
        let mut result: Vec<Touchpoint> = self
            .store
            .list_touchpoints()
            .await
            .into_iter()
            .filter(|t| t.touchpoint_date >= cutoff && t.touchpoint_date <= now)
            .filter(|t| filter.matches(t))
            .collect();
        result.sort_by(|a, b| b.touchpoint_date.cmp(&a.touchpoint_date));
        result
    }

    /// All touchpoints for one client, newest first.
    pub async fn for_client(&self, client_id: Uuid) -> Vec<Touchpoint> {
        let mut result: Vec<Touchpoint> = self
            .store
            .list_touchpoints()
            .await
            .into_iter()
            .filter(|t| t.client_id == client_id)
            .collect();
        result.sort_by(|a, b| b.touchpoint_date.cmp(&a.touchpoint_date));
        result
    }
}

/// Group touchpoints by calendar day for timeline rendering, newest day
/// first. Within a day the input order is preserved.
pub fn timeline(touchpoints: &[Touchpoint]) -> Vec<DayGroup> {
    let mut groups: Vec<DayGroup> = Vec::new();
    for t in touchpoints {
        let date = t.touchpoint_date.date_naive();
        match groups.iter_mut().find(|g| g.date == date) {
            Some(group) => group.touchpoints.push(t.clone()),
            None => groups.push(DayGroup {
                date,
                touchpoints: vec![t.clone()],
            }),
        }
    }
    groups.sort_by(|a, b| b.date.cmp(&a.date));
    groups
}

/// Rollup statistics over a set of touchpoints.
///
/// The most common type is decided by count; on a tie the first type to
/// reach the winning count in the input order wins.
pub fn stats(touchpoints: &[Touchpoint]) -> TouchpointStats {
    let mut counts: HashMap<TouchpointType, usize> = HashMap::new();
    let mut most_common: Option<TouchpointType> = None;
    let mut best = 0;

    let mut positive = 0;
    let mut follow_ups = 0;

    for t in touchpoints {
        if t.sentiment == Some(Sentiment::Positive) {
            positive += 1;
        }
        if t.follow_up_required {
            follow_ups += 1;
        }
        let count = counts.entry(t.touchpoint_type).or_insert(0);
        *count += 1;
        if *count > best {
            best = *count;
            most_common = Some(t.touchpoint_type);
        }
    }

    TouchpointStats {
        total: touchpoints.len(),
        positive,
        follow_ups_required: follow_ups,
        most_common_type: most_common,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Direction;

    fn touchpoint(
        tp_type: TouchpointType,
        date: DateTime<Utc>,
        sentiment: Option<Sentiment>,
        follow_up: bool,
    ) -> Touchpoint {
        Touchpoint {
            id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            donor_move_id: None,
            cultivation_plan_id: None,
            cultivation_task_id: None,
            touchpoint_type: tp_type,
            touchpoint_date: date,
            direction: Direction::Outbound,
            subject: None,
            description: None,
            outcome: None,
            sentiment,
            engagement_level: None,
            follow_up_required: follow_up,
            follow_up_date: None,
            follow_up_notes: None,
            recorded_by: None,
            related_donation_id: None,
            related_activity_id: None,
            attachments: Vec::new(),
            created_at: date,
            updated_at: date,
        }
    }

    #[test]
    fn test_stats_counts() {
        let now = Utc::now();
        let set = vec![
            touchpoint(TouchpointType::Call, now, Some(Sentiment::Positive), false),
            touchpoint(TouchpointType::Email, now, Some(Sentiment::Neutral), true),
            touchpoint(TouchpointType::Call, now, Some(Sentiment::Negative), false),
        ];

        let s = stats(&set);
        assert_eq!(s.total, 3);
        assert_eq!(s.positive, 1);
        assert_eq!(s.follow_ups_required, 1);
        assert_eq!(s.most_common_type, Some(TouchpointType::Call));
    }

    #[test]
    fn test_stats_tie_break_first_to_reach_max() {
        let now = Utc::now();
        // call and email both end at 2; call reaches 2 first in input order.
        let set = vec![
            touchpoint(TouchpointType::Call, now, None, false),
            touchpoint(TouchpointType::Email, now, None, false),
            touchpoint(TouchpointType::Call, now, None, false),
            touchpoint(TouchpointType::Email, now, None, false),
        ];

        let s = stats(&set);
        assert_eq!(s.most_common_type, Some(TouchpointType::Call));
    }

    #[test]
    fn test_stats_empty() {
        let s = stats(&[]);
        assert_eq!(s.total, 0);
        assert_eq!(s.most_common_type, None);
    }

    #[test]
    fn test_timeline_groups_by_day() {
        let day1 = Utc::now();
        let day2 = day1 - Duration::days(1);
        let set = vec![
            touchpoint(TouchpointType::Call, day2, None, false),
            touchpoint(TouchpointType::Email, day1, None, false),
            touchpoint(TouchpointType::Meeting, day2, None, false),
        ];

        let groups = timeline(&set);
        assert_eq!(groups.len(), 2);
        // Newest day first.
        assert_eq!(groups[0].date, day1.date_naive());
        assert_eq!(groups[0].touchpoints.len(), 1);
        assert_eq!(groups[1].touchpoints.len(), 2);
    }
}
