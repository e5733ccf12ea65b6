//! Read side: daily rollup, day details, dashboard snapshot and city list.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use analytics_core::limits::RECENT_USERS_LIMIT;
use analytics_core::{
    compute_daily_metrics, is_placeholder, reconcile_day, DailyMetric, DashboardSnapshot, DateWindow, Error, FunnelStep,
    ReportingTimezone, Result, SelectedPlan, Session, SessionDetail, SnapshotStatus, TimeRange,
    FUNNEL_STEPS,
};
use analytics_store::{AnalyticsStore, QueryFilter};
use chrono::{Duration, NaiveDate};
use tracing::{debug, warn};
use uuid::Uuid;

/// Queries behind the dashboard endpoints.
#[derive(Clone)]
pub struct ReportingService {
    store: Arc<dyn AnalyticsStore>,
    tz: ReportingTimezone,
}

impl ReportingService {
    pub fn new(store: Arc<dyn AnalyticsStore>, tz: ReportingTimezone) -> Self {
        Self { store, tz }
    }

    pub fn timezone(&self) -> &ReportingTimezone {
        &self.tz
    }

    /// Per-day funnel metrics for the window, newest first.
    ///
    /// Sessions and users are filtered independently by the same window
    /// and city, then bucketed by reporting-timezone day.
    pub async fn daily_metrics(
        &self,
        window: &DateWindow,
        city: Option<&str>,
    ) -> Result<Vec<DailyMetric>> {
        let filter = QueryFilter::in_range(window.to_range(&self.tz)).with_city(city);

        let (sessions, users) = tokio::try_join!(
            self.store.query_sessions(&filter),
            self.store.query_users(&filter)
        )?;

        debug!(
            sessions = sessions.len(),
            users = users.len(),
            city = ?filter.city,
            "Computing daily metrics"
        );
        Ok(compute_daily_metrics(&sessions, &users, &self.tz))
    }

    /// Sessions and signups of one reporting-timezone day, merged.
    pub async fn day_details(&self, date: NaiveDate) -> Result<Vec<SessionDetail>> {
        let day = self.tz.day_range(date);
        let filter = QueryFilter::in_range(day);

        let (day_sessions, day_users) = tokio::try_join!(
            self.store.query_sessions(&filter),
            self.store.query_users(&filter)
        )?;

        let linked_ids: Vec<Uuid> = day_sessions
            .iter()
            .filter_map(|s| s.user_id)
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        let signup_ids: Vec<Uuid> = day_users.iter().map(|u| u.id).collect();

        // A signup's session may have started the day before.
        let lookback_from = day
            .from
            .map(|from| {
                from.checked_sub_signed(Duration::days(1))
                    .ok_or_else(|| Error::validation(format!("date {} out of range", date)))
            })
            .transpose()?;
        let nearby = QueryFilter::in_range(TimeRange {
            from: lookback_from,
            to: day.to,
        });

        let (linked_users, linked_sessions, nearby_sessions) = tokio::try_join!(
            self.store.users_by_ids(&linked_ids),
            self.store.sessions_by_user_ids(&signup_ids),
            async {
                if signup_ids.is_empty() {
                    Ok(Vec::new())
                } else {
                    self.store.query_sessions(&nearby).await
                }
            }
        )?;

        let signup_sessions = merge_sessions(linked_sessions, nearby_sessions);
        let details = reconcile_day(&day_sessions, &day_users, &linked_users, &signup_sessions);

        debug!(
            date = %date,
            sessions = day_sessions.len(),
            signups = day_users.len(),
            rows = details.len(),
            "Reconciled day details"
        );
        Ok(details)
    }

    /// Dashboard snapshot, or the placeholder when the store cannot be read.
    pub async fn snapshot(&self) -> DashboardSnapshot {
        match self.try_snapshot().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(error = %e, "Dashboard query failed, serving placeholder");
                DashboardSnapshot::placeholder()
            }
        }
    }

    async fn try_snapshot(&self) -> Result<DashboardSnapshot> {
        let all = QueryFilter::all();
        let steps = &FUNNEL_STEPS;
        let (totals, counts, users) = tokio::try_join!(
            self.store.totals(),
            self.store.count_events_by_type(steps),
            self.store.query_users(&all)
        )?;

        let mut plan_distribution: BTreeMap<SelectedPlan, u64> =
            SelectedPlan::ALL.iter().map(|p| (*p, 0)).collect();
        for user in &users {
            *plan_distribution.entry(user.selected_plan).or_default() += 1;
        }

        let funnel = FUNNEL_STEPS
            .iter()
            .zip(counts)
            .map(|(step, count)| FunnelStep {
                event: step.as_str().to_string(),
                count,
            })
            .collect();

        Ok(DashboardSnapshot {
            total_users: totals.users,
            unique_visitors: totals.sessions,
            funnel,
            plan_distribution,
            recent_users: users.into_iter().take(RECENT_USERS_LIMIT).collect(),
            status: SnapshotStatus::Live,
        })
    }

    /// Distinct known cities across sessions and signups, sorted.
    pub async fn cities(&self) -> Result<Vec<String>> {
        let all = QueryFilter::all();
        let (sessions, users) = tokio::try_join!(
            self.store.query_sessions(&all),
            self.store.query_users(&all)
        )?;

        let cities: BTreeSet<String> = sessions
            .iter()
            .filter_map(Session::effective_city)
            .chain(users.iter().map(|u| u.city.as_str()))
            .map(str::trim)
            .filter(|c| !c.is_empty() && !is_placeholder(c))
            .map(str::to_string)
            .collect();

        Ok(cities.into_iter().collect())
    }
}

fn merge_sessions(mut first: Vec<Session>, second: Vec<Session>) -> Vec<Session> {
    let seen: HashSet<String> = first.iter().map(|s| s.session_id.clone()).collect();
    first.extend(second.into_iter().filter(|s| !seen.contains(&s.session_id)));
    first
}
