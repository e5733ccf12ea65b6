//! Daily funnel rollup over sessions and signups.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::limits::MAX_DAILY_METRICS;
use crate::reporting::ReportingTimezone;
use crate::session::Session;
use crate::user::User;

/// Metrics for one reporting-timezone calendar day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyMetric {
    pub date: NaiveDate,
    pub total_sessions: u64,
    pub unique_visitors: u64,
    pub signups: u64,
    pub conversions: u64,
    pub conversion_rate: f64,
}

#[derive(Default)]
struct DayBucket<'a> {
    sessions: u64,
    visitors: HashSet<&'a str>,
    converted_sessions: u64,
    signups: u64,
}

/// Group sessions (by `first_seen`) and users (by `created_at`) into days.
///
/// Inputs are expected to be already filtered to the requested window and
/// city. A signup counts as a conversion even when its session was never
/// flagged, so `conversions` is the larger of the two counts. Output is
/// newest first and holds at most [`MAX_DAILY_METRICS`] days.
pub fn compute_daily_metrics(
    sessions: &[Session],
    users: &[User],
    tz: &ReportingTimezone,
) -> Vec<DailyMetric> {
    let mut days: BTreeMap<NaiveDate, DayBucket<'_>> = BTreeMap::new();

    for session in sessions {
        let bucket = days.entry(tz.day_of(session.first_seen)).or_default();
        bucket.sessions += 1;
        bucket.visitors.insert(session.session_id.as_str());
        if session.converted {
            bucket.converted_sessions += 1;
        }
    }

    for user in users {
        days.entry(tz.day_of(user.created_at)).or_default().signups += 1;
    }

    days.into_iter()
        .rev()
        .take(MAX_DAILY_METRICS)
        .map(|(date, bucket)| {
            let conversions = bucket.converted_sessions.max(bucket.signups);
            DailyMetric {
                date,
                total_sessions: bucket.sessions,
                unique_visitors: bucket.visitors.len() as u64,
                signups: bucket.signups,
                conversions,
                conversion_rate: conversion_rate(conversions, bucket.sessions, bucket.signups),
            }
        })
        .collect()
}

/// Percentage rounded to one decimal. A day with signups and no tracked
/// sessions counts as 100.
pub fn conversion_rate(conversions: u64, total_sessions: u64, signups: u64) -> f64 {
    if total_sessions > 0 {
        let pct = conversions as f64 / total_sessions as f64 * 100.0;
        (pct * 10.0).round() / 10.0
    } else if signups > 0 {
        100.0
    } else {
        0.0
    }
}
