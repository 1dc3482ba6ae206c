use std::collections::BTreeMap;

use axum::{
    Extension, Json,
    extract::{Query, State},
    response::IntoResponse,
};
use axum_extra::extract::WithRejection;
use chrono::NaiveDate;

use stride_types::api::{CalendarDay, CalendarEntry, CalendarQuery, CalendarRangeQuery, Claims};
use stride_types::models::{RaceResult, ScheduledActivity, Workout};

use crate::auth::AppState;
use crate::blocking;
use crate::error::ApiError;

/// Longest span `/calendar/range` will return, counting both ends.
pub const MAX_RANGE_DAYS: i64 = 92;

/// Everything the owner has on a calendar day, activities then workouts then races.
///
/// Input order is kept within each kind.
pub fn entries_on(
    date: NaiveDate,
    activities: Vec<ScheduledActivity>,
    workouts: Vec<Workout>,
    races: Vec<RaceResult>,
) -> Vec<CalendarEntry> {
    let activities = activities
        .into_iter()
        .filter(|a| a.date == date)
        .map(CalendarEntry::Activity);
    let workouts = workouts
        .into_iter()
        .filter(|w| w.date == date)
        .map(CalendarEntry::Workout);
    let races = races
        .into_iter()
        .filter(|r| r.date == date)
        .map(CalendarEntry::Race);

    activities.chain(workouts).chain(races).collect()
}

/// One `CalendarDay` per date in `from..=to`, empty days included.
pub fn bucket_days(
    from: NaiveDate,
    to: NaiveDate,
    activities: Vec<ScheduledActivity>,
    workouts: Vec<Workout>,
    races: Vec<RaceResult>,
) -> Vec<CalendarDay> {
    let mut buckets: BTreeMap<NaiveDate, Vec<CalendarEntry>> = from
        .iter_days()
        .take_while(|d| *d <= to)
        .map(|d| (d, Vec::new()))
        .collect();

    let entries = activities
        .into_iter()
        .map(|a| (a.date, CalendarEntry::Activity(a)))
        .chain(workouts.into_iter().map(|w| (w.date, CalendarEntry::Workout(w))))
        .chain(races.into_iter().map(|r| (r.date, CalendarEntry::Race(r))));

    for (date, entry) in entries {
        if let Some(bucket) = buckets.get_mut(&date) {
            bucket.push(entry);
        }
    }

    buckets
        .into_iter()
        .map(|(date, entries)| CalendarDay { date, entries })
        .collect()
}

/// GET /calendar?date=YYYY-MM-DD
pub async fn day(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<CalendarQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let me = claims.sub;
    let date = query.date;
    let entries = blocking(&state, move |db| {
        let day = Some(date);
        Ok(entries_on(
            date,
            db.list_activities(me, day, day)?,
            db.list_workouts(me, day, day)?,
            db.list_races(me, day, day)?,
        ))
    })
    .await?;

    Ok(Json(CalendarDay { date, entries }))
}

/// GET /calendar/range?from=&to=
pub async fn range(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    WithRejection(Query(query), _): WithRejection<Query<CalendarRangeQuery>, ApiError>,
) -> Result<impl IntoResponse, ApiError> {
    let CalendarRangeQuery { from, to } = query;
    if to < from {
        return Err(ApiError::bad_request("`to` is before `from`"));
    }
    if (to - from).num_days() + 1 > MAX_RANGE_DAYS {
        return Err(ApiError::bad_request(format!(
            "range is limited to {MAX_RANGE_DAYS} days"
        )));
    }

    let me = claims.sub;
    let days = blocking(&state, move |db| {
        Ok(bucket_days(
            from,
            to,
            db.list_activities(me, Some(from), Some(to))?,
            db.list_workouts(me, Some(from), Some(to))?,
            db.list_races(me, Some(from), Some(to))?,
        ))
    })
    .await?;

    Ok(Json(days))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveTime, Utc};
    use stride_types::models::{ActivityStatus, ActivityType, PlanStatus, WorkoutType};
    use uuid::Uuid;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn activity(title: &str, date: NaiveDate) -> ScheduledActivity {
        ScheduledActivity {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            title: title.into(),
            description: None,
            date,
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            duration: 60,
            activity_type: ActivityType::Training,
            status: ActivityStatus::Scheduled,
            location: None,
            assigned_by: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn workout(title: &str, date: NaiveDate) -> Workout {
        Workout {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            title: title.into(),
            description: None,
            date,
            duration: 45,
            distance: None,
            calories: None,
            rpe: None,
            workout_type: WorkoutType::Strength,
            status: PlanStatus::Planned,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn race(name: &str, date: NaiveDate) -> RaceResult {
        RaceResult {
            id: Uuid::new_v4(),
            owner_id: Uuid::nil(),
            event_name: name.into(),
            event_type: "10K".into(),
            date,
            finish_time: None,
            distance: Some(10.0),
            position: None,
            total_participants: None,
            status: PlanStatus::Planned,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn label(entry: &CalendarEntry) -> &str {
        match entry {
            CalendarEntry::Activity(a) => &a.title,
            CalendarEntry::Workout(w) => &w.title,
            CalendarEntry::Race(r) => &r.event_name,
        }
    }

    #[test]
    fn test_day_keeps_kind_order_and_drops_other_dates() {
        let entries = entries_on(
            d(10),
            vec![activity("physio", d(10)), activity("yoga", d(11))],
            vec![workout("legs", d(10)), workout("core", d(10))],
            vec![race("parkrun", d(10)), race("half", d(9))],
        );

        let labels: Vec<&str> = entries.iter().map(label).collect();
        assert_eq!(labels, vec!["physio", "legs", "core", "parkrun"]);
    }

    #[test]
    fn test_range_has_every_day_including_empty_ones() {
        let days = bucket_days(
            d(1),
            d(3),
            vec![activity("a", d(3)), activity("outside", d(4))],
            vec![workout("w", d(1))],
            vec![race("r", d(3))],
        );

        assert_eq!(days.len(), 3);
        assert_eq!(days[0].date, d(1));
        assert_eq!(days[0].entries.len(), 1);
        assert!(days[1].entries.is_empty());

        let third: Vec<&str> = days[2].entries.iter().map(label).collect();
        assert_eq!(third, vec!["a", "r"]);
    }

    #[test]
    fn test_single_day_range() {
        let days = bucket_days(d(5), d(5), vec![], vec![], vec![]);
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].date, d(5));
    }
}
