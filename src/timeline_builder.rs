// Daybook - Timeline Builder
// Merges tasks, notes, and recordings into date-bucketed Day records
//
// Every pass is a fresh snapshot: the full Day list is rebuilt and
// replaces whatever was rendered before. The builder never reads the
// wall clock or an ambient timezone; "now" and the offset always come
// from the caller.

use std::collections::HashMap;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{Day, DayStats, HourBucket, Note, Recording, Task, TimelineItem};

/// Ordering of the produced Day list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimelineDirection {
    /// Newest day first (history view)
    Past,
    /// Oldest day first (upcoming view)
    Future,
}

/// Configuration for one aggregation pass
#[derive(Debug, Clone)]
pub struct TimelineConfig {
    /// Days before "now" to materialize
    pub days_back: u32,
    /// Days after "now" to materialize
    pub days_forward: u32,
    pub direction: TimelineDirection,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            days_back: 14,
            days_forward: 7,
            direction: TimelineDirection::Past,
        }
    }
}

/// Build the Day list for one pass.
///
/// Every date in [now - days_back, now + days_forward] gets a Day, so
/// an empty day means "nothing happened", not "nothing fetched". Items
/// whose local date falls outside the window are dropped. The Day
/// containing "now" additionally gets hour buckets.
pub fn build_timeline(
    tasks: &[Task],
    notes: &[Note],
    recordings: &[Recording],
    now: DateTime<Utc>,
    tz: FixedOffset,
    config: &TimelineConfig,
) -> Vec<Day> {
    let today = now.with_timezone(&tz).date_naive();
    let first = today - Duration::days(config.days_back as i64);
    let total_days = (config.days_back + 1 + config.days_forward) as i64;

    // Materialize the full contiguous range up front, ascending
    let mut days: Vec<Day> = Vec::with_capacity(total_days as usize);
    let mut index: HashMap<NaiveDate, usize> = HashMap::new();
    for offset in 0..total_days {
        let date = first + Duration::days(offset);
        index.insert(date, days.len());
        days.push(Day {
            date_key: date,
            label: day_label(date, today),
            items: Vec::new(),
            hours: None,
            stats: DayStats::default(),
        });
    }

    let mut place = |item: TimelineItem| {
        let key = item.created_at().with_timezone(&tz).date_naive();
        if let Some(&i) = index.get(&key) {
            days[i].items.push(item);
        }
        // Out-of-window keys are dropped: the gateway windows its
        // fetches, this is only the safety net for boundary items.
    };

    for task in tasks {
        place(TimelineItem::Task(task.clone()));
    }
    for note in notes {
        place(TimelineItem::Note(note.clone()));
    }
    for recording in recordings {
        place(TimelineItem::Recording(recording.clone()));
    }

    for day in &mut days {
        day.stats = compute_stats(&day.items);
        if day.date_key == today {
            day.hours = Some(bucket_by_hour(&day.items, tz));
        } else {
            // Newest first within a day; sort is stable so items
            // created the same instant keep their fetch order
            day.items.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
        }
    }

    if config.direction == TimelineDirection::Past {
        days.reverse();
    }
    days
}

/// Group today's items into hour buckets, hour ascending, insertion
/// order preserved within each hour.
fn bucket_by_hour(items: &[TimelineItem], tz: FixedOffset) -> Vec<HourBucket> {
    let mut buckets: Vec<HourBucket> = Vec::new();
    for item in items {
        let hour = item.created_at().with_timezone(&tz).hour();
        match buckets.iter_mut().find(|b| b.hour == hour) {
            Some(bucket) => bucket.items.push(item.clone()),
            None => buckets.push(HourBucket {
                hour,
                items: vec![item.clone()],
            }),
        }
    }
    buckets.sort_by_key(|b| b.hour);
    buckets
}

fn compute_stats(items: &[TimelineItem]) -> DayStats {
    let mut stats = DayStats::default();
    for item in items {
        match item {
            TimelineItem::Task(t) => {
                stats.tasks += 1;
                if t.is_completed() {
                    stats.completed_tasks += 1;
                }
            }
            TimelineItem::Note(_) => stats.notes += 1,
            TimelineItem::Recording(r) => {
                stats.recordings += 1;
                stats.recorded_seconds += r.duration_seconds;
            }
        }
    }
    stats
}

/// Human label for a date relative to "today". Pure: the reference day
/// is always passed in.
pub fn day_label(date: NaiveDate, today: NaiveDate) -> String {
    let offset = (date - today).num_days();
    match offset {
        0 => "Today".to_string(),
        -1 => "Yesterday".to_string(),
        1 => "Tomorrow".to_string(),
        o if o.abs() < 7 => date.format("%A").to_string(),
        o if o > 0 => date.format("%b %-d, %A").to_string(),
        _ => date.format("%b %-d").to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn at(s: &str) -> DateTime<Utc> {
        s.parse().unwrap()
    }

    fn task_at(owner: Uuid, text: &str, created: &str) -> Task {
        Task::new(owner, text, at(created))
    }

    fn note_at(owner: Uuid, text: &str, created: &str) -> Note {
        Note::new(owner, text, at(created))
    }

    #[test]
    fn test_window_is_contiguous_and_complete() {
        let now = at("2024-01-10T12:00:00Z");
        let config = TimelineConfig {
            days_back: 3,
            days_forward: 2,
            direction: TimelineDirection::Future,
        };
        let days = build_timeline(&[], &[], &[], now, utc(), &config);

        assert_eq!(days.len(), 6);
        for pair in days.windows(2) {
            assert_eq!(pair[1].date_key - pair[0].date_key, Duration::days(1));
        }
        assert_eq!(
            days[0].date_key,
            NaiveDate::from_ymd_opt(2024, 1, 7).unwrap()
        );
    }

    #[test]
    fn test_past_direction_is_descending() {
        let now = at("2024-01-10T12:00:00Z");
        let days = build_timeline(&[], &[], &[], now, utc(), &TimelineConfig::default());
        for pair in days.windows(2) {
            assert!(pair[0].date_key > pair[1].date_key);
        }
    }

    #[test]
    fn test_out_of_window_items_are_dropped() {
        let owner = Uuid::new_v4();
        let now = at("2024-01-10T12:00:00Z");
        let config = TimelineConfig {
            days_back: 1,
            days_forward: 1,
            direction: TimelineDirection::Past,
        };
        let tasks = vec![
            task_at(owner, "inside", "2024-01-09T08:00:00Z"),
            task_at(owner, "outside", "2024-01-01T08:00:00Z"),
        ];
        let days = build_timeline(&tasks, &[], &[], now, utc(), &config);

        let total: usize = days.iter().map(|d| d.items.len()).sum();
        assert_eq!(total, 1);
        assert_eq!(days.iter().map(|d| d.stats.tasks).sum::<usize>(), 1);
    }

    #[test]
    fn test_today_hour_buckets() {
        let owner = Uuid::new_v4();
        let now = at("2024-01-10T12:00:00Z");
        let tasks = vec![
            task_at(owner, "morning", "2024-01-10T09:00:00Z"),
            task_at(owner, "afternoon", "2024-01-10T14:00:00Z"),
        ];
        let notes = vec![note_at(owner, "evening", "2024-01-10T20:00:00Z")];
        let days = build_timeline(
            &tasks,
            &notes,
            &[],
            now,
            utc(),
            &TimelineConfig::default(),
        );

        let today = days
            .iter()
            .find(|d| d.label == "Today")
            .expect("today present");
        assert_eq!(today.items.len(), 3);
        assert_eq!(today.stats.tasks, 2);
        assert_eq!(today.stats.notes, 1);

        let hours = today.hours.as_ref().expect("hour buckets for today");
        let bucket_hours: Vec<u32> = hours.iter().map(|b| b.hour).collect();
        assert_eq!(bucket_hours, vec![9, 14, 20]);
        assert!(hours.iter().all(|b| b.items.len() == 1));
    }

    #[test]
    fn test_non_today_days_sort_newest_first() {
        let owner = Uuid::new_v4();
        let now = at("2024-01-10T12:00:00Z");
        let tasks = vec![
            task_at(owner, "early", "2024-01-09T08:00:00Z"),
            task_at(owner, "late", "2024-01-09T18:00:00Z"),
        ];
        let days = build_timeline(&tasks, &[], &[], now, utc(), &TimelineConfig::default());

        let yesterday = days.iter().find(|d| d.label == "Yesterday").unwrap();
        assert_eq!(yesterday.items[0].text(), "late");
        assert_eq!(yesterday.items[1].text(), "early");
    }

    #[test]
    fn test_timezone_shifts_date_key() {
        let owner = Uuid::new_v4();
        // 23:30 UTC on Jan 9 is already Jan 10 at UTC+2
        let now = at("2024-01-10T12:00:00Z");
        let tasks = vec![task_at(owner, "late night", "2024-01-09T23:30:00Z")];
        let tz = FixedOffset::east_opt(2 * 3600).unwrap();
        let days = build_timeline(&tasks, &[], &[], now, tz, &TimelineConfig::default());

        let today = days.iter().find(|d| d.label == "Today").unwrap();
        assert_eq!(today.items.len(), 1);
    }

    #[test]
    fn test_day_labels() {
        let today = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(); // a Wednesday
        assert_eq!(day_label(today, today), "Today");
        assert_eq!(day_label(today - Duration::days(1), today), "Yesterday");
        assert_eq!(day_label(today + Duration::days(1), today), "Tomorrow");
        assert_eq!(day_label(today - Duration::days(2), today), "Monday");
        assert_eq!(day_label(today + Duration::days(3), today), "Saturday");
        assert_eq!(day_label(today - Duration::days(10), today), "Dec 31");
        assert_eq!(
            day_label(today + Duration::days(10), today),
            "Jan 20, Saturday"
        );
    }

    #[test]
    fn test_pass_is_idempotent() {
        let owner = Uuid::new_v4();
        let now = at("2024-01-10T12:00:00Z");
        let tasks = vec![task_at(owner, "same", "2024-01-09T08:00:00Z")];
        let a = build_timeline(&tasks, &[], &[], now, utc(), &TimelineConfig::default());
        let b = build_timeline(&tasks, &[], &[], now, utc(), &TimelineConfig::default());
        assert_eq!(a.len(), b.len());
        for (da, db) in a.iter().zip(b.iter()) {
            assert_eq!(da.date_key, db.date_key);
            assert_eq!(da.items.len(), db.items.len());
        }
    }

    #[test]
    fn test_recording_stats_accumulate_duration() {
        let owner = Uuid::new_v4();
        let now = at("2024-01-10T12:00:00Z");
        let r1 = Recording::new(owner, "a.m4a", 60, at("2024-01-09T08:00:00Z"));
        let r2 = Recording::new(owner, "b.m4a", 90, at("2024-01-09T09:00:00Z"));

        let days = build_timeline(&[], &[], &[r1, r2], now, utc(), &TimelineConfig::default());
        let yesterday = days.iter().find(|d| d.label == "Yesterday").unwrap();
        assert_eq!(yesterday.stats.recordings, 2);
        assert_eq!(yesterday.stats.recorded_seconds, 150);
    }

    #[test]
    fn test_date_keys_are_pairwise_distinct() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let days = build_timeline(&[], &[], &[], now, utc(), &TimelineConfig::default());
        let mut keys: Vec<NaiveDate> = days.iter().map(|d| d.date_key).collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), days.len());
    }
}
