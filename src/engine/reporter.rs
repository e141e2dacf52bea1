use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Weekday};
use tracing::{info, warn};

use crate::ledger::{Ledger, LedgerRecord};
use crate::models::SignalResult;
use crate::notify::Notifier;

/// Minutes past the trigger hour during which a digest may fire.
const FIRING_WINDOW_MINS: u32 = 5;
const DAILY_HOUR: u32 = 23;
const WEEKLY_HOUR: u32 = 8;

/// Daily and weekly aggregate digests. Each trigger is idempotent per
/// calendar period: repeated polls inside a firing window send at most one
/// report.
pub struct Reporter {
    last_daily: Option<NaiveDate>,
    last_weekly: Option<NaiveDate>,
}

impl Reporter {
    pub fn new() -> Self {
        Self {
            last_daily: None,
            last_weekly: None,
        }
    }

    pub async fn maybe_report(
        &mut self,
        now_local: NaiveDateTime,
        ledger: &dyn Ledger,
        notifier: &dyn Notifier,
    ) {
        if self.daily_due(now_local) {
            match ledger.read_all().await {
                Ok(records) => {
                    let msg = daily_digest(&records, now_local.date());
                    notifier.send_text(&msg, None).await;
                    self.last_daily = Some(now_local.date());
                    info!("daily digest sent for {}", now_local.date());
                }
                Err(e) => warn!("daily digest skipped, ledger read failed: {:#}", e),
            }
        }

        if self.weekly_due(now_local) {
            let monday = week_start(now_local.date());
            match ledger.read_all().await {
                Ok(records) => {
                    let msg = weekly_digest(&records, monday);
                    notifier.send_text(&msg, None).await;
                    self.last_weekly = Some(monday);
                    info!("weekly digest sent for week of {}", monday);
                }
                Err(e) => warn!("weekly digest skipped, ledger read failed: {:#}", e),
            }
        }
    }

    fn daily_due(&self, now: NaiveDateTime) -> bool {
        now.hour() == DAILY_HOUR
            && now.minute() < FIRING_WINDOW_MINS
            && self.last_daily != Some(now.date())
    }

    fn weekly_due(&self, now: NaiveDateTime) -> bool {
        now.weekday() == Weekday::Mon
            && now.hour() == WEEKLY_HOUR
            && now.minute() < FIRING_WINDOW_MINS
            && self.last_weekly != Some(week_start(now.date()))
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

struct Tally {
    total: usize,
    wins: usize,
    losses: usize,
    expired: usize,
}

fn tally<'a, I: Iterator<Item = &'a LedgerRecord>>(records: I) -> Tally {
    let mut t = Tally {
        total: 0,
        wins: 0,
        losses: 0,
        expired: 0,
    };
    for r in records {
        t.total += 1;
        match r.result_state() {
            Some(s) if s.is_take_profit() => t.wins += 1,
            Some(SignalResult::Sl) => t.losses += 1,
            Some(SignalResult::Expired) => t.expired += 1,
            _ => {}
        }
    }
    t
}

fn digest_body(t: &Tally) -> String {
    format!(
        "----------------------------\n\n\
         Orders: *{}*\n\
         ✅ TP: *{}*\n\
         ❌ SL: *{}*\n\
         ⌛ Expired: *{}*\n\
         ----------------------------",
        t.total, t.wins, t.losses, t.expired
    )
}

pub fn daily_digest(records: &[LedgerRecord], date: NaiveDate) -> String {
    let prefix = date.format("%Y-%m-%d").to_string();
    let t = tally(records.iter().filter(|r| r.date.starts_with(&prefix)));
    format!("📊 *Daily summary {}*\n{}", prefix, digest_body(&t))
}

pub fn weekly_digest(records: &[LedgerRecord], monday: NaiveDate) -> String {
    let start = monday.format("%Y-%m-%d").to_string();
    let end = (monday + Duration::days(6)).format("%Y-%m-%d").to_string();
    let t = tally(records.iter().filter(|r| {
        let day = r.date.get(..10).unwrap_or("");
        day >= start.as_str() && day <= end.as_str()
    }));
    format!(
        "📈 *Weekly summary {} - {}*\n{}",
        start,
        end,
        digest_body(&t)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(date: &str, result: &str) -> LedgerRecord {
        let mut r = LedgerRecord::default();
        r.date = date.to_string();
        r.result = result.to_string();
        r
    }

    fn at(y: i32, m: u32, d: u32, hour: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(hour, min, 0)
            .unwrap()
    }

    #[test]
    fn daily_digest_counts_today_only() {
        let records = vec![
            record("2024-03-12 10:00:00", "TP2"),
            record("2024-03-12 12:00:00", "SL"),
            record("2024-03-12 14:00:00", "Expired"),
            record("2024-03-11 10:00:00", "TP1"), // yesterday
        ];
        let msg = daily_digest(&records, NaiveDate::from_ymd_opt(2024, 3, 12).unwrap());
        assert!(msg.contains("Orders: *3*"));
        assert!(msg.contains("TP: *1*"));
        assert!(msg.contains("SL: *1*"));
        assert!(msg.contains("Expired: *1*"));
    }

    #[test]
    fn weekly_digest_spans_monday_to_sunday() {
        let records = vec![
            record("2024-03-11 10:00:00", "TP1"), // Monday
            record("2024-03-17 10:00:00", "SL"),  // Sunday
            record("2024-03-18 10:00:00", "TP3"), // next Monday
        ];
        let msg = weekly_digest(&records, NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert!(msg.contains("Orders: *2*"));
    }

    #[test]
    fn daily_trigger_fires_once_per_day() {
        let mut rep = Reporter::new();
        assert!(rep.daily_due(at(2024, 3, 12, 23, 0)));
        rep.last_daily = Some(NaiveDate::from_ymd_opt(2024, 3, 12).unwrap());
        // Another poll inside the same window does not refire
        assert!(!rep.daily_due(at(2024, 3, 12, 23, 3)));
        // Outside the window never fires
        assert!(!rep.daily_due(at(2024, 3, 13, 22, 59)));
        assert!(!rep.daily_due(at(2024, 3, 13, 23, 5)));
        // Next day fires again
        assert!(rep.daily_due(at(2024, 3, 13, 23, 1)));
    }

    #[test]
    fn weekly_trigger_needs_monday_morning() {
        let mut rep = Reporter::new();
        // 2024-03-11 is a Monday
        assert!(rep.weekly_due(at(2024, 3, 11, 8, 2)));
        rep.last_weekly = Some(NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        assert!(!rep.weekly_due(at(2024, 3, 11, 8, 4)));
        // Tuesday never fires
        assert!(!rep.weekly_due(at(2024, 3, 12, 8, 0)));
        // The following Monday fires again
        assert!(rep.weekly_due(at(2024, 3, 18, 8, 0)));
    }

    #[test]
    fn week_start_is_monday() {
        assert_eq!(
            week_start(NaiveDate::from_ymd_opt(2024, 3, 14).unwrap()), // Thursday
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
        );
        assert_eq!(
            week_start(NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()),
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
        );
    }
}
