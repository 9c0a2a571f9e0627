//! Daily run trigger.
//!
//! Runs fire once a day at a fixed wall-clock time in a fixed UTC offset, and
//! optionally once right after startup. A tick that lands while a manual run is
//! in progress is skipped, not queued.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};
use release_radar_core::{
    RunReport, SyncError, SyncService,
    config::{ConfigError, ScheduleConfig},
};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// A fixed time of day in a fixed UTC offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    pub at: NaiveTime,
    pub offset: FixedOffset,
}

impl DailySchedule {
    pub fn new(at: NaiveTime, offset: FixedOffset) -> Self {
        Self { at, offset }
    }

    pub fn from_config(config: &ScheduleConfig) -> Result<Self, ConfigError> {
        Ok(Self::new(config.daily_time()?, config.offset()?))
    }

    /// The first scheduled instant strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let offset = Duration::seconds(i64::from(self.offset.local_minus_utc()));
        let local_date = (now + offset).date_naive();

        let today = local_date.and_time(self.at) - offset;
        let candidate = DateTime::<Utc>::from_naive_utc_and_offset(today, Utc);

        if candidate > now {
            candidate
        } else {
            candidate + Duration::days(1)
        }
    }
}

/// Run the pipeline once and log the outcome.
pub async fn run_and_log(service: &SyncService, trigger: &str) -> Option<RunReport> {
    info!(trigger, "Sync run triggered");

    match service.run().await {
        Ok(report) => {
            info!(
                trigger,
                run_id = %report.run_id,
                new = report.new_releases.len(),
                warnings = report.warnings.len(),
                "Sync run completed"
            );
            for warning in &report.warnings {
                warn!(run_id = %report.run_id, "Run warning: {:?}", warning);
            }
            Some(report)
        }
        Err(SyncError::AlreadyRunning) => {
            warn!(trigger, "Skipping trigger, a sync run is already in progress");
            None
        }
        Err(e) => {
            error!(trigger, "Sync run failed: {}", e);
            None
        }
    }
}

/// Drive the daily schedule until `shutdown` flips to `true`.
pub async fn run_scheduler(
    service: Arc<SyncService>,
    schedule: DailySchedule,
    run_on_start: bool,
    mut shutdown: watch::Receiver<bool>,
) {
    if run_on_start {
        tokio::select! {
            _ = run_and_log(&service, "startup") => {}
            _ = shutdown.changed() => return,
        }
    }

    loop {
        let now = Utc::now();
        let next = schedule.next_after(now);
        let wait = (next - now).to_std().unwrap_or_default();
        info!("Next scheduled run at {}", next.with_timezone(&schedule.offset));

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                run_and_log(&service, "schedule").await;
            }
            _ = shutdown.changed() => {
                info!("Scheduler stopping");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn schedule(at: &str, offset_secs: i32) -> DailySchedule {
        DailySchedule::new(
            NaiveTime::parse_from_str(at, "%H:%M").unwrap(),
            FixedOffset::east_opt(offset_secs).unwrap(),
        )
    }

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn test_next_run_later_today() {
        let s = schedule("07:00", 0);
        assert_eq!(s.next_after(utc(2024, 3, 10, 5, 0)), utc(2024, 3, 10, 7, 0));
    }

    #[test]
    fn test_next_run_tomorrow_when_passed() {
        let s = schedule("07:00", 0);
        assert_eq!(s.next_after(utc(2024, 3, 10, 8, 0)), utc(2024, 3, 11, 7, 0));
        assert_eq!(s.next_after(utc(2024, 3, 10, 7, 0)), utc(2024, 3, 11, 7, 0));
    }

    #[test]
    fn test_next_run_respects_offset() {
        let s = schedule("07:00", 3600);
        assert_eq!(s.next_after(utc(2024, 3, 10, 5, 0)), utc(2024, 3, 10, 6, 0));

        // 22:00 local on the 9th, five hours behind UTC.
        let s = schedule("23:30", -5 * 3600);
        assert_eq!(s.next_after(utc(2024, 3, 10, 3, 0)), utc(2024, 3, 10, 4, 30));
    }

    #[test]
    fn test_next_run_across_month_end() {
        let s = schedule("00:15", 0);
        assert_eq!(s.next_after(utc(2024, 2, 29, 23, 0)), utc(2024, 3, 1, 0, 15));
    }

    #[test]
    fn test_from_config() {
        let config = ScheduleConfig {
            daily_at: "06:45".to_string(),
            utc_offset: "+02:00".to_string(),
            run_on_start: false,
        };
        assert_eq!(
            DailySchedule::from_config(&config).unwrap(),
            schedule("06:45", 7200)
        );
    }
}
