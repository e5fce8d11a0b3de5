//! Conversion from file settings into per-component configuration.

use std::time::Duration;

use super::settings::ConfigFile;
use crate::cache::TrimConfig;
use crate::download::DownloadConfig;
use crate::schedule::{PrefetchConfig, PrefetchHorizon, TriggerConfig};

impl ConfigFile {
    pub fn download_config(&self) -> DownloadConfig {
        DownloadConfig::default()
            .with_retries(self.prefetch.retries)
            .with_retry_delay(Duration::from_secs(self.prefetch.retry_delay_secs))
            .with_foreground_slots(self.http.max_concurrent_downloads)
            .with_background_slots(self.http.background_downloads)
            .with_read_timeout(self.http_timeout())
    }

    pub fn trim_config(&self) -> TrimConfig {
        TrimConfig::new(self.cache.max_size)
            .with_protection_window(Duration::from_secs(
                self.cache.protection_window_minutes.saturating_mul(60),
            ))
            .with_next_use_ttl(Duration::from_secs(self.cache.next_use_ttl_secs))
    }

    pub fn prefetch_config(&self) -> PrefetchConfig {
        PrefetchConfig {
            near: PrefetchHorizon::near(
                Duration::from_secs(self.prefetch.near_horizon_secs),
                Duration::from_secs(self.prefetch.near_period_secs),
            ),
            far: PrefetchHorizon::far(
                Duration::from_secs(self.prefetch.far_horizon_secs),
                Duration::from_secs(self.prefetch.far_period_secs),
            ),
        }
    }

    pub fn trigger_config(&self) -> TriggerConfig {
        TriggerConfig::default()
            .with_backward_tolerance(Duration::from_secs(
                self.scheduler.backward_tolerance_secs,
            ))
            .with_forward_tolerance(Duration::from_secs(self.scheduler.forward_tolerance_secs))
            .with_max_wait(Duration::from_secs(self.scheduler.max_wait_secs))
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::Pool;

    #[test]
    fn test_defaults_flow_into_components() {
        let config = ConfigFile::default();

        let download = config.download_config();
        assert_eq!(download.retries, 3);
        assert_eq!(download.slots(Pool::Foreground), 1);
        assert_eq!(download.slots(Pool::Background), 1);

        let trim = config.trim_config();
        assert_eq!(trim.max_size, 10_000_000);
        assert_eq!(trim.protection_window, Duration::from_secs(20 * 60));

        let prefetch = config.prefetch_config();
        assert_eq!(prefetch.near.horizon, Duration::from_secs(1200));
        assert_eq!(prefetch.near.period, Duration::from_secs(600));
        assert_eq!(prefetch.near.pool, Pool::Foreground);
        assert_eq!(prefetch.far.horizon, Duration::from_secs(6 * 3600));
        assert_eq!(prefetch.far.pool, Pool::Background);

        let trigger = config.trigger_config();
        assert_eq!(trigger.backward_tolerance, Duration::from_secs(5));
        assert_eq!(trigger.forward_tolerance, Duration::from_secs(3));
        assert_eq!(trigger.max_wait, Duration::from_secs(60));
    }

    #[test]
    fn test_huge_protection_window_saturates() {
        let mut config = ConfigFile::default();
        config.cache.protection_window_minutes = u64::MAX;

        let trim = config.trim_config();
        assert_eq!(trim.protection_window, Duration::from_secs(u64::MAX));
    }
}
