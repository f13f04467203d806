/// Integration tests for the worker-pool scaffolding (no database required).

#[cfg(test)]
mod tests {
    use castellum_workers::backoff::BackoffPolicy;
    use castellum_workers::jitter::jittered_interval;
    use castellum_workers::WorkerConfig;

    #[test]
    fn worker_config_defaults_without_env() {
        for var in [
            "CASTELLUM_RESOURCE_SCRAPE_WORKERS",
            "CASTELLUM_ASSET_SCRAPE_WORKERS",
            "CASTELLUM_RESIZE_WORKERS",
        ] {
            std::env::remove_var(var);
        }
        let config = WorkerConfig::from_env().expect("defaults must parse");
        assert_eq!(config.resource_scrape_workers, 4);
        assert_eq!(config.asset_scrape_workers, 4);
        assert_eq!(config.resize_workers, 4);
        assert_eq!(config.lease_secs, 60);
    }

    #[test]
    fn worker_config_rejects_non_numeric_override() {
        std::env::set_var("CASTELLUM_RESOURCE_SCRAPE_WORKERS", "not-a-number");
        let result = WorkerConfig::from_env();
        std::env::remove_var("CASTELLUM_RESOURCE_SCRAPE_WORKERS");
        assert!(result.is_err());
    }

    #[test]
    fn jittered_interval_stays_within_twenty_percent() {
        for _ in 0..200 {
            let d = jittered_interval(300).num_seconds();
            assert!((240..=360).contains(&d), "jitter escaped its band: {d}");
        }
    }

    #[test]
    fn backoff_sequence_grows_then_caps() {
        let policy = BackoffPolicy {
            base_secs: 10,
            max_secs: 80,
            max_attempts: 5,
        };
        for attempt in 0..5 {
            assert!(!policy.exceeded(attempt));
        }
        assert!(policy.exceeded(5));
        let delay_at_high_attempt = policy.next_delay(10).num_seconds();
        assert!(delay_at_high_attempt <= 80);
    }
}
