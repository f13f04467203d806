use chrono::Duration;
use rand::Rng;

/// Scatters scrape intervals by ±20% so that many resources enrolled at the
/// same moment do not all come due on the same tick (spec §4.3, §4.4
/// "jittered_interval").
pub fn jittered_interval(base_secs: u64) -> Duration {
    let spread = (base_secs as f64 * 0.2).round() as i64;
    let delta = if spread > 0 {
        rand::thread_rng().gen_range(-spread..=spread)
    } else {
        0
    };
    Duration::seconds(base_secs as i64 + delta)
}
