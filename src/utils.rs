use near_sdk::env;

// Helper for consistent logging, e.g. TIMELOCK_CLAIMED: recipient='bob.near', amount='1'
pub fn log_timelock_event(event: &str, fields: &[(&str, String)]) {
    let fields = fields
        .iter()
        .map(|(key, value)| format!("{}='{}'", key, value))
        .collect::<Vec<_>>()
        .join(", ");
    env::log_str(&format!("TIMELOCK_{}: {}", event, fields));
}
