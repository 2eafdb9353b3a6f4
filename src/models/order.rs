use chrono::{DateTime, Utc};

/// Everything a polling task needs, captured by value when the order is placed.
#[derive(Debug, Clone)]
pub struct PendingOrder {
    pub order_id: String,
    pub user_id: i64,
    pub chat_id: i64,
    pub amount: u64,
    pub password: String,
    pub days: u32,
    pub created_at: DateTime<Utc>,
}

pub fn make_order_id(prefix: &str, user_id: i64, at: DateTime<Utc>) -> String {
    format!("{}_{}_{}", prefix, at.timestamp_millis(), user_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn order_id_combines_prefix_time_and_user() {
        let at = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(make_order_id("VPN", 42, at), "VPN_1735787045000_42");
    }
}
