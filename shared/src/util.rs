/// Current UTC timestamp (epoch millis)
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Canonical form of a product name: trimmed and lowercase
///
/// Product names are persisted in this form and compared in this form.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Widget "), "widget");
        assert_eq!(normalize_name("WIDGET"), normalize_name("widget"));
        assert_eq!(normalize_name("Blue Widget"), "blue widget");
    }

    #[test]
    fn test_now_millis_is_recent() {
        // 2024-01-01T00:00:00Z
        assert!(now_millis() > 1_704_067_200_000);
    }
}
