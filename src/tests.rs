//! Library unit tests

#[cfg(test)]
mod types_tests {
    use crate::types::*;
    use chrono::{TimeZone, Utc};
    use std::collections::HashSet;

    #[test]
    fn test_registration_identity() {
        let mut set = HashSet::new();
        set.insert(Registration::new("A1", "D1"));
        set.insert(Registration::new("A1", "D1"));
        set.insert(Registration::new("A1", "D2"));
        set.insert(Registration::new("A2", "D1"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_subscription_field_names() {
        let subscription = Subscription {
            device_token: "D1".to_string(),
            mailboxes: ["INBOX".to_string()].into_iter().collect(),
            registered_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
        };

        let json = serde_json::to_value(&subscription).unwrap();
        assert_eq!(json["DeviceToken"], "D1");
        assert_eq!(json["Mailboxes"][0], "INBOX");
        assert_eq!(json["RegistrationTime"], "2024-03-01T12:00:00Z");
    }

    #[test]
    fn test_subscription_legacy_values() {
        let subscription: Subscription = serde_json::from_str(
            r#"{"DeviceToken":"D1","Mailboxes":null,"RegistrationTime":"0001-01-01T00:00:00Z"}"#,
        )
        .unwrap();

        assert!(subscription.mailboxes.is_empty());
        assert!(subscription.registered_at.is_none());
        assert!(!subscription.contains_mailbox("INBOX"));
    }

    #[test]
    fn test_subscription_time_with_offset() {
        let subscription: Subscription = serde_json::from_str(
            r#"{"DeviceToken":"D1","Mailboxes":["INBOX"],"RegistrationTime":"2024-03-01T14:00:00.5+02:00"}"#,
        )
        .unwrap();

        assert_eq!(
            subscription.registered_at.map(|t| t.timestamp()),
            Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap().timestamp())
        );
        assert!(subscription.contains_mailbox("INBOX"));
    }

    #[test]
    fn test_account_count() {
        let document: RegistryDocument = serde_json::from_str(
            r#"{
                "Users": {
                    "alice": {"Accounts": {
                        "A1": {"DeviceToken": "D1", "Mailboxes": ["INBOX"]},
                        "A2": {"DeviceToken": "D2", "Mailboxes": ["INBOX"]}
                    }},
                    "bob": {"Accounts": {}}
                }
            }"#,
        )
        .unwrap();

        assert_eq!(document.account_count(), 2);
        assert_eq!(RegistryDocument::default().account_count(), 0);
    }
}
