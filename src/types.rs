//! Core types used throughout the push daemon

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Account identifier issued by the mail client
pub type AccountId = String;

/// Opaque APNs device token (hex)
pub type DeviceToken = String;

/// Mailbox name
pub type MailboxName = String;

/// Username as known to the mail server
pub type Username = String;

/// Mailbox that triggers pushes
pub const INBOX: &str = "INBOX";

/// The only subtopic iOS Mail registers with
pub const MAIL_SUBTOPIC: &str = "com.apple.mobilemail";

/// Event marker for a newly delivered message
pub const MESSAGE_NEW_EVENT: &str = "MessageNew";

/// A push target: one account on one device
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Registration {
    pub account_id: AccountId,
    pub device_token: DeviceToken,
}

impl Registration {
    pub fn new(account_id: impl Into<AccountId>, device_token: impl Into<DeviceToken>) -> Self {
        Self {
            account_id: account_id.into(),
            device_token: device_token.into(),
        }
    }
}

/// Mailboxes a device wants pushes for, per account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Subscription {
    pub device_token: DeviceToken,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub mailboxes: BTreeSet<MailboxName>,
    /// Records written before registration times were tracked have none
    #[serde(
        default,
        rename = "RegistrationTime",
        deserialize_with = "zero_time_as_none"
    )]
    pub registered_at: Option<DateTime<Utc>>,
}

impl Subscription {
    pub fn contains_mailbox(&self, mailbox: &str) -> bool {
        self.mailboxes.contains(mailbox)
    }
}

/// All accounts registered for one user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserRecord {
    #[serde(default)]
    pub accounts: BTreeMap<AccountId, Subscription>,
}

/// The persisted registry, keyed by username
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RegistryDocument {
    #[serde(default)]
    pub users: BTreeMap<Username, UserRecord>,
}

impl RegistryDocument {
    /// Number of registered accounts across all users
    pub fn account_count(&self) -> usize {
        self.users.values().map(|u| u.accounts.len()).sum()
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<BTreeSet<MailboxName>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<BTreeSet<MailboxName>>::deserialize(deserializer)?.unwrap_or_default())
}

fn zero_time_as_none<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let time = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(time.filter(|t| t.year() > 1))
}
