use super::PlatformEvent;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Identifier of a platform account
pub type AccountId = i64;

/// Payload of one notification travelling through the work queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationRequest {
    /// Account the notification is addressed to
    pub user_id: AccountId,
    /// Short headline
    pub title: String,
    /// Body text
    pub message: String,
}

impl NotificationRequest {
    /// Creates a new instance from raw parts
    pub fn new<T, M>(user_id: AccountId, title: T, message: M) -> Self
    where
        T: Into<String>,
        M: Into<String>,
    {
        Self {
            user_id,
            title: title.into(),
            message: message.into(),
        }
    }

    /// Serializes the request into an opaque work queue payload
    pub fn into_payload(self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // A struct of primitives always serializes to an object
            _ => Map::new(),
        }
    }

    /// Decodes a work queue payload back into a request
    ///
    /// Fails when mandatory fields (most importantly the recipient) are
    /// missing, which the worker treats as a business failure of the task.
    pub fn from_payload(payload: &Map<String, Value>) -> Result<Self, serde_json::Error> {
        serde_json::from_value(Value::Object(payload.clone()))
    }
}

/// Decides which accounts are notified about events without an explicit recipient
///
/// Task updates and completions address "the responsible administrators",
/// which only the deployment knows. Implementations are injected into the
/// event handlers; nothing falls back to a hardcoded identifier.
pub trait RecipientPolicy: Send + Sync {
    /// Accounts to notify about a task update
    fn update_audience(&self, event: &PlatformEvent) -> Vec<AccountId>;

    /// Accounts to notify about a task completion
    fn completion_audience(&self, event: &PlatformEvent) -> Vec<AccountId>;
}

/// [`RecipientPolicy`] notifying a fixed set of administrator accounts
///
/// The set comes from module configuration, keeping the routing decision
/// explicit and per-deployment.
pub struct StaticRecipients {
    admins: Vec<AccountId>,
}

impl StaticRecipients {
    /// Creates a new instance from raw parts
    pub fn new(admins: Vec<AccountId>) -> Self {
        Self { admins }
    }
}

impl RecipientPolicy for StaticRecipients {
    fn update_audience(&self, _event: &PlatformEvent) -> Vec<AccountId> {
        self.admins.clone()
    }

    fn completion_audience(&self, _event: &PlatformEvent) -> Vec<AccountId> {
        self.admins.clone()
    }
}

#[cfg(test)]
mod does {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn round_trip_through_a_payload() {
        let request = NotificationRequest::new(7, "t", "m");
        let decoded = NotificationRequest::from_payload(&request.clone().into_payload()).unwrap();

        assert_eq!(decoded, request);
    }

    #[test]
    fn reject_payloads_without_a_recipient() {
        let mut payload = NotificationRequest::new(7, "t", "m").into_payload();
        payload.remove("user_id");

        assert!(NotificationRequest::from_payload(&payload).is_err());
    }
}
