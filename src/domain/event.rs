use crate::library::communication::event::{Event, EventKind};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Closed set of events exchanged between the platform services
///
/// Constructing one of these is the only way to address an event topic, so an
/// invalid tag can never travel further than the codec that encounters it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// A new account has been registered
    AccountCreated,
    /// An account's profile has changed
    AccountUpdated,
    /// An account has been removed
    AccountDeleted,
    /// A task has been created
    TaskCreated,
    /// A task's content has changed
    TaskUpdated,
    /// A task has been removed
    TaskDeleted,
    /// A task has been assigned to a worker
    TaskAssigned,
    /// A task has been finished by a worker
    TaskCompleted,
    /// A notification reached its recipient
    NotificationSent,
    /// A notification could not be delivered
    NotificationFailed,
}

impl EventKind for EventType {
    fn key(&self) -> &'static str {
        match self {
            Self::AccountCreated => "account-created",
            Self::AccountUpdated => "account-updated",
            Self::AccountDeleted => "account-deleted",
            Self::TaskCreated => "task-created",
            Self::TaskUpdated => "task-updated",
            Self::TaskDeleted => "task-deleted",
            Self::TaskAssigned => "task-assigned",
            Self::TaskCompleted => "task-completed",
            Self::NotificationSent => "notification-sent",
            Self::NotificationFailed => "notification-failed",
        }
    }

    fn parse(key: &str) -> Option<Self> {
        match key {
            "account-created" => Some(Self::AccountCreated),
            "account-updated" => Some(Self::AccountUpdated),
            "account-deleted" => Some(Self::AccountDeleted),
            "task-created" => Some(Self::TaskCreated),
            "task-updated" => Some(Self::TaskUpdated),
            "task-deleted" => Some(Self::TaskDeleted),
            "task-assigned" => Some(Self::TaskAssigned),
            "task-completed" => Some(Self::TaskCompleted),
            "notification-sent" => Some(Self::NotificationSent),
            "notification-failed" => Some(Self::NotificationFailed),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Tag outside the closed [`EventType`] set
#[derive(Debug, Error)]
#[error("unknown event type `{0}`")]
pub struct UnknownEventType(String);

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::parse(s).ok_or_else(|| UnknownEventType(s.to_owned()))
    }
}

/// Event as exchanged between the platform services
pub type PlatformEvent = Event<EventType>;
