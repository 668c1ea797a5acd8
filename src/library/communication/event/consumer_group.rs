/// Unique identifier for a group of consumers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsumerGroupIdentifier {
    /// Notification pipeline workers
    Notifications,
    /// Any other consumer group
    Other(String),
}

impl ToString for ConsumerGroupIdentifier {
    fn to_string(&self) -> String {
        match self {
            Self::Notifications => "notifications".into(),
            Self::Other(identifier) => identifier.to_owned(),
        }
    }
}

/// Location within a topic from which a freshly created group starts consuming
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueLocation {
    /// Start of the topic, replaying everything that is still retained
    Head,
    /// End of the topic, only new entries
    Tail,
}

/// Definition of a consumer group
///
/// All members sharing a group name collectively consume one topic; each entry
/// is handed to exactly one member at a time and remains pending until that
/// member acknowledges it.
#[derive(Debug, Clone)]
pub struct ConsumerGroupDescriptor {
    identifier: ConsumerGroupIdentifier,
    start: QueueLocation,
}

impl ConsumerGroupDescriptor {
    /// Creates a new instance from raw parts
    pub fn new(identifier: ConsumerGroupIdentifier, start: QueueLocation) -> Self {
        Self { identifier, start }
    }

    /// Unique identifier of the group
    pub fn identifier(&self) -> &ConsumerGroupIdentifier {
        &self.identifier
    }

    /// Location from where the group begins to consume
    ///
    /// Only honored when the group is first created; an existing group keeps
    /// its cursor.
    pub fn start(&self) -> &QueueLocation {
        &self.start
    }
}

impl Default for ConsumerGroupDescriptor {
    /// Uses [`ConsumerGroupIdentifier::Notifications`] starting at the [`QueueLocation::Head`]
    fn default() -> Self {
        Self {
            identifier: ConsumerGroupIdentifier::Notifications,
            start: QueueLocation::Head,
        }
    }
}
