//! Various options usable by modules
//!
//! The structs in this module allow other modules to flatten them into
//! their own options struct. This allows for a unified yet non-cluttered
//! option set.

use structopt::StructOpt;
use uuid::Uuid;

/// Options for connecting to the redis server
#[derive(Debug, StructOpt)]
pub struct RedisOptions {
    /// Redis database server URL
    #[structopt(
        short = "r",
        long = "redis",
        env = "REDIS",
        global = true,
        default_value = "redis://courier-redis/",
        value_name = "url"
    )]
    pub url: String,
}

/// Options relevant for message queueing
#[derive(Debug, StructOpt)]
pub struct QueueingOptions {
    /// Stable identifier for this instance within its consumer groups.
    /// It is used to resume unacknowledged deliveries after a crash or
    /// deliberate restart, so it should not change across executions.
    /// A random identifier is generated when omitted.
    #[structopt(long, env = "ID")]
    pub id: Option<String>,
}

impl QueueingOptions {
    /// The configured instance identifier or a freshly generated one
    pub fn instance_id(&self) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string())
    }
}
