use crate::domain::AccountId;
use crate::module::options::{QueueingOptions, RedisOptions};
use structopt::StructOpt;

/// Options for the notifier module
#[derive(Debug, StructOpt)]
pub struct Options {
    #[allow(missing_docs)]
    #[structopt(flatten)]
    pub queueing: QueueingOptions,

    #[allow(missing_docs)]
    #[structopt(flatten)]
    pub redis: RedisOptions,

    /// Accounts notified about events which carry no explicit recipient,
    /// e.g. task updates and completions
    #[structopt(
        long = "admin-recipient",
        env = "ADMIN_RECIPIENTS",
        default_value = "1",
        use_delimiter = true,
        value_name = "account"
    )]
    pub admin_recipients: Vec<AccountId>,
}
