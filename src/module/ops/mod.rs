//! One-shot administrative commands against the delivery core
//!
//! Inspection and repair of the quarantine areas: stream and queue
//! statistics, listing dead letters, returning them to their topic and
//! clearing them out. Everything here talks to the same stores the long
//! running modules use, just without job supervision.

use crate::constants::NOTIFICATION_CHANNEL;
use crate::domain::EventType;
use crate::harness::{DummyResourceHandleProvider, RedisBroker};
use crate::library::communication::event::{BusConfig, EventBus, EventKind, HandlerRegistry};
use crate::library::communication::work::{WorkQueue, WorkQueueConfig};
use crate::module::options::RedisOptions;
use anyhow::Result;
use std::sync::Arc;
use structopt::StructOpt;

/// Options for the ops module
#[derive(Debug, StructOpt)]
pub struct Options {
    #[allow(missing_docs)]
    #[structopt(flatten)]
    pub redis: RedisOptions,

    #[structopt(subcommand)]
    command: Command,
}

#[derive(Debug, StructOpt)]
enum Command {
    /// Print point-in-time lengths of the work queue and its dead-letter list
    Stats,
    /// Print topic statistics for one event kind
    StreamInfo {
        /// Event kind tag, e.g. task-created
        event_type: EventType,
    },
    /// List dead-lettered events, oldest first
    DlqList {
        /// Maximum number of entries to print
        #[structopt(long, default_value = "10")]
        count: usize,
    },
    /// Return a dead-lettered event to the topic of the given kind
    DlqReprocess {
        /// Identifier of the dead-letter entry
        id: String,
        /// Event kind tag whose topic the entry is returned to
        event_type: EventType,
    },
    /// Delete every dead-lettered event. Irreversible
    DlqClear,
    /// List dead-lettered work queue tasks, newest first
    WorkDlq {
        /// Maximum number of tasks to print
        #[structopt(long, default_value = "10")]
        limit: usize,
    },
    /// Empty the pending work queue. Irreversible
    WorkClear,
}

/// Executes one administrative command and returns
pub async fn run(options: Options) -> Result<()> {
    let broker = RedisBroker::new(options.redis.url.clone(), DummyResourceHandleProvider::new());
    let bus: EventBus<_, EventType> = EventBus::new(
        broker.log_store(),
        Arc::new(HandlerRegistry::new()),
        BusConfig::default(),
    );
    let queue = WorkQueue::new(
        broker.list_store(),
        WorkQueueConfig::for_channel(NOTIFICATION_CHANNEL),
    );

    match options.command {
        Command::Stats => {
            let stats = queue.stats().await?;
            println!("queue length:       {}", stats.queue_length);
            println!("dead-letter length: {}", stats.dlq_length);
        }
        Command::StreamInfo { event_type } => {
            let info = bus.topic_info(&event_type).await?;
            println!("topic:  {}", event_type.topic());
            println!("length: {}", info.length);
            println!("first:  {}", info.first_entry.unwrap_or_else(|| "-".into()));
            println!("last:   {}", info.last_entry.unwrap_or_else(|| "-".into()));
        }
        Command::DlqList { count } => {
            for letter in bus.dead_letters(count).await? {
                println!(
                    "{}  kind={}  retries={}  failed_at={}  error={}",
                    letter.id,
                    letter.record.event().kind().key(),
                    letter.record.retries(),
                    letter.failed_at.to_rfc3339(),
                    letter.error,
                );
            }
        }
        Command::DlqReprocess { id, event_type } => {
            match bus.reprocess_dead_letter(&id, &event_type).await? {
                Some(new_id) => println!("reprocessed {} as {}", id, new_id),
                None => println!("no dead letter with id {}", id),
            }
        }
        Command::DlqClear => {
            bus.clear_dead_letters().await?;
            println!("dead-letter topic cleared");
        }
        Command::WorkDlq { limit } => {
            for task in queue.dead_letter_items(limit).await? {
                println!("{}", serde_json::to_string_pretty(&task)?);
            }
        }
        Command::WorkClear => {
            queue.clear().await?;
            println!("work queue cleared");
        }
    }

    Ok(())
}
