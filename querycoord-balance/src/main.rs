//! Query Coordinator Balance Replay
//!
//! Replays one balance round from a JSON snapshot:
//! - Logs the current replica distribution
//! - Orders channel candidates by WAL colocation
//! - Logs the balancer's plans
//! - Builds segment and channel tasks and prints them

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use querycoord_balance::{
    print_current_replica_dist, print_new_balance_plans, BalanceConfig, BalanceSnapshot,
    ColocationSorter, Source, TaskFactory, TaskIdAllocator,
};
use querycoord_meta::{ChannelDistManager, NodeState, SegmentDistManager};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SourceArg {
    Balancer,
    Checker,
}

impl From<SourceArg> for Source {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Balancer => Source::Balancer,
            SourceArg::Checker => Source::Checker,
        }
    }
}

#[derive(Parser)]
#[command(name = "querycoord-balance")]
#[command(about = "Replay a query coordinator balance round from a snapshot")]
struct Cli {
    /// Snapshot file (JSON)
    #[arg(long)]
    snapshot: PathBuf,

    /// Component the tasks are attributed to
    #[arg(long, value_enum, default_value = "balancer")]
    source: SourceArg,

    /// Force WAL-aware channel ordering on
    #[arg(long, default_value = "false")]
    streaming: bool,

    /// Override the segment task timeout (milliseconds)
    #[arg(long)]
    segment_timeout_ms: Option<u64>,

    /// Override the channel task timeout (milliseconds)
    #[arg(long)]
    channel_timeout_ms: Option<u64>,

    /// Emit logs as JSON
    #[arg(long, default_value = "false")]
    log_json: bool,
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let mut config = BalanceConfig::from_env()?;
    if cli.streaming {
        config.streaming_enabled = true;
    }
    if let Some(ms) = cli.segment_timeout_ms {
        config.segment_task_timeout_ms = ms;
    }
    if let Some(ms) = cli.channel_timeout_ms {
        config.channel_task_timeout_ms = ms;
    }

    let snapshot = BalanceSnapshot::load(&cli.snapshot)?;
    let replica = snapshot.replica.clone();

    info!(
        collection = replica.collection_id,
        replica = replica.id,
        nodes = replica.nodes.len(),
        streaming = config.streaming_enabled,
        "Replaying balance round"
    );

    // Step 1: Current distribution
    let segment_dist = SegmentDistManager::new();
    let channel_dist = ChannelDistManager::new();
    snapshot.populate(&segment_dist, &channel_dist);

    let stopping = snapshot.node_segments(NodeState::Stopping);
    let normal = snapshot.node_segments(NodeState::Normal);
    print_current_replica_dist(&replica, &stopping, &normal, &channel_dist, &segment_dist);

    // Step 2: Channel candidates, colocated last
    let sorter = ColocationSorter::new(Arc::new(snapshot.wal_locator()), config.streaming_enabled);
    let candidates: Vec<String> = sorter
        .sort(snapshot.replica_channels())
        .into_iter()
        .map(|ch| ch.channel_name)
        .collect();
    info!(candidates = ?candidates, "Channel candidates");

    // Step 3: Plans
    let segment_plans = snapshot.resolve_segment_plans()?;
    let channel_plans = snapshot.resolve_channel_plans()?;
    if config.print_plans {
        print_new_balance_plans(
            replica.collection_id,
            replica.id,
            &segment_plans,
            &channel_plans,
        );
    }

    // Step 4: Tasks
    let ctx = CancellationToken::new();
    let factory = TaskFactory::with_allocator(Arc::new(TaskIdAllocator::new()));
    let source = Source::from(cli.source);

    let segment_outcome = factory.build_segment_tasks(
        &ctx,
        source,
        config.segment_task_timeout(),
        &segment_plans,
    );
    segment_outcome.emit();

    let channel_outcome = factory.build_channel_tasks(
        &ctx,
        source,
        config.channel_task_timeout(),
        &channel_plans,
    );
    channel_outcome.emit();

    let skipped = segment_outcome.skipped() + channel_outcome.skipped();
    if skipped > 0 {
        warn!(skipped, "Some plans did not produce tasks");
    }

    for task in channel_outcome.tasks.iter().chain(segment_outcome.tasks.iter()) {
        println!("{}", task);
    }

    info!(
        segment_tasks = segment_outcome.tasks.len(),
        channel_tasks = channel_outcome.tasks.len(),
        skipped,
        "Balance round replayed"
    );

    Ok(())
}
