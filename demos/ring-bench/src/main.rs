//! Role driver benchmark for shmring.
//!
//! Two processes rendezvous on a named segment: the owner creates it and
//! consumes records, the peer attaches and produces them. Roles come from
//! the CLI, never from fork return values, and the attach handshake in the
//! library removes the need for any startup delay.
//!
//! Run the sides in two terminals:
//!
//! ```bash
//! cargo run -p ring-bench -- owner --count 1000000
//! cargo run -p ring-bench -- peer --count 1000000
//! ```
//!
//! or let the owner spawn the peer itself:
//!
//! ```bash
//! cargo run -p ring-bench -- spawn --record-size 64 --count 1000000
//! ```

use std::process::Command;
use std::time::Instant;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use shmring::{IndexMode, RingConfig, Segment, SyncMode, pop_with_retry, push_with_retry};

#[derive(Parser)]
#[command(name = "ring-bench", about = "shared-memory ring throughput benchmark")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Create the segment and consume records.
    Owner(BenchArgs),
    /// Attach to the segment and produce records.
    Peer(BenchArgs),
    /// Run the owner here and the peer as a child process.
    Spawn(BenchArgs),
}

#[derive(Args, Clone)]
struct BenchArgs {
    /// Segment name in the OS shared-memory namespace.
    #[arg(long, default_value = "/shmring-bench")]
    name: String,

    /// Bytes per record.
    #[arg(long, default_value_t = 64)]
    record_size: u32,

    /// Records to move end to end.
    #[arg(long, default_value_t = 1_000_000)]
    count: u64,

    /// Take the in-segment spin-lock around every push and pop.
    #[arg(long)]
    locked: bool,

    /// Round capacity to a power of two and use mask-based indexing.
    #[arg(long)]
    pow2: bool,

    /// Fence between the payload copy and the index update.
    #[arg(long)]
    fenced: bool,
}

impl BenchArgs {
    fn config(&self) -> RingConfig {
        RingConfig {
            sync: if self.locked {
                SyncMode::SpinLocked
            } else {
                SyncMode::Unsynchronized
            },
            index: if self.pow2 {
                IndexMode::PowerOfTwoMask
            } else {
                IndexMode::PlainModulo
            },
            fenced: self.fenced,
        }
    }

    /// Room for ~50 in-flight records plus the slack byte. Widened to u64
    /// so a huge --record-size fails here rather than wrapping silently;
    /// the library still bounds-checks the result on create.
    fn capacity(&self) -> Result<u32> {
        let wanted = u64::from(self.record_size) * 50 + 1;
        u32::try_from(wanted)
            .map_err(|_| anyhow::anyhow!("record size {} is too large for a ring", self.record_size))
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Cmd::Owner(args) => run_owner(&args),
        Cmd::Peer(args) => run_peer(&args),
        Cmd::Spawn(args) => run_spawn(&args),
    }
}

fn run_owner(args: &BenchArgs) -> Result<()> {
    if args.record_size == 0 {
        bail!("record size must be nonzero");
    }
    let segment = Segment::create(&args.name, args.capacity()?, args.config())
        .context("creating segment")?;
    tracing::info!(name = %args.name, capacity = segment.ring().capacity(), "segment ready");

    let ring = segment.ring();
    let mut record = vec![0u8; args.record_size as usize];
    let start = Instant::now();
    for _ in 0..args.count {
        pop_with_retry(&ring, &mut record, None).expect("unbounded retry cannot reject");
    }
    let elapsed = start.elapsed().as_secs_f64();

    report("consumed", args, elapsed);
    segment.destroy().context("destroying segment")?;
    Ok(())
}

fn run_peer(args: &BenchArgs) -> Result<()> {
    if args.record_size == 0 {
        bail!("record size must be nonzero");
    }
    let segment = Segment::attach(&args.name).context("attaching to segment")?;
    tracing::info!(name = %args.name, "attached");

    let ring = segment.ring();
    let record = vec![0x5au8; args.record_size as usize];
    let start = Instant::now();
    for _ in 0..args.count {
        push_with_retry(&ring, &record, None).expect("unbounded retry cannot reject");
    }
    let elapsed = start.elapsed().as_secs_f64();

    report("produced", args, elapsed);
    segment.destroy().context("detaching from segment")?;
    Ok(())
}

fn run_spawn(args: &BenchArgs) -> Result<()> {
    if args.record_size == 0 {
        bail!("record size must be nonzero");
    }
    let exe = std::env::current_exe().context("locating own executable")?;
    // Mode flags are not forwarded: the peer reads the modes the owner
    // stored in the header.
    let peer_args = vec![
        "peer".to_string(),
        "--name".to_string(),
        args.name.clone(),
        "--record-size".to_string(),
        args.record_size.to_string(),
        "--count".to_string(),
        args.count.to_string(),
    ];
    // Create before spawning, so the child's attach can only ever see a
    // live segment; its handshake covers the rest.
    let segment = Segment::create(&args.name, args.capacity()?, args.config())
        .context("creating segment")?;
    let mut child = Command::new(exe)
        .args(&peer_args)
        .spawn()
        .context("spawning peer process")?;

    let ring = segment.ring();
    let mut record = vec![0u8; args.record_size as usize];
    let start = Instant::now();
    for _ in 0..args.count {
        pop_with_retry(&ring, &mut record, None).expect("unbounded retry cannot reject");
    }
    let elapsed = start.elapsed().as_secs_f64();
    report("consumed", args, elapsed);

    let status = child.wait().context("waiting for peer")?;
    if !status.success() {
        bail!("peer exited with {}", status);
    }
    segment.destroy().context("destroying segment")?;
    Ok(())
}

fn report(verb: &str, args: &BenchArgs, elapsed: f64) {
    let bytes = args.count as f64 * args.record_size as f64;
    println!(
        "{} {} records of {} bytes in {:.3}s: {:.2} MB/s, {:.0} msg/s",
        verb,
        args.count,
        args.record_size,
        elapsed,
        bytes / (elapsed * 1024.0 * 1024.0),
        args.count as f64 / elapsed,
    );
}
