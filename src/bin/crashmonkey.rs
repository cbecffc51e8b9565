//! `crashmonkey` CLI entry point: thin argument parsing and wiring, every
//! substantive behavior lives in the library crate.

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;

use crashmonkey::checkpoint;
use crashmonkey::config::HarnessConfig;
use crashmonkey::device::DeviceController;
use crashmonkey::epoch::DiskLog;
use crashmonkey::linux::{self, LinuxDevice, RealLogChannel};
use crashmonkey::logio;
use crashmonkey::random_permuter::RandomPermuter;
use crashmonkey::testloop::{RealFsckRunner, RealSnapshotIo, TestLoop};
use crashmonkey::workloads;

#[derive(Parser)]
#[command(name = "crashmonkey")]
#[command(author, version, about = "Crash-consistency testing harness for file systems", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record a workload and run it through the crash-state test loop.
    Run {
        /// Path to a TOML `HarnessConfig` file; defaults are used for any
        /// field not in the file, or if no file is given at all.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Overrides `HarnessConfig::num_rounds`.
        #[arg(long)]
        rounds: Option<usize>,

        /// Overrides `HarnessConfig::seed`.
        #[arg(long)]
        seed: Option<u64>,

        /// Name of a bundled workload to run.
        #[arg(long, default_value = "generic_090")]
        workload: String,

        /// Output format for the final summary.
        #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
        format: OutputFormat,
    },

    /// List the names of bundled workloads.
    ListWorkloads,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { config, rounds, seed, workload, format } => run(config, rounds, seed, &workload, format),
        Commands::ListWorkloads => {
            for name in workloads::bundled_workloads().registered_names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

fn run(
    config_path: Option<PathBuf>,
    rounds: Option<usize>,
    seed: Option<u64>,
    workload_name: &str,
    format: OutputFormat,
) -> Result<()> {
    let mut config = match &config_path {
        Some(path) => HarnessConfig::load(path).context("loading harness config")?,
        None => HarnessConfig::default(),
    };
    if let Some(rounds) = rounds {
        config.num_rounds = rounds;
    }
    if let Some(seed) = seed {
        config.seed = seed;
    }

    let mut registry = workloads::bundled_workloads();
    registry.load(workload_name).with_context(|| format!("loading workload {workload_name:?}"))?;
    let workload = registry.instance_mut().expect("just loaded");

    let wrapper_ioctl_path = format!("{}_ioctl", config.flags_device);
    let mut device = DeviceController::new(
        LinuxDevice::new(config.target_device.clone(), wrapper_ioctl_path),
        config.mount_point.clone(),
    );
    let cow_params = crashmonkey::device::CowParams {
        num_disks: config.num_disks,
        num_snapshots: config.num_snapshots,
        disk_size: config.disk_size,
    };
    device.acquire(cow_params, &config.target_device, &config.flags_device).context("acquiring device resources")?;

    info!("running workload setup (unlogged)");
    let setup_status = workload.setup();
    if setup_status != 0 {
        device.teardown();
        bail!("workload setup failed with status {setup_status}");
    }

    // The baseline every crash state's `restore_snapshot` reverts to: the
    // post-setup, pre-run state (§2, §4.4, §4.6 step 3).
    device.snapshot().context("snapshotting post-setup state")?;

    let _dirty_expire_guard = linux::DirtyExpireGuard::acquire("500").ok();
    linux::clear_caches().ok();

    let wrapper_fd = device.device().wrapper_raw_fd();
    let log = if let Some(fd) = wrapper_fd {
        linux::set_logging(fd, true).context("enabling log recording")?;
        let mut recorder = checkpoint::SessionCheckpointRecorder::new();
        let run_status = workload.run(&mut recorder);
        linux::set_logging(fd, false).context("disabling log recording")?;
        if run_status != 0 {
            device.teardown();
            bail!("workload run failed with status {run_status}");
        }

        let mut channel = RealLogChannel::new(fd);
        let drained = logio::drain_log(&mut channel).context("draining wrapper log")?;
        checkpoint::splice_markers(drained, recorder.into_markers())
    } else {
        DiskLog::from_ops(Vec::new())
    };

    let mut permuter = RandomPermuter::new(config.seed);
    let mut test_loop = TestLoop::new(device, RealSnapshotIo, RealFsckRunner, config);
    let suite = test_loop.run(&log, &mut permuter, workload);
    test_loop.teardown();

    match format {
        OutputFormat::Human => println!("{suite}"),
        OutputFormat::Json => {
            let json = serde_json::json!({ "completed": suite.completed_count() });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }

    Ok(())
}
