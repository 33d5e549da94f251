use std::{path::PathBuf, process, thread};

use anyhow::{anyhow, Context};
use structopt::StructOpt;
use tracing::{error, info};
use tracing_subscriber::*;

use fl_topo::{
    model::ParameterList,
    runtime::{Launcher, LocalGroup, Runtime},
    settings::{RuntimeSettings, Settings, TopologySettings},
    topology::{NodeId, RandMethod, Removal, Topo, TopologySource},
};

#[derive(Debug, StructOpt)]
#[structopt(name = "fl-topo")]
struct Opt {
    /// Path of the configuration file
    #[structopt(short, parse(from_os_str))]
    config_path: PathBuf,

    /// Simulate a group of this many ranks in this process
    #[structopt(long)]
    local_ranks: Option<usize>,

    /// Node (`c3`) or link (`c1:c0`) to remove, decided by the monitor rank
    #[structopt(long, parse(try_from_str = parse_drop))]
    drop: Vec<Target>,

    /// Generate the topology (e.g. `static:5`) instead of using the configured one
    #[structopt(long)]
    generate: Option<RandMethod>,

    /// Print the topology description instead of the loaded topology
    #[structopt(long)]
    describe: bool,
}

#[derive(Debug)]
enum Target {
    Node(NodeId),
    Link(NodeId, NodeId),
}

fn parse_drop(s: &str) -> Result<Target, String> {
    match s.split_once(':') {
        Some((from, to)) if !from.is_empty() && !to.is_empty() => {
            Ok(Target::Link(from.into(), to.into()))
        }
        None if !s.is_empty() => Ok(Target::Node(s.into())),
        _ => Err(format!("expected <node> or <from>:<to>, got {:?}", s)),
    }
}

fn removal(targets: Vec<Target>) -> Removal {
    let mut removal = Removal::default();
    for target in targets {
        match target {
            Target::Node(node) => removal.nodes.push(node),
            Target::Link(from, to) => removal.edges.push((from, to)),
        }
    }
    removal
}

fn main() {
    let opt = Opt::from_args();

    let settings = Settings::new(&opt.config_path).unwrap_or_else(|err| {
        eprintln!("{}", err);
        process::exit(1);
    });
    let Settings {
        log,
        runtime,
        topology,
        model,
    } = settings;

    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(log.filter)
        .with_ansi(true)
        .init();

    let source = topology_source(opt.generate, &topology);
    let model = model.parameter_list();
    let result = if opt.describe {
        describe(&source)
    } else {
        let removal = removal(opt.drop);
        match opt.local_ranks {
            Some(world_size) => simulate_group(world_size, model, source, removal),
            None => run(&runtime, &model, &source, &removal),
        }
    };

    if let Err(err) = result {
        error!("{:#}", err);
        process::exit(1);
    }
}

/// The generated topology if one was asked for, the configured one otherwise.
fn topology_source(generate: Option<RandMethod>, topology: &TopologySettings) -> TopologySource {
    generate
        .map(TopologySource::from)
        .unwrap_or_else(|| topology.source())
}

fn describe(source: &TopologySource) -> anyhow::Result<()> {
    let description = source.describe()?;
    print!("{}", description.to_yaml_string()?);
    Ok(())
}

/// Runs as one rank of the process group configured in the settings.
fn run(
    settings: &RuntimeSettings,
    model: &ParameterList,
    source: &TopologySource,
    removal: &Removal,
) -> anyhow::Result<()> {
    // no backend is compiled into this build
    let launcher = Launcher::new();
    let runtime = launcher
        .init_process_group(settings.backend, &settings.bootstrap())
        .context("failed to initialize the process group")?;
    println!("{}", rank_report(&*runtime, model, source, removal)?);
    Ok(())
}

/// Runs a group of `world_size` ranks on as many threads and prints their reports in rank order.
fn simulate_group(
    world_size: usize,
    model: ParameterList,
    source: TopologySource,
    removal: Removal,
) -> anyhow::Result<()> {
    if world_size == 0 {
        return Err(anyhow!("a process group needs at least one rank"));
    }
    info!("simulating a group of {} ranks", world_size);

    let handles: Vec<_> = LocalGroup::new(world_size)
        .into_ranks()
        .into_iter()
        .map(|runtime| {
            let model = model.clone();
            let source = source.clone();
            let removal = removal.clone();
            thread::spawn(move || rank_report(&runtime, &model, &source, &removal))
        })
        .collect();
    for (rank, handle) in handles.into_iter().enumerate() {
        let report = handle
            .join()
            .map_err(|_| anyhow!("rank {} panicked", rank))??;
        println!("==> rank {}\n{}", rank, report);
    }
    Ok(())
}

fn rank_report(
    runtime: &dyn Runtime,
    model: &ParameterList,
    source: &TopologySource,
    removal: &Removal,
) -> anyhow::Result<String> {
    let mut topo = Topo::from_source(model, runtime, source)?;
    if !removal.is_empty() {
        let proposal = if topo.rank() == topo.monitor_rank() {
            Some(removal)
        } else {
            None
        };
        let (_, report) = topo.sync_removal(proposal)?;
        if !report.is_clean() {
            info!(
                "rank {} skipped {} unknown nodes and {} unknown links",
                topo.rank(),
                report.unknown_nodes.len(),
                report.unknown_edges.len()
            );
        }
    }
    topo.check_partition()?;
    Ok(topo.report())
}
