use std::fs;
use std::io;
use std::path::PathBuf;

use anetsim::sim::config::SimulationConfig;
use anetsim::sim::perf_log::{perf_run_dir, write_summary};
use anetsim::sim::top::NetworkSim;
use anetsim::traffic::config::TrafficPattern;
use anyhow::Context;
use clap::Parser;
use toml::Table;

#[derive(Parser)]
#[command(version, about)]
struct AnetArgs {
    #[arg(help = "Path to config.toml")]
    config_path: PathBuf,
    #[arg(long, help = "Override total number of cores")]
    total_cores: Option<u32>,
    #[arg(long, help = "Override number of cores per cluster")]
    cluster_size: Option<u32>,
    #[arg(long, help = "Override number of simulator processes")]
    process_count: Option<u32>,
    #[arg(long, help = "Override packets injected per application core")]
    num_packets: Option<u32>,
    #[arg(long, help = "Override traffic pattern")]
    pattern: Option<TrafficPattern>,
    #[arg(long, help = "Write the JSON run summary to this path")]
    summary_json: Option<PathBuf>,
}

pub fn main() -> anyhow::Result<()> {
    env_logger::init();

    let argv = AnetArgs::parse();
    let config = fs::read_to_string(&argv.config_path).with_context(|| {
        format!("failed to read config file {}", argv.config_path.display())
    })?;
    let mut config_table: Table = toml::from_str(&config).context("cannot parse config toml")?;

    // override toml configs with argv before the sections are checked
    override_value(&mut config_table, &["general", "total_cores"], argv.total_cores);
    override_value(&mut config_table, &["network", "anet", "cluster_size"], argv.cluster_size);
    override_value(&mut config_table, &["general", "process_count"], argv.process_count);
    let mut sim_config = SimulationConfig::from_table(&config_table)?;
    sim_config.traffic.num_packets = argv.num_packets.unwrap_or(sim_config.traffic.num_packets);
    sim_config.traffic.pattern = argv.pattern.unwrap_or(sim_config.traffic.pattern);

    let mut sim = NetworkSim::new(sim_config)?;
    let summary = sim.run()?;
    sim.output_summaries(&mut io::stdout().lock())?;

    let summary_path = argv
        .summary_json
        .or_else(|| perf_run_dir().map(|dir| dir.join("summary.json")));
    if let Some(path) = summary_path {
        write_summary(&path, &summary)
            .with_context(|| format!("failed to write summary to {}", path.display()))?;
    }
    Ok(())
}

fn override_value(table: &mut Table, path: &[&str], value: Option<u32>) {
    let (Some(value), Some((key, sections))) = (value, path.split_last()) else {
        return;
    };
    let mut current = table;
    for section in sections {
        let entry = current
            .entry(section.to_string())
            .or_insert(toml::Value::Table(Table::new()));
        match entry.as_table_mut() {
            Some(next) => current = next,
            None => return,
        }
    }
    current.insert(key.to_string(), toml::Value::Integer(value as i64));
}
