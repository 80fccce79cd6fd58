//! Thin command-line shell over the elaborator and the mapping enumerator.

use std::error::Error;
use std::fs::File;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::info;
use serde::de::DeserializeOwned;

use mlb_fabric::datapath::build_datapath;
use mlb_fabric::mapping::{find_mappings, MappingOptions, Workload};
use mlb_fabric::spec::projection::ProjectionSpec;
use mlb_fabric::spec::HwbSpec;

#[derive(Parser)]
#[command(name = "mlb_fabric")]
#[command(about = "Generate and map datapaths for ML-block accelerator arrays")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Elaborate the datapath for a set of projections and write the
    /// module graph as JSON.
    GenerateAccelerator {
        #[arg(long)]
        mlb: PathBuf,
        #[arg(long)]
        weight_buffer: PathBuf,
        #[arg(long)]
        input_buffer: PathBuf,
        #[arg(long)]
        output_buffer: PathBuf,
        #[arg(long)]
        projections: PathBuf,
        #[arg(long, default_value = "accelerator.json")]
        out: PathBuf,
    },

    /// Elaborate the datapath including the ping-pong addressing ports
    /// driven by an external tile sequencer.
    GenerateStatemachine {
        #[arg(long)]
        mlb: PathBuf,
        #[arg(long)]
        weight_buffer: PathBuf,
        #[arg(long)]
        input_buffer: PathBuf,
        #[arg(long)]
        output_buffer: PathBuf,
        #[arg(long)]
        projections: PathBuf,
        #[arg(long, default_value = "accelerator.json")]
        out: PathBuf,
    },

    /// Enumerate mappings of a workload onto an ML block and report the
    /// best throughput figure.
    SimulateAccelerator {
        #[arg(long)]
        mlb: PathBuf,
        #[arg(long)]
        workload: PathBuf,
        /// Number of ML blocks available.
        #[arg(long, default_value_t = 288)]
        mlbs: u64,
        /// Admit access-pattern violations with a score penalty.
        #[arg(long)]
        soft: bool,
    },
}

fn load_yaml<T: DeserializeOwned>(path: &PathBuf) -> Result<T, Box<dyn Error>> {
    let file = File::open(path).map_err(|e| format!("{}: {}", path.display(), e))?;
    Ok(serde_yaml::from_reader(file)?)
}

fn generate(
    mlb: &PathBuf,
    wb: &PathBuf,
    ib: &PathBuf,
    ob: &PathBuf,
    projections: &PathBuf,
    out: &PathBuf,
) -> Result<(), Box<dyn Error>> {
    let mlb_spec: HwbSpec = load_yaml(mlb)?;
    let wb_spec: HwbSpec = load_yaml(wb)?;
    let ib_spec: HwbSpec = load_yaml(ib)?;
    let ob_spec: HwbSpec = load_yaml(ob)?;
    let projs: Vec<ProjectionSpec> = load_yaml(projections)?;

    let graph = build_datapath(&mlb_spec, &wb_spec, &ib_spec, &ob_spec, &projs)?;
    serde_json::to_writer_pretty(File::create(out)?, &graph)?;
    info!(
        "wrote {} ({} instances, {} edges)",
        out.display(),
        graph.instances.len(),
        graph.edges.len()
    );
    Ok(())
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    match cli.command {
        Commands::GenerateAccelerator {
            mlb,
            weight_buffer,
            input_buffer,
            output_buffer,
            projections,
            out,
        }
        | Commands::GenerateStatemachine {
            mlb,
            weight_buffer,
            input_buffer,
            output_buffer,
            projections,
            out,
        } => generate(
            &mlb,
            &weight_buffer,
            &input_buffer,
            &output_buffer,
            &projections,
            &out,
        ),
        Commands::SimulateAccelerator {
            mlb,
            workload,
            mlbs,
            soft,
        } => {
            let mlb_spec: HwbSpec = load_yaml(&mlb)?;
            let w: Workload = load_yaml(&workload)?;
            let (mappings, throughput) =
                find_mappings(&mlb_spec, &w, mlbs, soft, &MappingOptions::new())?;
            println!("{} admissible mappings", mappings.len());
            println!("best throughput figure: {}", throughput);
            Ok(())
        }
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}
