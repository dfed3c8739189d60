//! relframe: compile a DataFrame plan document into a relational algebra request
//!
//! Reads a JSON plan document describing named frames, compiles the root frame
//! and prints the request the query engine would receive.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use relframe_calcite::{fingerprint, to_json, CalciteBuilder};
use relframe_ir::PlanDocument;
use tracing::info;

mod config;
mod logging;

use config::Config;

#[derive(Parser)]
#[command(name = "relframe", version, about = "Compile DataFrame plans into relational algebra")]
struct Args {
    /// Plan document (JSON)
    plan: PathBuf,

    /// Configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Schema qualifying scanned tables
    #[arg(long)]
    database: Option<String>,

    /// Pretty-print the request
    #[arg(short, long)]
    pretty: bool,

    /// Print the logical tree before the request
    #[arg(long)]
    dump: bool,

    /// Print only the SHA-256 fingerprint of the request
    #[arg(long)]
    fingerprint: bool,

    /// Print the physical nodes instead of the request
    #[arg(long)]
    nodes: bool,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let mut config = if args.config.exists() {
        Config::load(&args.config)
            .with_context(|| format!("loading {}", args.config.display()))?
    } else {
        Config::from_env()
    };
    if let Some(database) = args.database {
        config.engine.database = database;
    }

    logging::init(&config.logging)?;

    let text = std::fs::read_to_string(&args.plan)
        .with_context(|| format!("reading {}", args.plan.display()))?;
    let document = PlanDocument::from_json(&text)?;
    let root = document.build()?;
    info!("Loaded plan {} ({} frames)", args.plan.display(), document.frames.len());

    if args.dump {
        print!("{}", root.dump());
    }

    let options = config.build_options();

    if args.nodes {
        let plan = CalciteBuilder::new(options).build(&root)?;
        for node in plan.iter() {
            println!("{:?}", node);
        }
        return Ok(());
    }

    let json = to_json(&root, &options)?;
    let request = serde_json::to_string(&json)?;

    if args.fingerprint {
        println!("{}", fingerprint(&request));
    } else if args.pretty {
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("{}", request);
    }

    Ok(())
}
