//! vleaf CLI - inspect the data files of a leaf store
//!
//! Works from what is on disk only: the metadata file and the data file
//! headers and slots. No index is rebuilt.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use vleaf::store::{list_data_files, metadata_path};
use vleaf::{DataFile, StoreConfig, StoreMetadata};

#[derive(Parser)]
#[command(name = "vleaf")]
#[command(about = "Inspect virtual Merkle leaf storage on disk")]
#[command(version)]
struct Cli {
    /// Output format (json or text)
    #[arg(short, long, default_value = "json")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the metadata and data files of a store
    Inspect {
        /// Storage directory
        dir: PathBuf,
        /// Store name (file prefix)
        #[arg(short, long, default_value = "leaves")]
        name: String,
    },

    /// Print records of one data file in hex
    Dump {
        /// Path to a data file
        file: PathBuf,
        /// First slot to print
        #[arg(short, long, default_value = "0")]
        slot: u64,
        /// Number of slots to print
        #[arg(short, long, default_value = "1")]
        count: u64,
    },

    /// Write a store configuration with default values
    InitConfig {
        /// Where to write the JSON config
        path: PathBuf,
        /// Storage directory the config points at
        #[arg(short, long, default_value = "./leaves")]
        dir: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Inspect { dir, name } => {
            let metadata = StoreMetadata::load(&dir, &name)?;
            let mut files = Vec::new();
            for (_, path) in list_data_files(&dir, &name)? {
                match DataFile::open(&path) {
                    Ok(file) => files.push(serde_json::to_value(file.info())?),
                    Err(e) => files.push(serde_json::json!({
                        "path": path,
                        "error": e.to_string(),
                    })),
                }
            }
            output(
                &cli.format,
                &serde_json::json!({
                    "dir": dir,
                    "metadata_file": metadata_path(&dir, &name),
                    "metadata": metadata,
                    "files": files,
                }),
            )?;
        }

        Commands::Dump { file, slot, count } => {
            let data_file = DataFile::open(&file)?;
            let last = slot
                .saturating_add(count)
                .min(data_file.record_count());
            let mut buf = vec![0u8; data_file.slot_size()];
            let mut records = Vec::new();
            for current in slot..last {
                data_file.read(current, 0..data_file.slot_size(), &mut buf)?;
                records.push(serde_json::json!({
                    "slot": current,
                    "path": data_file.read_path(current)?,
                    "bytes": hex::encode(&buf),
                }));
            }
            output(
                &cli.format,
                &serde_json::json!({
                    "file": file,
                    "record_count": data_file.record_count(),
                    "slot_size": data_file.slot_size(),
                    "records": records,
                }),
            )?;
        }

        Commands::InitConfig { path, dir } => {
            let config = StoreConfig {
                storage_dir: dir,
                ..StoreConfig::default()
            };
            config.save_json(&path)?;
            output(
                &cli.format,
                &serde_json::json!({
                    "status": "ok",
                    "message": format!("Wrote config to {}", path.display())
                }),
            )?;
        }
    }

    Ok(())
}

fn output(format: &OutputFormat, value: &serde_json::Value) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(value)?),
        OutputFormat::Text => println!("{}", serde_json::to_string_pretty(value)?),
    }
    Ok(())
}
