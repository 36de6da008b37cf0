//! Reslink - Reservoir network configuration link
//!
//! Encodes reservoir commands and uploads reservoir models to a device
//! through a UDP radio bridge or simulator.

use std::path::PathBuf;
use std::sync::Mutex;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use reslink::config::{self, Config};
use reslink::model::{self, ReservoirModel};
use reslink::protocol::{self, Command, Opcode};
use reslink::transport::{Packet, Port, UdpSink};
use reslink::{ReservoirLoader, UploadSequencer};

/// Reslink - Reservoir network configuration link
#[derive(Parser)]
#[command(name = "reslink")]
#[command(author = "Reslink Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Encode and upload reservoir networks to an embedded device", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a single command and print its link frame
    Encode {
        #[command(subcommand)]
        command: EncodeCommand,
    },

    /// Decode a hex payload into a command
    Decode {
        /// Payload bytes in hex (spaces and 0x prefixes allowed)
        hex: String,
    },

    /// Upload a reservoir model file
    Upload {
        /// Model file (TOML)
        #[arg(short, long)]
        model: PathBuf,

        /// Link endpoint, host or host:port (defaults to config)
        #[arg(short, long)]
        target: Option<String>,

        /// Print the command sequence instead of sending it
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate a sample reservoir model
    Model {
        /// Output path for the sample model
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show current configuration
    Config {
        /// Generate sample configuration
        #[arg(long)]
        generate: bool,

        /// Output path for generated config
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show protocol information
    Info,
}

#[derive(Subcommand)]
enum EncodeCommand {
    /// allocate_reservoir
    Alloc {
        reservoir: u8,
        size: u8,
        connectivity: u16,
    },

    /// set_input_weight
    Input {
        reservoir: u8,
        input: u8,
        neuron: u8,
        #[arg(allow_negative_numbers = true)]
        weight: f32,
    },

    /// append_internal_weight
    Internal {
        reservoir: u8,
        pair: u16,
        out_neuron: u8,
        in_neuron: u8,
        #[arg(allow_negative_numbers = true)]
        weight: f32,
    },

    /// set_output_weight
    Output {
        reservoir: u8,
        output: u8,
        neuron: u8,
        #[arg(allow_negative_numbers = true)]
        weight: f32,
    },

    /// compute_checksum
    Checksum,
}

impl From<EncodeCommand> for Command {
    fn from(cmd: EncodeCommand) -> Self {
        match cmd {
            EncodeCommand::Alloc {
                reservoir,
                size,
                connectivity,
            } => Command::AllocReservoir {
                reservoir,
                size,
                connectivity,
            },
            EncodeCommand::Input {
                reservoir,
                input,
                neuron,
                weight,
            } => Command::SetInputWeight {
                reservoir,
                input,
                neuron,
                weight,
            },
            EncodeCommand::Internal {
                reservoir,
                pair,
                out_neuron,
                in_neuron,
                weight,
            } => Command::AppendInternalWeight {
                reservoir,
                pair,
                out_neuron,
                in_neuron,
                weight,
            },
            EncodeCommand::Output {
                reservoir,
                output,
                neuron,
                weight,
            } => Command::SetOutputWeight {
                reservoir,
                output,
                neuron,
                weight,
            },
            EncodeCommand::Checksum => Command::ComputeChecksum,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = if let Some(config_path) = &cli.config {
        Config::load(config_path)?
    } else {
        Config::load_default().unwrap_or_default()
    };

    init_logging(&config, cli.verbose)?;

    match cli.command {
        Commands::Encode { command } => {
            let command = Command::from(command);
            let packet = Packet::reservoir(&command);
            println!("{}", command);
            println!("payload: {}", to_hex(packet.payload()));
            println!("frame:   {}", to_hex(&packet.to_frame()?));
        }
        Commands::Decode { hex } => {
            let bytes = parse_hex(&hex)?;
            let command = Command::decode(&bytes)?;
            println!("{}", command);
        }
        Commands::Upload {
            model,
            target,
            dry_run,
        } => {
            let model = ReservoirModel::load(&model)?;
            if dry_run {
                print_plan(&model)?;
            } else {
                run_upload(&config, &model, target).await?;
            }
        }
        Commands::Model { output } => {
            let sample = model::generate_sample_model()?;
            write_or_print(&sample, output)?;
        }
        Commands::Config { generate, output } => {
            if generate {
                let sample = config::generate_sample_config()?;
                write_or_print(&sample, output)?;
            } else {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
        Commands::Info => {
            print_protocol_info();
        }
    }

    Ok(())
}

/// Initialize logging, to stderr or to the configured log file
fn init_logging(config: &Config, verbose: bool) -> anyhow::Result<()> {
    let filter = if verbose || config.general.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let registry = tracing_subscriber::registry().with(filter);

    if let Some(path) = &config.general.log_file {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        registry
            .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
            .init();
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

/// Upload a model through a UDP sink
async fn run_upload(
    config: &Config,
    model: &ReservoirModel,
    target: Option<String>,
) -> anyhow::Result<()> {
    let bind = config.link.bind_addr()?;

    let target = target.unwrap_or_else(|| config.link.address.clone());
    let sink = UdpSink::connect_target(bind, &target, config.link.port).await?;

    tracing::info!("Uploading to {}", sink.target());

    let mut sequencer = UploadSequencer::new(ReservoirLoader::new(&sink));
    let sent = model.upload(&mut sequencer)?;

    tracing::info!(
        "Upload complete: {} commands, {} bytes",
        sent,
        sink.stats().bytes_sent()
    );
    println!(
        "Sent {} commands ({} bytes) to {}",
        sent,
        sink.stats().bytes_sent(),
        sink.target()
    );

    Ok(())
}

/// Print the command sequence of a model without sending it
fn print_plan(model: &ReservoirModel) -> anyhow::Result<()> {
    let commands = model.commands()?;

    for (i, command) in commands.iter().enumerate() {
        println!("{:>5}  {:<32}  {}", i, to_hex(&command.to_payload()), command);
    }
    println!("\n{} commands", commands.len());

    Ok(())
}

fn write_or_print(contents: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    if let Some(path) = output {
        std::fs::write(&path, contents)?;
        println!("Written to: {}", path.display());
    } else {
        println!("{}", contents);
    }
    Ok(())
}

/// Print protocol information
fn print_protocol_info() {
    println!("Reslink Protocol Information");
    println!("============================\n");

    let header = Packet::new(Port::RESERVOIR, Vec::new()).header();
    println!("Reservoir port: {}", Port::RESERVOIR);
    println!("Frame header:   {:#04x}", header);
    println!("Max payload:    {} bytes\n", protocol::MAX_PAYLOAD_SIZE);

    println!("{:<8} {:<24} {}", "Opcode", "Operation", "Payload bytes");
    for op in Opcode::ALL {
        println!("{:<8} {:<24} {}", op as u8, op.name(), op.payload_len());
    }
}

/// Format bytes as space-separated uppercase hex
fn to_hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse hex bytes, ignoring whitespace, commas and 0x prefixes
fn parse_hex(input: &str) -> anyhow::Result<Vec<u8>> {
    let digits: String = input
        .split(|c: char| c.is_whitespace() || c == ',')
        .map(|tok| tok.trim_start_matches("0x").trim_start_matches("0X"))
        .collect();

    if !digits.is_ascii() {
        anyhow::bail!("Invalid hex '{}'", input);
    }
    if digits.len() % 2 != 0 {
        anyhow::bail!("Odd number of hex digits in '{}'", input);
    }

    (0..digits.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&digits[i..i + 2], 16)
                .map_err(|e| anyhow::anyhow!("Invalid hex '{}': {}", &digits[i..i + 2], e))
        })
        .collect()
}
