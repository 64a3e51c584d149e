// CLI application
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use ppc64dbg_core::target::TargetSpec;
use std::path::{Path, PathBuf};

mod commands;

#[derive(Parser)]
#[command(name = "ppc64dbg")]
#[command(about = "ppc64 prologue emulation, unwind plans and entry-point inspection")]
#[command(version)]
struct Cli {
    /// JSON target description; overrides the ELF header (plans default to ppc64le ELF)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Print the function-entry and default unwind plans
    Plans {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// List function symbols with their global and local entry points
    Entry {
        /// Path to the ELF file
        #[arg(short, long)]
        elf: PathBuf,

        /// Only show this symbol
        #[arg(short, long)]
        symbol: Option<String>,
    },
    /// Emulate a function's prologue and print the derived unwind plan
    Prologue {
        /// Path to the ELF file
        #[arg(short, long)]
        elf: PathBuf,

        /// Function symbol to analyze
        #[arg(short, long)]
        symbol: String,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    // without --config, ELF commands use the target recorded in the image
    let config = cli.config.as_deref().map(load_target).transpose()?;

    match cli.command {
        Commands::Plans { json } => {
            commands::print_plans(&config.unwrap_or_default(), json)?;
        }
        Commands::Entry { elf, symbol } => {
            let pb = create_progress_bar("Scanning function symbols...")?;
            let image = commands::load_image(&elf, config)?;
            pb.finish_and_clear();
            commands::print_entries(&image, symbol.as_deref())?;
        }
        Commands::Prologue { elf, symbol, json } => {
            let pb = create_progress_bar("Emulating prologue...")?;
            let image = commands::load_image(&elf, config)?;
            pb.finish_and_clear();
            commands::print_prologue(&image, &symbol, json)?;
        }
    }

    Ok(())
}

fn load_target(path: &Path) -> Result<TargetSpec> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let target = TargetSpec::from_json(&text)
        .with_context(|| format!("Invalid target description in {}", path.display()))?;
    log::info!("Using target {:?} from {}", target.arch, path.display());
    Ok(target)
}

fn create_progress_bar(message: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(message.to_string());
    Ok(pb)
}
