use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use comfy_table::{presets::UTF8_FULL, Table};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wafermap_core::outputs::{write_dataset, ExportFormat};
use wafermap_core::wafer::{compare_conditions, die_grid, WaferLayout};
use wafermap_core::{process_lot, scan_lot, AppConfig, Condition, Dataset, LotDatasets};
use wafermap_parser::SignalDirection;

#[derive(Parser, Debug)]
#[command(author, version, about = "Wafer die test result extraction", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the baseline and elevated datasets for a lot
    Process(ProcessArgs),
    /// List the latest result files for a lot without extracting them
    Scan(LotArgs),
    /// Print one die's normalized element grid as CSV
    Grid(GridArgs),
}

#[derive(Args, Debug)]
struct LotArgs {
    /// Lot code prefix, e.g. R0EQLE
    #[arg(long)]
    code: String,
    /// Configuration file (JSON or TOML)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Override the configured input directory
    #[arg(long)]
    input: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ProcessArgs {
    #[command(flatten)]
    lot: LotArgs,
    /// Write every table to this directory
    #[arg(long)]
    export: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = FormatArg::Parquet)]
    format: FormatArg,
}

#[derive(Args, Debug)]
struct GridArgs {
    #[command(flatten)]
    lot: LotArgs,
    /// Die serial, RRR_CCC
    #[arg(long)]
    serial: String,
    #[arg(long, value_enum, default_value_t = ConditionArg::Elevated)]
    condition: ConditionArg,
    #[arg(long, value_enum, default_value_t = DirectionArg::Tx)]
    direction: DirectionArg,
    /// Table key; defaults to the last table built
    #[arg(long)]
    test: Option<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Parquet,
    Csv,
}

impl From<FormatArg> for ExportFormat {
    fn from(value: FormatArg) -> Self {
        match value {
            FormatArg::Parquet => ExportFormat::Parquet,
            FormatArg::Csv => ExportFormat::Csv,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ConditionArg {
    Baseline,
    Elevated,
}

impl From<ConditionArg> for Condition {
    fn from(value: ConditionArg) -> Self {
        match value {
            ConditionArg::Baseline => Condition::Baseline,
            ConditionArg::Elevated => Condition::Elevated,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DirectionArg {
    Tx,
    Rx,
}

impl From<DirectionArg> for SignalDirection {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Tx => SignalDirection::Tx,
            DirectionArg::Rx => SignalDirection::Rx,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json);

    if let Err(err) = run(cli.command) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn run(command: Command) -> Result<()> {
    dotenvy::dotenv().ok();

    match command {
        Command::Process(args) => handle_process(args),
        Command::Scan(args) => handle_scan(args),
        Command::Grid(args) => handle_grid(args),
    }
}

fn load_config(args: &LotArgs) -> Result<AppConfig> {
    let path = AppConfig::resolve_path(args.config.clone());
    let mut config = AppConfig::load(&path)
        .with_context(|| format!("failed to load configuration from {}", path.display()))?;
    if let Some(input) = &args.input {
        config.input_directory = input.clone();
    }
    info!(
        config = %path.display(),
        input = %config.input_directory.display(),
        devices = config.asic_list.len(),
        "configuration loaded"
    );
    Ok(config)
}

fn handle_process(args: ProcessArgs) -> Result<()> {
    let config = load_config(&args.lot)?;
    let datasets = process_lot(&config, &args.lot.code)
        .with_context(|| format!("failed to process lot {}", args.lot.code.trim()))?;

    print_comparison(&datasets)?;

    if let Some(dir) = &args.export {
        let format = ExportFormat::from(args.format);
        let mut written = Vec::new();
        for (label, dataset) in [
            ("baseline_tx", &datasets.baseline_tx),
            ("elevated_tx", &datasets.elevated_tx),
            ("elevated_rx", &datasets.elevated_rx),
        ] {
            let prefix = format!("{}_{label}", datasets.code);
            written.extend(
                write_dataset(dataset, dir, &prefix, format)
                    .with_context(|| format!("failed to export {label}"))?,
            );
        }
        println!("Exported {} tables to {}", written.len(), dir.display());
    }

    Ok(())
}

fn print_comparison(datasets: &LotDatasets) -> Result<()> {
    let layout = WaferLayout::default();
    for (key, baseline) in datasets.baseline_tx.iter() {
        let Some(elevated) = datasets.elevated_tx.get(key) else {
            continue;
        };
        let rows = compare_conditions(baseline, elevated)?;

        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Serial", "Wafer cell", "Ambient mean", "Hot mean", "Hot / Ambient"]);
        for row in &rows {
            let cell = row
                .location
                .and_then(|die| layout.cell(die))
                .map(|(r, c)| format!("{r},{c}"))
                .unwrap_or_else(|| "-".to_string());
            table.add_row(vec![
                row.serial.clone(),
                cell,
                format_value(row.baseline_mean),
                format_value(row.elevated_mean),
                format_value(row.ratio()),
            ]);
        }

        println!("{key}");
        println!("{table}");
    }
    Ok(())
}

fn format_value(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.4}"))
}

fn handle_scan(args: LotArgs) -> Result<()> {
    let config = load_config(&args)?;
    let scan = scan_lot(&config, &args.code)?;

    println!(
        "{} files found for {} (lots: {})",
        scan.discovered.len(),
        scan.code,
        scan.lot_codes.join(", ")
    );
    for condition in [Condition::Baseline, Condition::Elevated] {
        let files = scan.selection.files(condition);
        println!("\n{} ({} latest runs)", condition.thermal_label(), files.len());
        for file in files {
            println!(
                "  {:<10} {:<20} {}",
                file.device_code.to_string(),
                file.timestamp.to_string(),
                file.file_name()
            );
        }
    }
    if !scan.selection.skipped.is_empty() {
        println!("\nSkipped");
        for skipped in &scan.selection.skipped {
            println!("  {}: {}", skipped.path.display(), skipped.reason);
        }
    }
    Ok(())
}

fn handle_grid(args: GridArgs) -> Result<()> {
    let config = load_config(&args.lot)?;
    let datasets = process_lot(&config, &args.lot.code)?;
    let condition = Condition::from(args.condition);
    let direction = SignalDirection::from(args.direction);
    let dataset = pick_dataset(&datasets, condition, direction)?;

    let (key, table) = match &args.test {
        Some(key) => (
            key.as_str(),
            dataset
                .get(key)
                .ok_or_else(|| anyhow!("no table named '{key}'"))?,
        ),
        None => dataset
            .last()
            .ok_or_else(|| anyhow!("no {condition} {direction} tables were built"))?,
    };
    let values = table
        .element_vector(&args.serial)?
        .ok_or_else(|| anyhow!("serial {} not found in {key}", args.serial))?;
    let grid = die_grid(&values, config.die_grid)
        .with_context(|| format!("cannot build grid for {} in {key}", args.serial))?;

    for row in grid {
        let line: Vec<String> = row.iter().map(|v| format!("{v:.6}")).collect();
        println!("{}", line.join(","));
    }
    Ok(())
}

fn pick_dataset(
    datasets: &LotDatasets,
    condition: Condition,
    direction: SignalDirection,
) -> Result<&Dataset> {
    match (condition, direction) {
        (Condition::Baseline, SignalDirection::Tx) => Ok(&datasets.baseline_tx),
        (Condition::Elevated, SignalDirection::Tx) => Ok(&datasets.elevated_tx),
        (Condition::Elevated, SignalDirection::Rx) => Ok(&datasets.elevated_rx),
        (Condition::Baseline, SignalDirection::Rx) => {
            bail!("baseline Rx results are not extracted")
        }
    }
}
