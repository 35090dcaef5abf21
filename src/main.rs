#![allow(clippy::collapsible_if)]

use std::{fs::OpenOptions, path::PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::{Builder, Target};
use log::LevelFilter;
use lopper::{fragment::FragmentDocument, staging::StagedOutput, Driver, ExecOptions, Tree};

/// Apply lop fragments to a device tree
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Base tree, as a JSON tree document
    tree: PathBuf,

    /// Output file; `.json` writes a tree document and `.dts` writes dts source
    output: Option<PathBuf>,

    /// Lop fragment file, or a directory of `*.json` fragments. May be repeated.
    #[arg(short, long = "input", value_name = "LOP")]
    inputs: Vec<PathBuf>,

    /// Domain node (path or `&label`) whose compatible assist runs before any fragment
    #[arg(short, long, value_name = "NODE")]
    target: Option<String>,

    /// Output file, as an alternative to the positional argument
    #[arg(short = 'o', long = "output", value_name = "FILE", conflicts_with = "output")]
    output_flag: Option<PathBuf>,

    /// Overwrite an existing output file
    #[arg(short, long)]
    force: bool,

    /// Raise the log level; repeat for more
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Fail when any select or modify matches nothing
    #[arg(long)]
    strict: bool,

    /// Log failing code callbacks and keep going
    #[arg(long)]
    continue_on_error: bool,

    /// Run assists as they are bound, and any pending ones at the end
    #[arg(long)]
    auto_assist: bool,

    /// Print a diff of the output instead of writing it
    #[arg(long)]
    dry_run: bool,

    /// Print the input tree as dts and exit
    #[arg(long)]
    dump: bool,

    /// Print the JSON schema for lop fragments and exit
    #[arg(long)]
    print_schema: bool,
}

fn init_logging(verbose: u8) -> Result<()> {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    let mut builder = Builder::from_default_env();
    builder.filter_level(level);

    if let Ok(log_location) = std::env::var("LOG_LOCATION") {
        let path = PathBuf::from(&*shellexpand::tilde(&log_location));
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        builder.target(Target::Pipe(Box::new(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("opening log file {}", path.display()))?,
        )));
    }

    builder.init();
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;

    if cli.print_schema {
        let schema = schemars::schema_for!(FragmentDocument);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let json = std::fs::read_to_string(&cli.tree)
        .with_context(|| format!("reading {}", cli.tree.display()))?;
    let tree = Tree::from_json(&json).with_context(|| format!("parsing {}", cli.tree.display()))?;

    if cli.dump {
        print!("{}", tree.to_dts());
        return Ok(());
    }

    let Some(output) = cli.output_flag.or(cli.output) else {
        bail!("no output file given");
    };

    let options = ExecOptions::default()
        .with_strict(cli.strict)
        .with_continue_on_error(cli.continue_on_error)
        .with_auto_assist(cli.auto_assist);
    let mut driver = Driver::new(tree.clone()).with_options(options);
    let loaded = driver.load_paths(&cli.inputs)?;
    log::info!("loaded {loaded} fragment(s)");

    if let Some(target) = &cli.target {
        driver.apply_target(target)?;
    }

    for report in driver.run()? {
        log::info!("{}", report.to_string().trim_end());
    }

    let staged = StagedOutput::new(output, &tree, driver.tree())?;
    if cli.dry_run {
        if staged.is_unchanged() {
            println!("no changes");
        } else {
            println!("{}", staged.diff());
        }
        return Ok(());
    }

    let written = staged.commit(cli.force)?;
    println!("wrote {}", written.display());
    Ok(())
}
