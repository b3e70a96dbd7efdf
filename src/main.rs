use std::{
    fs::File,
    io::{self, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use rayon::prelude::*;
use scaffold_decomposition::{
    aromatic::aromatize,
    deconvolution::{Deconvolution, DeconvolutionOptions},
    loader::{self, SdfRecord},
    mcs::ApproximateParams,
    scaffold::{detect_molecule_scaffold, ScaffoldMode, ScaffoldParams},
};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log more; repeat for more detail.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Detect the common scaffold of a set of molecules.
    Scaffold {
        files: Vec<PathBuf>,

        #[arg(short, long, value_enum, default_value_t)]
        mode: ScaffoldMode,

        /// Iteration cap of each search; 0 keeps the defaults.
        #[arg(long, default_value_t = 0)]
        max_iterations: usize,

        #[arg(long)]
        randomize: bool,

        #[arg(long, default_value_t = ApproximateParams::default().seed)]
        seed: u64,
    },
    /// Decompose molecules into a scaffold and R-groups.
    Decompose {
        #[arg(short, long)]
        scaffold: PathBuf,

        files: Vec<PathBuf>,

        #[arg(long)]
        save_ap_bond_orders: bool,

        #[arg(long)]
        ignore_errors: bool,

        #[arg(long)]
        no_aromatize: bool,

        /// Where to write one CSV row per molecule; stdout if absent.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn load_all(files: &[PathBuf]) -> Result<Vec<SdfRecord>> {
    let parsed = files
        .par_iter()
        .map(|p| loader::parse(p).with_context(|| format!("failed to read {}", p.display())))
        .collect::<Result<Vec<_>>>()?;
    Ok(parsed.into_iter().flatten().collect())
}

fn run_scaffold(
    files: &[PathBuf],
    mode: ScaffoldMode,
    max_iterations: usize,
    randomize: bool,
    seed: u64,
) -> Result<()> {
    let mut molecules = load_all(files)?
        .into_iter()
        .map(|r| r.molecule)
        .collect::<Vec<_>>();
    molecules.par_iter_mut().for_each(|m| {
        aromatize(m);
    });
    info!(molecules = molecules.len(), ?mode, "detecting scaffold");

    let params = ScaffoldParams {
        max_iterations,
        approximate: ApproximateParams {
            randomize,
            seed,
            ..ApproximateParams::default()
        },
    };
    let scaffold =
        detect_molecule_scaffold(&molecules, mode, params).context("scaffold detection failed")?;
    print!("{}", loader::write_molfile(&scaffold, "scaffold"));
    Ok(())
}

fn run_decompose(
    scaffold: &Path,
    files: &[PathBuf],
    options: DeconvolutionOptions,
    output: Option<&Path>,
) -> Result<()> {
    let query = loader::parse(scaffold)
        .with_context(|| format!("failed to read scaffold {}", scaffold.display()))?
        .into_iter()
        .next()
        .map(|r| r.molecule)
        .context("scaffold file holds no molecule")?;

    let mut deco = Deconvolution::new(options);
    for (i, record) in load_all(files)?.into_iter().enumerate() {
        deco.add_molecule(record.molecule, record.properties, i);
    }
    deco.make_rgroups(&query).context("decomposition failed")?;

    let sink: Box<dyn Write> = match output {
        Some(path) => Box::new(
            File::create(path).with_context(|| format!("failed to create {}", path.display()))?,
        ),
        None => Box::new(io::stdout()),
    };
    let mut writer = csv::Writer::from_writer(sink);
    writer.write_record(["index", "formula", "scaffold", "rgroups", "name"])?;

    for item in 0..deco.items().len() {
        let index = deco.items()[item].index().to_string();
        let name = deco.items()[item]
            .properties()
            .get("name")
            .cloned()
            .unwrap_or_default();
        let formula = deco.items()[item].molecule().formula();
        let (scaffold, rgroups) = match deco.substituents(item) {
            Ok(groups) => {
                let scaffold = deco.scaffold(item)?.formula();
                let rgroups = groups
                    .iter()
                    .map(|(idx, group)| {
                        let parts = group
                            .fragments()
                            .iter()
                            .map(|f| f.formula())
                            .collect::<Vec<_>>()
                            .join("+");
                        format!("R{idx}={parts}")
                    })
                    .collect::<Vec<_>>()
                    .join(";");
                (scaffold, rgroups)
            }
            Err(e) if options.ignore_errors => {
                info!(index = %index, "{e}");
                (String::new(), String::new())
            }
            Err(e) => return Err(e.into()),
        };
        writer.write_record([index, formula, scaffold, rgroups, name])?;
    }
    writer.flush()?;

    // Keep stdout pure CSV when no output file is given.
    let full = loader::write_molfile(deco.decomposed_scaffold(), "full scaffold");
    if output.is_some() {
        print!("{full}");
    } else {
        eprint!("{full}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Scaffold {
            files,
            mode,
            max_iterations,
            randomize,
            seed,
        } => run_scaffold(&files, mode, max_iterations, randomize, seed),
        Command::Decompose {
            scaffold,
            files,
            save_ap_bond_orders,
            ignore_errors,
            no_aromatize,
            output,
        } => {
            let options = DeconvolutionOptions {
                save_ap_bond_orders,
                ignore_errors,
                aromatize: !no_aromatize,
                ..DeconvolutionOptions::default()
            };
            run_decompose(&scaffold, &files, options, output.as_deref())
        }
    }
}
