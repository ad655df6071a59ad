//! Catmap CLI - concatenate source files into one bundle with a source map.

use std::fs;
use std::path::PathBuf;

use catmap::builder::{Bundler, DEFAULT_OUTPUT_DIR, DEFAULT_OUTPUT_FILE};
use catmap::concat::MappingDensity;
use catmap::errors::{exit_code, CatmapError};
use catmap::sourcemap::{ArtifactKind, OriginalPosition, SourceMap};
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{generate, Shell};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "catmap")]
#[command(about = "Concatenate source files into one bundle with a source map")]
#[command(version)]
struct Cli {
    /// Log debug details to stderr
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Concatenate matching files and write the artifact and its map
    Build {
        /// Project root to scan
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output directory, relative to the root
        #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
        output_dir: PathBuf,

        /// Artifact file name
        #[arg(long, default_value = DEFAULT_OUTPUT_FILE)]
        output_file: String,

        /// File name suffix of the inputs
        #[arg(long, default_value = ".js")]
        extension: String,

        /// Extra directories to skip (node_modules, bin and obj always are)
        #[arg(long, value_delimiter = ',')]
        exclude_dirs: Vec<PathBuf>,

        /// File name patterns to skip, `*` as wildcard
        #[arg(long, value_delimiter = ',')]
        exclude_files: Vec<String>,

        /// Mapping granularity
        #[arg(long, value_enum, default_value = "character")]
        density: DensityArg,

        /// Value of the map's sourceRoot (default: path back to the root)
        #[arg(long)]
        source_root: Option<String>,

        /// Trailer style (default: from the artifact extension)
        #[arg(long, value_enum)]
        kind: Option<KindArg>,

        /// Include hidden files and directories
        #[arg(long)]
        include_hidden: bool,

        /// Do not apply .gitignore rules
        #[arg(long)]
        no_gitignore: bool,

        /// Maximum directory depth
        #[arg(long)]
        max_depth: Option<usize>,

        /// List the files that would be bundled without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Resolve a generated position through a source map
    Lookup {
        /// Source map file
        map: PathBuf,

        /// Generated line (1-based)
        line: u32,

        /// Generated column (0-based)
        column: u32,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, ValueEnum)]
enum DensityArg {
    Character,
    Line,
}

impl From<DensityArg> for MappingDensity {
    fn from(arg: DensityArg) -> Self {
        match arg {
            DensityArg::Character => MappingDensity::Character,
            DensityArg::Line => MappingDensity::Line,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum KindArg {
    Script,
    Stylesheet,
}

impl From<KindArg> for ArtifactKind {
    fn from(arg: KindArg) -> Self {
        match arg {
            KindArg::Script => ArtifactKind::Script,
            KindArg::Stylesheet => ArtifactKind::Stylesheet,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    let json_output = json_flag(&cli.command);
    init_logging(cli.verbose, json_output);

    let result = match cli.command {
        Commands::Build {
            path,
            output_dir,
            output_file,
            extension,
            exclude_dirs,
            exclude_files,
            density,
            source_root,
            kind,
            include_hidden,
            no_gitignore,
            max_depth,
            dry_run,
            json,
        } => {
            let mut bundler = Bundler::new(path)
                .output_dir(output_dir)
                .output_file(output_file)
                .extension(extension)
                .exclude_dirs(exclude_dirs)
                .exclude_files(exclude_files)
                .density(density.into())
                .include_hidden(include_hidden)
                .respect_gitignore(!no_gitignore);
            if let Some(source_root) = source_root {
                bundler = bundler.source_root(source_root);
            }
            if let Some(kind) = kind {
                bundler = bundler.artifact_kind(kind.into());
            }
            if let Some(depth) = max_depth {
                bundler = bundler.max_depth(depth);
            }

            if dry_run {
                run_plan(&bundler, json)
            } else {
                run_build(bundler, json)
            }
        }
        Commands::Lookup {
            map,
            line,
            column,
            json,
        } => run_lookup(map, line, column, json),
        Commands::Completions { shell } => {
            generate(shell, &mut Cli::command(), "catmap", &mut std::io::stdout());
            Ok(())
        }
    };

    if let Err(e) = result {
        if json_output {
            #[derive(Serialize)]
            struct ErrorOutput {
                error: String,
            }

            let payload = ErrorOutput {
                error: e.to_string(),
            };

            let json = serde_json::to_string(&payload)
                .unwrap_or_else(|_| "{\"error\":\"serialization failed\"}".to_string());
            eprintln!("{json}");
        } else {
            eprintln!("error: {}", e);
        }
        std::process::exit(exit_code(&e));
    }
}

fn json_flag(cmd: &Commands) -> bool {
    match cmd {
        Commands::Build { json, .. } => *json,
        Commands::Lookup { json, .. } => *json,
        Commands::Completions { .. } => false,
    }
}

/// Logs go to stderr; JSON runs stay quiet unless asked so stderr holds only errors.
fn init_logging(verbose: bool, json: bool) {
    let default_filter = match (verbose, json) {
        (true, _) => "catmap=debug",
        (false, true) => "catmap=warn",
        (false, false) => "catmap=info",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

fn to_json<T: Serialize>(value: &T) -> Result<String, CatmapError> {
    serde_json::to_string_pretty(value)
        .map_err(|e| CatmapError::Io(std::io::Error::other(e.to_string())))
}

// --- Build command ---

fn run_plan(bundler: &Bundler, json: bool) -> Result<(), CatmapError> {
    let files = bundler.plan()?;

    if json {
        #[derive(Serialize)]
        struct Output {
            artifact: PathBuf,
            files: Vec<PathBuf>,
        }
        let output = Output {
            artifact: bundler.artifact_path(),
            files,
        };
        println!("{}", to_json(&output)?);
    } else {
        for file in &files {
            println!("{}", file.display());
        }
        println!("{} files -> {}", files.len(), bundler.artifact_path().display());
    }

    Ok(())
}

fn run_build(bundler: Bundler, json: bool) -> Result<(), CatmapError> {
    let report = bundler.build()?;

    if json {
        println!("{}", to_json(&report)?);
    } else {
        let lines: usize = report.files.iter().map(|f| f.lines).sum();
        println!(
            "Bundled {} files ({} lines) into {}",
            report.files.len(),
            lines,
            report.artifact_path.display()
        );
        println!(
            "Source map: {} ({} mappings, {} sources, {} density)",
            report.map_path.display(),
            report.mapping_count,
            report.source_count,
            report.density
        );
    }

    Ok(())
}

// --- Lookup command ---

fn run_lookup(map_path: PathBuf, line: u32, column: u32, json: bool) -> Result<(), CatmapError> {
    if !map_path.exists() {
        return Err(CatmapError::PathNotFound(map_path));
    }

    let contents = fs::read_to_string(&map_path).map_err(|source| CatmapError::Read {
        path: map_path.clone(),
        source,
    })?;
    let map = SourceMap::from_json(&contents)?;
    let original = map.lookup(line, column)?;

    if json {
        #[derive(Serialize)]
        struct Output {
            line: u32,
            column: u32,
            original: Option<OriginalPosition>,
        }
        let output = Output {
            line,
            column,
            original,
        };
        println!("{}", to_json(&output)?);
    } else {
        match original {
            Some(pos) => match pos.name {
                Some(name) => println!("{}:{}:{} ({})", pos.source, pos.line, pos.column, name),
                None => println!("{}:{}:{}", pos.source, pos.line, pos.column),
            },
            None => println!("{}:{} is not mapped", line, column),
        }
    }

    Ok(())
}
