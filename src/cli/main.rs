use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use genmeta::config::Config;
use genmeta::pipeline::{ProcessedImage, Session};
use genmeta::{ImageKind, Metadata};

#[derive(Parser, Debug)]
#[command(
    name = "genmeta",
    version,
    about = "Copy AI generation metadata (A1111 parameters, ComfyUI prompt/workflow, JPEG EXIF) from an original image into an edited one"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the generation metadata found in an image
    Show {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
    /// Extract generation metadata, optionally saving it for a later `inject`
    Extract {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Write the extracted metadata to this JSON file
        #[arg(long, value_name = "JSON")]
        save: Option<PathBuf>,

        /// Print the extracted metadata as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write previously saved metadata into an image
    Inject {
        #[arg(value_name = "TARGET")]
        target: PathBuf,

        /// Metadata saved by `extract --save`
        #[arg(long, value_name = "JSON")]
        from: PathBuf,

        /// Output file (default: target name with the configured suffix)
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
    },
    /// Extract from SOURCE and inject into TARGET in one go
    Transfer {
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        #[arg(value_name = "TARGET")]
        target: PathBuf,

        /// Output file (default: target name with the configured suffix)
        #[arg(short, long, value_name = "OUT")]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    let Some(command) = cli.command else {
        anyhow::bail!("No command specified. Use --help for usage.");
    };

    let config = Config::load(cli.config.as_deref())?;
    let session = Session::new(&config);

    match command {
        Command::Show { file } => {
            let (bytes, kind) = read_image(&file)?;
            let found = session.extract(&bytes, kind).await?;
            print_metadata(&file, found.as_ref());
        }
        Command::Extract { file, save, json } => {
            let (bytes, kind) = read_image(&file)?;
            let Some(metadata) = session.extract(&bytes, kind).await? else {
                anyhow::bail!("No generation metadata found in {}", file.display());
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&metadata)?);
            }
            if let Some(path) = save {
                let contents = serde_json::to_string_pretty(&metadata)?;
                std::fs::write(&path, contents)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                log::info!("Saved {} to {}", metadata.summary(), path.display());
            }
        }
        Command::Inject {
            target,
            from,
            output,
        } => {
            let contents = std::fs::read_to_string(&from)
                .with_context(|| format!("Failed to read {}", from.display()))?;
            let metadata: Metadata = serde_json::from_str(&contents)
                .with_context(|| format!("{} is not saved metadata", from.display()))?;
            session.restore(metadata).await;
            inject_into(&session, &config, &target, output).await?;
        }
        Command::Transfer {
            source,
            target,
            output,
        } => {
            let (bytes, kind) = read_image(&source)?;
            if session.extract(&bytes, kind).await?.is_none() {
                anyhow::bail!("No generation metadata found in {}", source.display());
            }
            inject_into(&session, &config, &target, output).await?;
        }
    }

    Ok(())
}

/// Read a file and declare its kind from the extension.
fn read_image(path: &Path) -> Result<(Vec<u8>, ImageKind)> {
    let kind = ImageKind::from_path(path)
        .with_context(|| format!("Unsupported file type: {}", path.display()))?;
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok((bytes, kind))
}

/// Inject the cached metadata into `target` and write the result.
async fn inject_into(
    session: &Session,
    config: &Config,
    target: &Path,
    output: Option<PathBuf>,
) -> Result<()> {
    let (bytes, kind) = read_image(target)?;
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let processed: ProcessedImage = session.inject(&bytes, kind, &name).await?;

    let out_path = output.unwrap_or_else(|| target.with_file_name(&processed.file_name));
    if out_path.exists() && !config.output.overwrite {
        anyhow::bail!(
            "{} already exists. Pass -o or set \"output.overwrite\": true in config.json",
            out_path.display()
        );
    }
    std::fs::write(&out_path, &processed.bytes)
        .with_context(|| format!("Failed to write {}", out_path.display()))?;
    log::info!("Wrote {}", out_path.display());
    Ok(())
}

// ANSI color codes
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Max width for the value column before wrapping.
const VAL_WIDTH: usize = 46;
/// Indent for continuation lines (tag column width + " : " = 25 chars + 2 leading spaces).
const INDENT: &str = "                           ";

/// Print extracted metadata as a table.
fn print_metadata(path: &Path, metadata: Option<&Metadata>) {
    println!();
    println!("{BOLD}File:{RESET} {}", path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));

    match metadata {
        Some(Metadata::Png { entries }) => {
            println!("  {BOLD}PNG Text{RESET}");
            println!("  {DIM}{}{RESET}", "─".repeat(70));
            for entry in entries {
                print_row(&entry.keyword, &entry.text);
            }
        }
        Some(Metadata::Jpeg { exif }) => {
            println!("  {BOLD}EXIF{RESET}");
            println!("  {DIM}{}{RESET}", "─".repeat(70));
            print_row("Tags", &exif.tag_count.to_string());
            print_row("Payload", &format!("{} bytes", exif.tiff.len()));
            if let Some(desc) = &exif.image_description {
                print_row("ImageDescription", desc);
            }
            if let Some(comment) = &exif.user_comment {
                print_row("UserComment", comment);
            }
        }
        None => println!("  {DIM}(no generation metadata found){RESET}"),
    }
    println!();
}

/// Print a single row in the display table.
fn print_row(tag: &str, val: &str) {
    let tag_col = format!("{:<22}", tag);
    let lines = wrap_text(val, VAL_WIDTH);
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            println!("  {tag_col} : {line}");
        } else {
            println!("  {INDENT}{line}");
        }
    }
}

/// Wrap text at word boundaries to fit within max_width.
///
/// Embedded newlines (A1111 puts the negative prompt on its own line) start a
/// new row.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in s.lines() {
        let mut current_line = String::new();
        for word in paragraph.split_whitespace() {
            if current_line.is_empty() {
                current_line = word.to_string();
            } else if current_line.len() + 1 + word.len() <= max_width {
                current_line.push(' ');
                current_line.push_str(word);
            } else {
                lines.push(current_line);
                current_line = word.to_string();
            }
        }
        if !current_line.is_empty() {
            lines.push(current_line);
        }
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}
