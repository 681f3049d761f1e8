//! docfill CLI - DOCX template filling tool

mod stage;

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

use docfill::docx::{
    content_root, paragraph_fragments, paragraph_text, shape_text_containers, DocxDocument,
    PartKind, DRAWING_BARRIERS,
};
use docfill::fill::{discover_tokens, DEFAULT_LOGO_WIDTH_MM};
use docfill::{
    detect_format_from_path, fill_directory, write_csv_report, FillOptions, ReplacementMap,
};

#[derive(Parser)]
#[command(name = "docfill")]
#[command(version)]
#[command(about = "Fill DOCX template sets with client data, logos, and current dates", long_about = None)]
struct Cli {
    /// Master template directory or .zip archive
    #[arg(value_name = "MASTER")]
    input: Option<PathBuf>,

    /// Output directory for the filled set
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// JSON object of replacement fields
    #[arg(short, long, value_name = "FILE")]
    fields: Option<PathBuf>,

    /// Logo image to place at logo slots
    #[arg(short, long, value_name = "FILE")]
    logo: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Stage a master template set and fill every document in it
    Fill(FillArgs),

    /// Show document structure and the placeholders it contains
    Info {
        /// Input DOCX file
        #[arg(value_name = "FILE")]
        input: PathBuf,
    },

    /// Show version information
    Version,
}

#[derive(Args)]
struct FillArgs {
    /// Master template directory or .zip archive
    #[arg(value_name = "MASTER")]
    master: PathBuf,

    /// Output directory for the filled set (replaced if present)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// JSON object of replacement fields
    #[arg(short, long, value_name = "FILE")]
    fields: Option<PathBuf>,

    /// Extra replacement pairs, e.g. --set "<company name>=Acme"
    #[arg(long, value_name = "KEY=VALUE")]
    set: Vec<String>,

    /// Logo image to place at logo slots
    #[arg(short, long, value_name = "FILE")]
    logo: Option<PathBuf>,

    /// Base logo width in millimetres
    #[arg(long, value_name = "MM", default_value_t = DEFAULT_LOGO_WIDTH_MM)]
    logo_width: f64,

    /// Comma-separated service selectors (template subfolder substrings)
    #[arg(short, long, value_name = "LIST")]
    services: Option<String>,

    /// Reference date for version-control tables (YYYY-MM-DD, default today)
    #[arg(long, value_name = "DATE")]
    date: Option<String>,

    /// Report what would change without writing anything
    #[arg(long)]
    dry_run: bool,

    /// CSV report path (default: <OUTPUT>/run_report.csv)
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Archive the filled set to <OUTPUT>.zip (skipped on dry runs)
    #[arg(long)]
    zip: bool,

    /// Print the per-document reports as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

fn main() {
    env_logger::init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Fill(args)) => cmd_fill(args),
        Some(Commands::Info { input }) => cmd_info(&input),
        Some(Commands::Version) => {
            cmd_version();
            Ok(())
        }
        None => {
            // Default behavior: fill if a master is provided
            if let Some(master) = cli.input {
                cmd_fill(FillArgs {
                    master,
                    output: cli.output,
                    fields: cli.fields,
                    set: Vec::new(),
                    logo: cli.logo,
                    logo_width: DEFAULT_LOGO_WIDTH_MM,
                    services: None,
                    date: None,
                    dry_run: false,
                    report: None,
                    zip: false,
                    json: false,
                })
            } else {
                println!("{}", "Usage: docfill <MASTER> [OUTPUT]".yellow());
                println!("       docfill --help for more information");
                Ok(())
            }
        }
    };

    if let Err(e) = result {
        eprintln!("{}: {}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn cmd_fill(args: FillArgs) -> Result<(), Box<dyn std::error::Error>> {
    let output_dir = args.output.clone().unwrap_or_else(|| {
        let stem = args.master.file_stem().unwrap_or_default().to_string_lossy();
        PathBuf::from(format!("{}_filled", stem))
    });

    let mut fields = ReplacementMap::new();
    if let Some(ref path) = args.fields {
        fields.merge(ReplacementMap::from_json_file(path)?);
    }
    for pair in &args.set {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| format!("invalid --set '{}', expected KEY=VALUE", pair))?;
        fields.insert(key, value);
    }
    if fields.is_empty() && args.logo.is_none() {
        return Err("nothing to fill: pass --fields, --set, or --logo".into());
    }

    let mut options = FillOptions {
        logo_width_mm: args.logo_width,
        dry_run: args.dry_run,
        ..FillOptions::default()
    };
    if let Some(ref logo) = args.logo {
        if logo.exists() {
            options.logo = Some(logo.clone());
        } else {
            println!(
                "{} logo not found, skipping: {}",
                "Warning:".yellow(),
                logo.display()
            );
        }
    }
    if let Some(ref date) = args.date {
        let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .map_err(|e| format!("invalid --date '{}': {}", date, e))?;
        options.reference_date = Some(parsed);
    }

    let services = args.services.as_deref().map(stage::parse_services);

    log::info!("master: {}", args.master.display());
    log::info!("output: {}", output_dir.display());
    log::info!(
        "logo: {} at {}mm, dry run: {}",
        options
            .logo
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "none".into()),
        options.logo_width_mm,
        options.dry_run
    );

    let pb = ProgressBar::new(3);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {msg}")
            .unwrap()
            .progress_chars("#>-"),
    );

    pb.set_message("Staging templates...");
    let master = stage::expand_master(&args.master)?;
    if output_dir.exists() {
        fs::remove_dir_all(&output_dir)?;
    }
    let staged = stage::stage_selected(master.path(), &output_dir, services.as_deref())?;
    if staged == 0 {
        pb.finish_and_clear();
        return Err("no templates matched the services selection".into());
    }
    pb.inc(1);

    pb.set_message("Filling documents...");
    let reports = fill_directory(&output_dir, &fields, &options)?;
    pb.inc(1);

    pb.set_message("Writing report...");
    let report_path = args.report.clone().unwrap_or_else(|| {
        output_dir.join(if args.dry_run {
            "dry_run_report.csv"
        } else {
            "run_report.csv"
        })
    });
    write_csv_report(&report_path, &reports)?;
    let archive = if args.zip && !args.dry_run {
        let dest = output_dir.with_extension("zip");
        stage::zip_output(&output_dir, &dest)?;
        Some(dest)
    } else {
        None
    };
    pb.inc(1);
    pb.finish_with_message("Done!");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    let changed = reports.iter().filter(|r| r.changed).count();
    let logos: u32 = reports
        .iter()
        .map(|r| r.logos_inserted_body + r.logos_inserted_headers)
        .sum();
    let pruned: u32 = reports.iter().map(|r| r.xml_paras_pruned).sum();
    let unresolved = reports
        .iter()
        .filter(|r| !r.placeholders_missing.is_empty())
        .count();

    println!("\n{}", "Fill summary:".green().bold());
    println!(
        "  {} {} documents ({} changed)",
        "├─".dimmed(),
        reports.len(),
        changed
    );
    println!("  {} {} logos placed", "├─".dimmed(), logos);
    println!("  {} {} paragraphs pruned", "├─".dimmed(), pruned);
    if unresolved > 0 {
        println!(
            "  {} {} documents with unresolved tokens",
            "├─".dimmed(),
            unresolved.to_string().yellow()
        );
    }
    if let Some(ref dest) = archive {
        println!("  {} report: {}", "├─".dimmed(), report_path.display());
        println!("  {} archive: {}", "└─".dimmed(), dest.display());
    } else {
        println!("  {} report: {}", "└─".dimmed(), report_path.display());
    }

    if args.dry_run {
        println!("\n{}", "Dry run: no documents were modified".yellow());
    }

    Ok(())
}

fn cmd_info(input: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let format = detect_format_from_path(input)?;
    let document = DocxDocument::open(input)?;

    println!("{}", "Document Information".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {}", "File".bold(), input.display());
    println!("{}: {}", "Format".bold(), format);

    let body = document.body();
    let root = content_root(body);
    let paragraphs = body.descendants_named(root, "w:p");
    let tables = body.descendants_named(root, "w:tbl").len();
    let headers = document
        .header_footers()
        .iter()
        .filter(|p| p.kind == PartKind::Header)
        .count();
    let footers = document
        .header_footers()
        .iter()
        .filter(|p| p.kind == PartKind::Footer)
        .count();
    let images: usize = DRAWING_BARRIERS
        .iter()
        .map(|name| body.descendants_named(root, name).len())
        .sum();

    println!("{}: {}", "Paragraphs".bold(), paragraphs.len());
    println!("{}: {}", "Tables".bold(), tables);
    println!("{}: {}", "Headers".bold(), headers);
    println!("{}: {}", "Footers".bold(), footers);
    println!("{}: {}", "Images".bold(), images);

    // Token discovery runs over every text surface: body paragraphs,
    // drawing text, and header/footer paragraphs.
    let mut tokens: BTreeSet<String> = BTreeSet::new();
    let mut words = 0usize;
    let mut chars = 0usize;
    for &paragraph in &paragraphs {
        let text = paragraph_text(body, paragraph);
        words += text.split_whitespace().count();
        chars += text.len();
        tokens.extend(discover_tokens(&text));
    }
    for (container, fragment_tag) in shape_text_containers(body) {
        if fragment_tag == "a:t" {
            let text: String = paragraph_fragments(body, container, fragment_tag)
                .iter()
                .map(|&f| body.element_text(f))
                .collect();
            tokens.extend(discover_tokens(&text));
        }
    }
    for part in document.header_footers() {
        let tree = &part.tree;
        for paragraph in tree.descendants_named(tree.root(), "w:p") {
            tokens.extend(discover_tokens(&paragraph_text(tree, paragraph)));
        }
    }

    println!();
    println!("{}", "Content Statistics".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    println!("{}: {}", "Words".bold(), words);
    println!("{}: {}", "Characters".bold(), chars);

    println!();
    println!("{}", "Placeholders".cyan().bold());
    println!("{}", "─".repeat(40).dimmed());
    if tokens.is_empty() {
        println!("{}", "none found".dimmed());
    } else {
        for token in &tokens {
            println!("  {}", token);
        }
    }

    Ok(())
}

fn cmd_version() {
    println!("{} {}", "docfill".cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("DOCX template filling tool");
    println!();
    println!("License: MIT");
}
