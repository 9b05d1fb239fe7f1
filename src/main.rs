use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::io::Write;
use std::path::PathBuf;

use sitemap_scout::config::Config;
use sitemap_scout::export;
use sitemap_scout::filter::{self, FilterSpec};
use sitemap_scout::sitemap::{fetch_sitemap, HttpTransport, PageRecord};
use sitemap_scout::util::strip_control_chars;

/// Rows printed by the table view before summarising the rest.
const TABLE_PREVIEW_ROWS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Table,
    Csv,
    Json,
}

#[derive(Parser, Debug)]
#[command(
    name = "sitemap-scout",
    version,
    about = "Find a site's sitemap, list its URLs and filter them"
)]
struct Args {
    /// Sitemap URL, page URL or bare domain (e.g. example.com)
    url: String,

    /// Keep URLs containing every one of these space-separated keywords
    #[arg(long, value_name = "KEYWORDS")]
    include: Option<String>,

    /// Keep URLs matching this case-insensitive regex
    #[arg(long, value_name = "REGEX")]
    include_regex: Option<String>,

    /// Drop URLs containing any of these space-separated keywords
    #[arg(long, value_name = "KEYWORDS")]
    exclude: Option<String>,

    /// Drop URLs matching this case-insensitive regex
    #[arg(long, value_name = "REGEX")]
    exclude_regex: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = Format::Table)]
    format: Format,

    /// Write output to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Config file (defaults to ~/.config/sitemap-scout/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Allow requests to localhost and private networks
    #[arg(long)]
    allow_private_hosts: bool,
}

impl Args {
    /// Flags override the config's default filter field by field.
    fn filter_spec(&self, defaults: &FilterSpec) -> FilterSpec {
        let pick = |flag: &Option<String>, default: &str| {
            flag.clone().unwrap_or_else(|| default.to_owned())
        };
        FilterSpec {
            include_keywords: pick(&self.include, &defaults.include_keywords),
            include_pattern: pick(&self.include_regex, &defaults.include_pattern),
            exclude_keywords: pick(&self.exclude, &defaults.exclude_keywords),
            exclude_pattern: pick(&self.exclude_regex, &defaults.exclude_pattern),
        }
    }
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.config.as_deref() {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load config file: {}", path.display()))?,
        None => match Config::default_path() {
            Some(path) => Config::load(&path)
                .with_context(|| format!("Failed to load config file: {}", path.display()))?,
            None => Config::default(),
        },
    };
    if args.allow_private_hosts {
        config.allow_private_hosts = true;
    }
    Ok(config)
}

fn render_table<W: Write>(records: &[PageRecord], total: usize, mut out: W) -> std::io::Result<()> {
    for record in records.iter().take(TABLE_PREVIEW_ROWS) {
        write!(out, "{}", strip_control_chars(record.location()))?;
        if let Some(lastmod) = record.last_modified() {
            write!(out, "  [{}]", strip_control_chars(lastmod))?;
        }
        writeln!(out)?;
    }
    if records.len() > TABLE_PREVIEW_ROWS {
        writeln!(out, "...and {} more", records.len() - TABLE_PREVIEW_ROWS)?;
    }
    if records.len() == total {
        writeln!(out, "{} URLs", total)
    } else {
        writeln!(out, "{} of {} URLs", records.len(), total)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(&args)?;

    let spec = args.filter_spec(&config.filter);
    if let Err(invalid) = spec.validate() {
        // The filter ignores a broken pattern; say so before the run
        for e in invalid {
            eprintln!("Warning: {e} (pattern ignored)");
        }
        eprintln!("Note: look-ahead (?=, ?!) and backreferences (\\1) are not supported");
    }

    let client = HttpTransport::build_client(&config).context("Failed to build HTTP client")?;
    let transport = HttpTransport::new(client, &config);

    let progress = |status: &str, percent: u8| {
        eprintln!("[{percent:>3}%] {status}");
    };

    let records = fetch_sitemap(&transport, &args.url, Some(&progress))
        .await
        .context("Failed to fetch sitemap")?;
    let filtered = filter::apply(&records, &spec);

    let mut out: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?,
        )),
        None => Box::new(std::io::stdout().lock()),
    };

    match args.format {
        Format::Table => render_table(&filtered, records.len(), &mut out),
        Format::Csv => export::write_csv(&filtered, &mut out),
        Format::Json => export::write_json(&filtered, &mut out),
    }
    .context("Failed to write output")?;

    if let Some(path) = &args.output {
        eprintln!("Wrote {} URLs to {}", filtered.len(), path.display());
    }
    Ok(())
}
