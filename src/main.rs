use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use sigcarve::{
    CaseInventory, InventorySink, RegistryConfig, ScanDriver, ScanObserver, ScanOptions,
    ScanProgress, SignatureRegistry, SourceMap, DEFAULT_BLOCK_SIZE,
};

#[derive(Parser)]
#[command(
    name = "sigcarve",
    version,
    about = "Signature-based file carver for raw disk images and block devices"
)]
struct Cli {
    /// Disk image or block device to scan (opened strictly read-only)
    source: PathBuf,

    /// Directory for reports and recovered files
    #[arg(long, default_value = "reports")]
    report_dir: PathBuf,

    /// Scan block size in bytes
    #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
    block_size: u64,

    /// Log filter (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Scan profile: fast, balanced, or deep
    #[arg(long, default_value = "balanced")]
    profile: String,

    /// Signature registry JSON (built-in table when omitted)
    #[arg(long)]
    signatures: Option<PathBuf>,

    /// Case identifier for the chain of custody (generated when omitted)
    #[arg(long)]
    case_id: Option<String>,

    /// Investigator name recorded in the reports
    #[arg(long, default_value = "unassigned")]
    investigator: String,

    /// Skip writing recovered blobs (reports only)
    #[arg(long)]
    no_recover: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .parse_filters(&cli.log_level)
        .init();

    let config = match &cli.signatures {
        Some(path) => RegistryConfig::load(path)?,
        None       => RegistryConfig::builtin(),
    };
    let (registry, profile) = SignatureRegistry::from_config(&config, &cli.profile)?;

    let source = SourceMap::open(&cli.source, cli.block_size)?;
    let mut inventory = CaseInventory::new(
        cli.case_id.clone(),
        &cli.investigator,
        &cli.report_dir,
        !cli.no_recover,
    )?;
    inventory.set_source(source.metadata());

    println!("── Forensic scan ────────────────────────────────────────");
    println!("  Source:    {}", cli.source.display());
    println!("  Size:      {} B ({:.2} MiB)", source.size(), source.size() as f64 / 1048576.0);
    println!("  Profile:   {}", cli.profile);
    println!("  Case ID:   {}", inventory.case_id());
    println!("  Signatures ({}):", registry.len());
    for signature in registry.signatures() {
        println!(
            "    {:<6} {:<18} cap {} B",
            signature.name,
            hex::encode(&signature.header),
            signature.max_size,
        );
    }
    println!();

    let mut observer = ProgressObserver::new(source.size());
    let driver = ScanDriver::new(&registry, ScanOptions {
        block_size: cli.block_size,
        profile,
    });
    let metrics = driver.run(&source, &mut inventory, &mut observer)?;
    let type_counts = observer.finish();

    inventory.flush()?;

    println!();
    println!("── Results ──────────────────────────────────────────────");
    println!("  Blocks scanned:      {}", metrics.blocks_scanned);
    println!("  Bytes scanned:       {}", metrics.bytes_scanned);
    println!("  Raw matches:         {}", metrics.raw_matches);
    println!("  Valid detections:    {}", metrics.valid_matches);
    println!("  Duplicates skipped:  {}", metrics.duplicate_matches);
    println!("  Low-entropy rejects: {}", metrics.rejected_entropy);
    println!("  Structural rejects:  {}", metrics.rejected_structure);
    println!("  Elapsed:             {:.2} s", metrics.elapsed_seconds);
    if !type_counts.is_empty() {
        println!();
        println!("  {:<8} {:>6}", "Type", "Found");
        for (type_name, count) in &type_counts {
            println!("  {:<8} {:>6}", type_name, count);
        }
    }
    println!();
    println!("Reports written to {}", cli.report_dir.display());

    Ok(())
}

// ── Terminal observer ────────────────────────────────────────────────────────

/// Progress bar plus per-type tallies, updated from the scan thread.
struct ProgressObserver {
    bar:    ProgressBar,
    counts: BTreeMap<String, u64>,
}

impl ProgressObserver {
    fn new(total_bytes: u64) -> Self {
        let bar = ProgressBar::new(total_bytes);
        bar.set_style(
            ProgressStyle::with_template(
                "  {bar:38.cyan/blue} {bytes}/{total_bytes} ({eta}) {msg}",
            )
            .expect("static progress template")
            .progress_chars("█▉─"),
        );
        Self { bar, counts: BTreeMap::new() }
    }

    fn finish(self) -> BTreeMap<String, u64> {
        self.bar.finish_and_clear();
        self.counts
    }
}

impl ScanObserver for ProgressObserver {
    fn on_block(&mut self, progress: &ScanProgress) {
        self.bar.set_position(progress.bytes_scanned);
        self.bar.set_message(format!(
            "{} found, {:.1} MiB/s",
            progress.detections, progress.average_mbps,
        ));
    }

    fn on_detection(&mut self, type_name: &str) {
        *self.counts.entry(type_name.to_owned()).or_insert(0) += 1;
    }
}
