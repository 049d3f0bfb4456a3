use anyhow::{bail, Context, Result};
use std::env;
use std::io::Write;
use std::path::{Path, PathBuf};

use donor_linkage::{
    find_fragmented_ids, load_dataset, read_relationship_ids, write_resolution, GivingTotals,
    PlatformRegistry, ResolutionEngine, ResolutionOptions, DEFAULT_ID_DELIMITER, VERSION,
};

fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("resolve") => run_resolve(&args[2..]),
        Some("init-config") => run_init_config(&args[2..]),
        Some("audit") => run_audit(&args[2..]),
        Some("--version") => {
            println!("donor-linkage {}", VERSION);
            Ok(())
        }
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("🔗 Donor Linkage {} - Cross-platform identity resolution", VERSION);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!();
    println!("Usage:");
    println!("  donor-linkage resolve <config.json|--default> <out.csv> PLATFORM=export.csv... [--no-dedup]");
    println!("  donor-linkage init-config <config.json>");
    println!("  donor-linkage audit <compiled.csv> [column]");
    println!();
    println!("Set RUST_LOG=info for phase logs.");
}

// ============================================================================
// RESOLVE
// ============================================================================

fn run_resolve(args: &[String]) -> Result<()> {
    if args.len() < 3 {
        print_usage();
        bail!("resolve needs a config, an output path and at least one PLATFORM=file.csv");
    }

    println!("🔗 Resolving donor identities");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // 1. Platform configuration
    let registry = if args[0] == "--default" {
        PlatformRegistry::defaults()
    } else {
        PlatformRegistry::from_file(&args[0])?
    };
    registry.validate()?;
    println!("✓ {} platforms configured", registry.len());

    let output = PathBuf::from(&args[1]);
    let mut options = ResolutionOptions::default();

    // 2. Load exports
    println!("\n📂 Loading exports...");
    let mut datasets = Vec::new();
    for arg in &args[2..] {
        if arg == "--no-dedup" {
            options.detect_duplicates = false;
            continue;
        }

        let (platform, file) = arg
            .split_once('=')
            .with_context(|| format!("Expected PLATFORM=file.csv, got '{}'", arg))?;
        let dataset = load_dataset(Path::new(file), platform)?;
        println!("✓ {}: {} rows from {}", platform, dataset.len(), file);
        datasets.push(dataset);
    }

    // 3. Resolve on a worker thread, streaming progress
    println!("\n⚙️  Running resolution...");
    let handle = ResolutionEngine::with_options(registry, options).spawn(datasets);
    for percent in handle.progress().iter() {
        print!("\r   {:>3}%", percent);
        std::io::stdout().flush().ok();
    }
    println!();
    let resolution = handle.join()?;

    // 4. Write compiled file
    let written = write_resolution(&output, &resolution)?;
    println!("✓ Wrote {} rows to {}", written, output.display());

    // 5. Summary
    let report = &resolution.report;
    let totals = GivingTotals::from_resolution(&resolution);
    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for platform in &report.platforms {
        let marker = if platform.is_base { " (base)" } else { "" };
        println!("   {}{}: {} rows", platform.platform, marker, platform.rows);
    }
    println!("✓ Donors: {}", report.donors);
    println!("✓ Merged identities: {}", report.merged_identities);
    println!("✓ Fallback ids: {}", report.id_sources.fallback);
    if report.duplicate_detection {
        println!("✓ Base duplicates: {}", report.duplicates);
    }
    if report.quality.has_issues() {
        println!("⚠️  Data quality: {}", report.quality.summary());
    }
    println!("💰 {}", totals.summary());
    println!("✅ Run {} complete", report.run_id);

    Ok(())
}

// ============================================================================
// INIT CONFIG
// ============================================================================

fn run_init_config(args: &[String]) -> Result<()> {
    let Some(path) = args.first() else {
        print_usage();
        bail!("init-config needs an output path");
    };

    let registry = PlatformRegistry::defaults();
    registry.save(path)?;

    println!("✓ Wrote {} default platforms to {}", registry.len(), path);
    for platform in registry.platforms() {
        let marker = if platform.is_base { " (base)" } else { "" };
        println!("   {}{}", platform.name, marker);
    }

    Ok(())
}

// ============================================================================
// AUDIT
// ============================================================================

fn run_audit(args: &[String]) -> Result<()> {
    let Some(path) = args.first() else {
        print_usage();
        bail!("audit needs a compiled CSV file");
    };
    let column = args.get(1).map(String::as_str);

    println!("🩺 Auditing Relationship IDs in {}", path);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let ids = read_relationship_ids(Path::new(path), column)?;
    let fragmented = find_fragmented_ids(&ids, DEFAULT_ID_DELIMITER);

    if fragmented.is_empty() {
        println!("✅ {} rows, no fragmented identities", ids.len());
        return Ok(());
    }

    println!("❌ {} fragmented identities in {} rows", fragmented.len(), ids.len());
    for case in &fragmented {
        println!("\nStandalone ID: {}", case.standalone);
        println!("  rows {:?}", case.standalone_rows);
        println!("Appears inside:");
        for union in &case.appears_in {
            println!("  - {}", union);
        }
        println!("  rows {:?}", case.union_rows);
    }

    std::process::exit(1);
}
