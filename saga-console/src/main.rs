//! Saga rules console.
//!
//! A line-oriented shell over an actor snapshot for checking expressions,
//! attributes, prerequisites and choices by hand:
//!
//! ```bash
//! cargo run -p saga-console -- kel.json
//! ```

mod headless;
mod prompt;

use saga_core::RulesConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("saga_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return Ok(());
    }

    let options = headless::parse_options_from_args(&args, RulesConfig::from_env());
    headless::run_headless(options).await?;
    Ok(())
}

fn print_help() {
    println!("saga-console - rules engine shell for Saga-edition character snapshots");
    println!();
    println!("USAGE:");
    println!("  saga-console [OPTIONS] [SNAPSHOT]");
    println!();
    println!("OPTIONS:");
    println!("  -h, --help     Show this help message");
    println!("  --strict       Fail unsupported prerequisite types");
    println!("  --disabled     Include disabled items and effects in attributes");
    println!();
    println!("ENVIRONMENT:");
    println!("  RUST_LOG                   Log filter (default: saga_core=info)");
    println!("  SAGA_STRICT_PREREQUISITES  Same as --strict when set to true");
    println!();
    println!("EXAMPLES:");
    println!("  saga-console kel.json");
    println!("  RUST_LOG=saga_core=debug saga-console --strict kel.json");
}
