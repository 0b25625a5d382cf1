//! p2p-scan CLI: crawl the Monero P2P network one budgeted run at a time
//!
//! Each run resumes from `<data_dir>/p2p_scan.json`, probes up to `limit`
//! nodes, prints a summary and writes the checkpoint back.

use log::error;
use p2p_scan::{CheckpointStore, CrawlEnd, Crawler, NodeProber, SaveOutcome, ScanConfig};
use std::env;
use std::path::PathBuf;

fn print_usage() {
    println!(
        r#"
p2p-scan - resumable Levin P2P network crawler

Usage: p2p-scan [options]

Options:
  --config   <file>   TOML configuration file
  --host     <host>   Bootstrap node host         (default 176.9.0.187)
  --port     <port>   Bootstrap node port         (default 18080)
  --limit    <n>      Probe attempts for this run (default 100)
  --data-dir <dir>    Checkpoint directory        (default ./data)
  -h, --help          Show this message

Examples:
  p2p-scan
  p2p-scan --limit 1000 --data-dir /var/lib/p2p-scan
  p2p-scan --config scan.toml --host 127.0.0.1 --port 28080
"#
    );
}

/// `Ok(None)` means help was requested
fn parse_args(args: &[String]) -> Result<Option<ScanConfig>, String> {
    if args.iter().any(|a| a == "-h" || a == "--help" || a == "help") {
        return Ok(None);
    }

    let mut config = match args.iter().position(|a| a == "--config") {
        Some(i) => {
            let path = args.get(i + 1).ok_or("--config needs a file")?;
            ScanConfig::from_file(&PathBuf::from(path)).map_err(|e| e.to_string())?
        }
        None => ScanConfig::default(),
    };

    let mut iter = args.iter();
    while let Some(flag) = iter.next() {
        let mut value = || iter.next().ok_or_else(|| format!("{} needs a value", flag));
        match flag.as_str() {
            "--config" => {
                value()?;
            }
            "--host" => config.bootstrap.host = value()?.clone(),
            "--port" => {
                config.bootstrap.port = value()?
                    .parse()
                    .map_err(|_| "port must be a number between 1 and 65535".to_string())?
            }
            "--limit" => {
                config.crawl.limit = value()?
                    .parse()
                    .map_err(|_| "limit must be a number".to_string())?
            }
            "--data-dir" => config.storage.data_dir = PathBuf::from(value()?),
            other => return Err(format!("Unknown option: {}", other)),
        }
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(Some(config))
}

async fn run(config: ScanConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = CheckpointStore::new(&config.storage.data_dir);
    let state = store.load(&config.bootstrap_node())?;

    let crawler = Crawler::new(NodeProber::new(config.prober_config()), config.crawl_config());
    let (state, report) = crawler.run(state).await;
    println!("Done");

    println!("Nodes scanned:  {}", state.newly_scanned());
    println!("Total nodes scanned:  {}", state.scanned.len());
    println!("Nodes with errors:  {}", state.error.len());
    println!("------------------");
    println!("Nodes to scan:  {}", state.not_scanned_yet.len());
    if report.end == CrawlEnd::FrontierExhausted {
        println!(
            "Frontier exhausted after {} probes in {} rounds",
            report.attempts, report.rounds
        );
    }

    match store.save(&state)? {
        SaveOutcome::Written => println!("Saved {}", store.path().display()),
        SaveOutcome::Skipped => {
            println!("0 peers scanned - NOT overwriting {}", store.path().display())
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = match parse_args(&args) {
        Ok(Some(config)) => config,
        Ok(None) => {
            print_usage();
            return;
        }
        Err(e) => {
            eprintln!("{}", e);
            print_usage();
            std::process::exit(2);
        }
    };

    if let Err(e) = run(config).await {
        error!("{}", e);
        std::process::exit(1);
    }
}
