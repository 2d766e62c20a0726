use std::env;
use std::fs;
use std::path::Path;

use token_proof::{
    dedupe, envelope, ingest, io::write_results, net::ProofPipeline, AssetEntry, KdfParams,
    ProofConfig, ProofResponse, Submission,
};
use tracing_subscriber::EnvFilter;

fn fatal(message: &str) -> ! {
    tracing::error!("{message}");
    eprintln!("{message}");
    std::process::exit(1);
}

fn print_help() {
    println!("Usage: token-proof [run|seal|dedupe] ...");
    println!("  run                                   run the proof with environment configuration");
    println!("  seal <input> <output>                 encrypt a file with SIGNATURE as passphrase");
    println!("  dedupe <current.json> <history.json>...  print the novelty result");
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let command = args.next();
    match command.as_deref() {
        None | Some("run") => cmd_run(),
        Some("seal") => cmd_seal(args.collect()),
        Some("dedupe") => cmd_dedupe(args.collect()),
        Some("-h") | Some("--help") | Some("help") => print_help(),
        Some(other) => {
            eprintln!("unknown command: {other}");
            print_help();
            std::process::exit(1);
        }
    }
}

fn cmd_run() {
    let config = ProofConfig::from_env();
    config.log_summary();
    let output_dir = config.output_dir.clone();
    let dlp_id = config.dlp_id;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .unwrap_or_else(|err| fatal(&format!("failed to start runtime: {err}")));
    let outcome = runtime.block_on(async {
        let pipeline = ProofPipeline::from_config(config).await?;
        pipeline.run().await
    });

    match outcome {
        Ok(response) => {
            if let Err(err) = write_results(&output_dir, &response) {
                fatal(&format!("failed to write proof: {err}"));
            }
        }
        Err(err) => {
            tracing::error!(error = %err, "proof run failed");
            if let Err(write_err) = write_results(&output_dir, &ProofResponse::failed(dlp_id, &err)) {
                tracing::error!(error = %write_err, "failed to write failure record");
            }
            std::process::exit(1);
        }
    }
}

fn cmd_seal(args: Vec<String>) {
    let [input, output] = args.as_slice() else {
        fatal("Usage: token-proof seal <input> <output>");
    };
    let passphrase = env::var("SIGNATURE")
        .ok()
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| fatal("SIGNATURE must be set to seal a payload"));
    let plaintext =
        fs::read(input).unwrap_or_else(|err| fatal(&format!("failed to read {input}: {err}")));
    let sealed = envelope::seal(&plaintext, &passphrase, KdfParams::DEFAULT)
        .unwrap_or_else(|err| fatal(&format!("failed to seal {input}: {err}")));
    fs::write(output, &sealed)
        .unwrap_or_else(|err| fatal(&format!("failed to write {output}: {err}")));
    tracing::info!(input = %input, output = %output, bytes = sealed.len(), "sealed payload");
}

fn cmd_dedupe(args: Vec<String>) {
    let Some((current, history)) = args.split_first() else {
        fatal("Usage: token-proof dedupe <current.json> <history.json>...");
    };
    let current = ingest::read_submission(Path::new(current))
        .unwrap_or_else(|err| fatal(&err.to_string()));
    let historical: Vec<AssetEntry> = history
        .iter()
        .flat_map(|path| read_history(path).tokens)
        .collect();
    let result = dedupe::dedupe(&current.tokens, &historical);
    match serde_json::to_string_pretty(&result) {
        Ok(json) => println!("{json}"),
        Err(err) => fatal(&format!("failed to encode result: {err}")),
    }
}

fn read_history(path: &str) -> Submission {
    let bytes = fs::read(path).unwrap_or_else(|err| fatal(&format!("failed to read {path}: {err}")));
    Submission::from_historical_slice(&bytes)
        .unwrap_or_else(|err| fatal(&format!("malformed history file {path}: {err}")))
}
