use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use kube_vip_watcher::probe::is_process_running;

/// Liveness probe: exits 0 while a kube-vip-watcher process is running
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Process name to look for (case-insensitive substring)
    #[arg(long, env = "PROBE_PROCESS_NAME", default_value = "kube-vip-watcher")]
    process_name: String,
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    let found = is_process_running(&args.process_name)
        .with_context(|| format!("failed to scan processes for {}", args.process_name))?;

    match found {
        Some(process) => {
            println!(
                "Liveness-Probe: {} running (pid {})",
                process.comm, process.pid
            );
            Ok(ExitCode::SUCCESS)
        }
        None => {
            println!("Liveness-Probe: no {} process is running", args.process_name);
            Ok(ExitCode::FAILURE)
        }
    }
}
