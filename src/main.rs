// src/main.rs

use orchestrator::{cli, exit_code, logging, run};

#[tokio::main]
async fn main() {
    let outcome = run_main().await;
    match &outcome {
        Ok(Some(summary)) if !summary.successful => {
            eprintln!(
                "orchestrator: run unsuccessful ({} succeeded, {} failed, {} cancelled of {})",
                summary.succeeded, summary.failed, summary.cancelled, summary.total
            );
        }
        Ok(_) => {}
        Err(err) => eprintln!("orchestrator error: {err:?}"),
    }

    let code = exit_code(&outcome);
    if code != 0 {
        std::process::exit(code);
    }
}

async fn run_main() -> anyhow::Result<Option<orchestrator::dag::RunSummary>> {
    let args = cli::parse();
    logging::init_logging(args.log_level)?;
    run(args).await
}
