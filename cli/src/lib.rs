mod cli;

use std::io::IsTerminal;
use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;

pub use cli::Cli;
use quorum_core::Debate;
use quorum_core::DebateOutcome;
use quorum_core::ProcessRegistry;
use quorum_core::load_config;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub async fn run_main(cli: Cli) -> anyhow::Result<ExitCode> {
    let Cli {
        config,
        max_rounds,
        mode,
        question,
    } = cli;

    // Determine the question from the CLI arg and/or stdin.
    let question = match question {
        Some(q) if q != "-" => q,
        maybe_dash => {
            let force_stdin = matches!(maybe_dash.as_deref(), Some("-"));
            if std::io::stdin().is_terminal() && !force_stdin {
                eprintln!(
                    "No question provided. Either specify one as an argument or pipe it into stdin."
                );
                return Ok(ExitCode::FAILURE);
            }
            if !force_stdin {
                eprintln!("Reading question from stdin...");
            }
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            if buffer.trim().is_empty() {
                eprintln!("No question provided via stdin.");
                return Ok(ExitCode::FAILURE);
            }
            buffer.trim().to_string()
        }
    };

    let default_level = "info";
    let _ = tracing_subscriber::fmt()
        // Fall back to the default log filter if the environment variable
        // is not set or contains an invalid value.
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(default_level))
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let mut loaded = load_config(&config)?;
    if let Some(max_rounds) = max_rounds {
        loaded.debate.max_rounds = max_rounds;
    }
    if let Some(mode) = mode {
        loaded.debate.consensus_mode = mode.into();
    }
    loaded.debate.validate()?;

    let registry = Arc::new(ProcessRegistry::new());
    let cancel = CancellationToken::new();

    // First Ctrl-C cancels the debate and tears down every live agent
    // process; the round loop observes the token at its next boundary.
    tokio::spawn({
        let registry = Arc::clone(&registry);
        let cancel = cancel.clone();
        async move {
            loop {
                tokio::signal::ctrl_c().await.ok();
                debug!("keyboard interrupt");
                cancel.cancel();
                registry.terminate_all().await;
            }
        }
    });

    let debate = Debate::new(loaded, Arc::clone(&registry), cancel);
    let outcome = debate.run(&question).await?;

    match &outcome {
        DebateOutcome::Consensus {
            winner_id, round, ..
        } => {
            info!(winner = %winner_id, round, "debate finished with consensus");
        }
        DebateOutcome::NoConsensus { best_id, .. } => {
            info!(best = %best_id, "debate finished without consensus");
        }
        DebateOutcome::Interrupted => {
            info!("debate interrupted");
        }
    }

    match outcome.final_text() {
        Some(text) => {
            println!("{text}");
            Ok(ExitCode::SUCCESS)
        }
        // Interrupted: conventional exit code for SIGINT.
        None => Ok(ExitCode::from(130)),
    }
}
