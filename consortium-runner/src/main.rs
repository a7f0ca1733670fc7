use std::path::Path;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use consortium_convergence::Poller;
use consortium_core::clock::TokioClock;
use consortium_core::config::ConsortiumConfig;
use consortium_core::metrics::describe_metrics;
use consortium_runner::cli::RunnerCli;
use consortium_runner::error::RunnerError;
use consortium_runner::logging::init_tracing;
use consortium_runner::output::OutputWriter;
use consortium_runner::report::ConfigValidationReport;
use consortium_runner::workflow::Workflow;
use consortium_sandbox::SandboxNetwork;

#[tokio::main]
async fn main() {
    let cli = RunnerCli::parse();
    let writer = OutputWriter::new(cli.output);

    if let Err(e) = run(cli, &writer).await {
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: RunnerCli, writer: &OutputWriter) -> Result<(), RunnerError> {
    if cli.validate {
        return validate(&cli.config, writer).await;
    }

    let config = cli.load_config().await?;
    init_tracing(&config.general).map_err(|e| RunnerError::Logging(e.to_string()))?;
    describe_metrics();

    info!(
        config = %cli.config.display(),
        channel = %config.network.channel_id,
        chaincode = %config.chaincode.name,
        "consortium-runner starting"
    );

    let clock = Arc::new(TokioClock::new());
    let network = SandboxNetwork::from_config(&config, Arc::clone(&clock));
    let workflow = Workflow::new(network.clone(), config, Poller::new(clock));

    let mut state = workflow.new_state();
    let report = workflow
        .run(&mut state)
        .await?
        .with_network_calls(network.stats());
    writer.render(&report)?;

    info!("consortium-runner finished");
    Ok(())
}

async fn validate(path: &Path, writer: &OutputWriter) -> Result<(), RunnerError> {
    let source = path.display().to_string();
    let report = match ConsortiumConfig::load(path).await {
        Ok(config) => ConfigValidationReport {
            source,
            valid: true,
            channel_id: Some(config.network.channel_id.clone()),
            chaincode: Some(format!(
                "{}:{}",
                config.chaincode.name, config.chaincode.version
            )),
            errors: Vec::new(),
        },
        Err(e) => {
            writer.render(&ConfigValidationReport {
                source,
                valid: false,
                channel_id: None,
                chaincode: None,
                errors: vec![e.to_string()],
            })?;
            return Err(RunnerError::Config(e));
        }
    };
    writer.render(&report)?;
    Ok(())
}
