use bondtun_session::{Host, HostReport};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::cmd::{load_config, RunArgs};
use crate::exit::{config_error, io_error, session_exit_code, CliError, CliResult, FAILURE, SUCCESS};
use crate::output::{or_dash, print_json, table, OutputFormat};

#[derive(Serialize)]
struct ReportOutput {
    clean: bool,
    sessions: Vec<OutcomeOutput>,
}

#[derive(Serialize)]
struct OutcomeOutput {
    name: String,
    status: &'static str,
    error: Option<String>,
}

pub fn run(args: RunArgs, format: OutputFormat) -> CliResult<i32> {
    let mut config = load_config(&args.config)?;
    if let Some(size) = args.socket_buffer_size {
        config.socket = config.socket.with_buffer_size(size);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("runtime setup failed", err))?;

    let report = runtime.block_on(async move {
        // Listeners bind inside the runtime.
        let host = Host::bind(config).map_err(|err| config_error("invalid config", err))?;
        let shutdown = CancellationToken::new();
        tokio::spawn(watch_signals(shutdown.clone()));
        Ok::<_, CliError>(host.run(shutdown).await)
    })?;

    print_report(&report, format);
    Ok(exit_code(&report))
}

/// Cancel `shutdown` on Ctrl-C or, on unix, SIGTERM.
async fn watch_signals(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "cannot watch SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        interrupted = tokio::signal::ctrl_c() => {
            if let Err(err) = interrupted {
                warn!(error = %err, "cannot watch Ctrl-C");
                return;
            }
            info!("interrupt received, stopping sessions");
        }
        _ = terminate => info!("terminate received, stopping sessions"),
    }
    shutdown.cancel();
}

fn exit_code(report: &HostReport) -> i32 {
    if report.all_clean() {
        return SUCCESS;
    }
    report
        .failures()
        .find_map(|outcome| outcome.result.as_ref().err())
        .map_or(FAILURE, session_exit_code)
}

fn summarize(report: &HostReport) -> ReportOutput {
    ReportOutput {
        clean: report.all_clean(),
        sessions: report
            .outcomes
            .iter()
            .map(|outcome| OutcomeOutput {
                name: outcome.name.clone(),
                status: if outcome.is_clean() { "clean" } else { "error" },
                error: outcome.result.as_ref().err().map(ToString::to_string),
            })
            .collect(),
    }
}

fn print_report(report: &HostReport, format: OutputFormat) {
    let out = summarize(report);
    match format {
        OutputFormat::Json => print_json(&out),
        OutputFormat::Table => {
            let mut t = table(vec!["SESSION", "STATUS", "ERROR"]);
            for s in &out.sessions {
                t.add_row(vec![
                    s.name.clone(),
                    s.status.to_string(),
                    or_dash(s.error.as_ref()),
                ]);
            }
            println!("{t}");
        }
        OutputFormat::Pretty => {
            for s in &out.sessions {
                match &s.error {
                    Some(err) => println!("session={} status={} error={err}", s.name, s.status),
                    None => println!("session={} status={}", s.name, s.status),
                }
            }
        }
        OutputFormat::Raw => {
            for s in &out.sessions {
                println!("{}\t{}", s.name, s.status);
            }
        }
    }
}
