use std::path::PathBuf;
use std::sync::Arc;

use netwatch::net::collector::DEFAULT_COLLECTOR_ENDPOINT;
use netwatch::runtime::{default_runtime, Clock, MonitorRuntime};
use netwatch::{
    build_telemetry, narrate, ConfigError, ExecutionMode, MonitorConfig, Orchestrator,
    SummaryDelegate,
};

fn usage() -> ! {
    eprintln!("Usage: netwatch [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --config FILE          JSON config file");
    eprintln!("  --target HOST          host to ping");
    eprintln!("  --samples N            echo requests per latency measurement");
    eprintln!("  --collector [URL]      OTLP/HTTP collector (default {DEFAULT_COLLECTOR_ENDPOINT})");
    eprintln!("  --out DIR              write NDJSON telemetry and report JSON here");
    eprintln!("  --concurrent           run probes concurrently");
    eprintln!("  --packets proc|netstat packet counter source");
    eprintln!("  --rounds N             number of runs");
    eprintln!("  --interval-ms MS       pause between runs");
    eprintln!("  --json                 print reports as JSON");
    std::process::exit(2);
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("error: {e}");
    std::process::exit(2);
}

struct Cli {
    config: MonitorConfig,
    json: bool,
}

fn parse_number<T: std::str::FromStr>(field: &'static str, raw: &str) -> T {
    raw.parse().unwrap_or_else(|_| {
        fail(ConfigError::Invalid {
            field,
            reason: format!("`{raw}` is not a number"),
        })
    })
}

fn next_value(it: &mut impl Iterator<Item = String>) -> String {
    it.next().unwrap_or_else(|| usage())
}

fn parse_args(args: Vec<String>) -> Cli {
    // --config is applied first so other flags override it.
    let mut config = match args.iter().position(|a| a == "--config") {
        Some(i) => match args.get(i + 1) {
            Some(path) => MonitorConfig::from_json_file(path).unwrap_or_else(|e| fail(e)),
            None => usage(),
        },
        None => MonitorConfig::default(),
    };
    let mut json = false;

    let mut it = args.into_iter().peekable();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => {
                next_value(&mut it);
            }
            "--target" => config.target = next_value(&mut it),
            "--samples" => {
                config.ping_samples = parse_number("ping_samples", &next_value(&mut it))
            }
            "--collector" => {
                let endpoint = it
                    .next_if(|v| !v.starts_with("--"))
                    .unwrap_or_else(|| DEFAULT_COLLECTOR_ENDPOINT.to_string());
                config.collector = Some(endpoint);
            }
            "--out" => config.artifact_dir = Some(PathBuf::from(next_value(&mut it))),
            "--concurrent" => config.mode = ExecutionMode::Concurrent,
            "--packets" => {
                config.packet_source = next_value(&mut it).parse().unwrap_or_else(|e| fail(e))
            }
            "--rounds" => config.rounds = parse_number("rounds", &next_value(&mut it)),
            "--interval-ms" => {
                config.interval_ms = parse_number("interval_ms", &next_value(&mut it))
            }
            "--json" => json = true,
            _ => usage(),
        }
    }

    if let Err(e) = config.validate() {
        fail(e);
    }
    Cli { config, json }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let Cli { config, json } = parse_args(std::env::args().skip(1).collect());

    let runtime = default_runtime();
    let clock: Arc<dyn Clock> = Arc::new(runtime.clone());
    let telemetry = match build_telemetry(&config, Arc::clone(&clock)) {
        Ok(t) => Arc::new(t),
        Err(e) => {
            eprintln!("error: telemetry setup: {e}");
            std::process::exit(1);
        }
    };
    let orchestrator = match Orchestrator::from_config(&config, telemetry.clone(), clock) {
        Ok(o) => o,
        Err(e) => fail(e),
    };

    for round in 1..=config.rounds {
        let report = orchestrator.run().await;
        if json {
            match report.to_json_pretty() {
                Ok(text) => println!("{text}"),
                Err(e) => tracing::error!(error = %e, "report not serializable"),
            }
        } else {
            print!("{report}");
        }
        if let Some(dir) = &config.artifact_dir {
            let path = dir.join(format!("report-{round}.json"));
            if let Err(e) = report.write_json(&path) {
                tracing::warn!(path = %path.display(), error = %e, "could not write report");
            }
        }
        if let Some(summary) = narrate(&report, &SummaryDelegate).await {
            println!("{summary}");
        }
        if round < config.rounds {
            runtime.sleep(config.interval()).await;
        }
    }

    let stats = telemetry.shutdown(config.flush_timeout());
    tracing::info!(
        exported = stats.exported,
        dropped = stats.dropped,
        backend_rejections = stats.backend_rejections,
        completed = stats.completed,
        "telemetry shut down"
    );
}
