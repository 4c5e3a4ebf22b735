use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use nsxt_provider::acceptance::{self, Harness};
use nsxt_provider::apply::{self, Action, ApplyErrors, Document, Plan};
use nsxt_provider::nsx::client::NsxClient;
use nsxt_provider::nsx::http::format_nsx_error;
use nsxt_provider::nsx::memory::InMemoryNsx;
use nsxt_provider::nsx::LoadBalancerApi;
use nsxt_provider::resource::{get_all_resource_kinds, Protocol, ResourceAddress, StateFile};
use nsxt_provider::{Provider, ProviderConfig, VERSION};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "NSXT_LOG";

/// Declarative management of NSX-T load balancer monitors
#[derive(Parser, Debug)]
#[command(name = "nsxt-provider", version = VERSION, about, long_about = None)]
struct Args {
    /// Provider config file (defaults to <config dir>/nsxt-provider/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State file
    #[arg(long, global = true, default_value = "nsxt-provider.state.json")]
    state: PathBuf,

    /// Log level for debugging
    #[arg(long, global = true, value_enum, default_value = "off")]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check a document without contacting NSX
    Validate {
        #[arg(default_value = "main.yaml")]
        document: PathBuf,
    },
    /// Show the changes apply would make
    Plan {
        #[arg(default_value = "main.yaml")]
        document: PathBuf,
    },
    /// Create, update and delete objects to match a document
    Apply {
        #[arg(default_value = "main.yaml")]
        document: PathBuf,
    },
    /// Update state from NSX, dropping objects deleted out of band
    Refresh,
    /// Delete every object in state
    Destroy,
    /// Adopt an existing monitor, e.g. `import nsxt_lb_tcp_monitor.web <id>`
    Import { address: ResourceAddress, id: String },
    /// Print state attributes
    Show,
    /// Run an acceptance scenario
    Acceptance {
        #[arg(long, value_enum)]
        protocol: Protocol,

        /// Scenario to run; both when omitted
        #[arg(long, value_enum)]
        scenario: Option<Scenario>,

        /// Run against an in-process NSX instead of the configured manager
        #[arg(long)]
        in_memory: bool,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Scenario {
    Basic,
    Import,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn directive(self) -> Option<&'static str> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some("error"),
            LogLevel::Warn => Some("warn"),
            LogLevel::Info => Some("info"),
            LogLevel::Debug => Some("debug"),
            LogLevel::Trace => Some("trace"),
        }
    }
}

/// File logging, enabled by `--log-level` or `NSXT_LOG` (which wins)
fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = match (EnvFilter::try_from_env(LOG_ENV), level.directive()) {
        (Ok(filter), _) => filter,
        (Err(_), Some(directive)) => EnvFilter::new(directive),
        (Err(_), None) => return Ok(None),
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("nsxt-provider {} started with log level: {:?}", VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("nsxt-provider").join("nsxt-provider.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".nsxt-provider").join("nsxt-provider.log");
    }
    PathBuf::from("nsxt-provider.log")
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = match setup_logging(args.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Warning: logging disabled: {err:#}");
            None
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report(&err);
            ExitCode::FAILURE
        }
    }
}

fn report(err: &anyhow::Error) {
    tracing::error!("{:#}", err);

    let Some(failures) = err.downcast_ref::<ApplyErrors>() else {
        eprintln!("Error: {err:#}");
        return;
    };
    for failure in &failures.0 {
        eprintln!(
            "Error: {}: {} failed: {}",
            failure.address,
            failure.operation,
            format_nsx_error(&failure.source)
        );
    }
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Validate { document } => validate(&document),
        // Local only; no manager connection needed
        Command::Show => {
            let state = StateFile::load(&args.state)?;
            print!("{}", show(&state)?);
            Ok(())
        }
        Command::Acceptance {
            protocol,
            scenario,
            in_memory,
        } => {
            if in_memory {
                run_acceptance(InMemoryNsx::new(), protocol, scenario).await
            } else {
                let client = connect(args.config.as_deref())?;
                run_acceptance(client, protocol, scenario).await
            }
        }
        command => {
            let provider = Provider::new(connect(args.config.as_deref())?);
            let mut state = StateFile::load(&args.state)?;

            let result = execute(&provider, command, &mut state).await;

            // Partial progress is kept even when some operations failed
            state.save(&args.state)?;
            result
        }
    }
}

fn connect(config_path: Option<&Path>) -> Result<NsxClient> {
    let config = ProviderConfig::load(config_path)?;
    tracing::info!("Using NSX Manager {}", config.host);
    NsxClient::new(&config)
}

fn validate(path: &Path) -> Result<()> {
    let document = Document::load(path)?;
    let provider = Provider::new(InMemoryNsx::new());

    let failures: Vec<_> = document
        .resources
        .iter()
        .filter_map(|block| provider.validate(&block.address(), &block.config).err())
        .collect();
    if !failures.is_empty() {
        return Err(ApplyErrors(failures).into());
    }

    println!("{} resource(s) valid.", document.resources.len());
    Ok(())
}

async fn execute<A: LoadBalancerApi + Clone>(
    provider: &Provider<A>,
    command: Command,
    state: &mut StateFile,
) -> Result<()> {
    match command {
        Command::Plan { document } => {
            let document = Document::load(&document)?;
            let plan = apply::plan(provider, &document, state).await?;
            print_plan(&plan);
        }
        Command::Apply { document } => {
            let document = Document::load(&document)?;
            let plan = apply::plan(provider, &document, state).await?;
            print_plan(&plan);
            if !plan.is_empty() {
                apply::apply(provider, &plan, state).await?;
                println!("Apply complete.");
            }
        }
        Command::Refresh => {
            apply::refresh(provider, state).await?;
            println!("{} resource(s) in state.", state.resources.len());
        }
        Command::Destroy => {
            let count = state.resources.len();
            apply::destroy(provider, state).await?;
            println!("Destroy complete, {} resource(s) destroyed.", count);
        }
        Command::Import { address, id } => {
            apply::import(provider, state, &address, &id).await?;
            println!("Imported {} as {}.", id, address);
        }
        Command::Show => print!("{}", show(state)?),
        Command::Validate { document } => validate(&document)?,
        Command::Acceptance { .. } => bail!("acceptance runs keep their own state"),
    }
    Ok(())
}

fn show(state: &StateFile) -> Result<String> {
    let described = apply::describe(state);
    if described.is_empty() {
        return Ok(format!(
            "No resources in state. Known types: {}\n",
            get_all_resource_kinds().join(", ")
        ));
    }
    Ok(serde_yaml::to_string(&described)?)
}

fn print_plan(plan: &Plan) {
    for change in &plan.changes {
        if change.action != Action::NoOp {
            println!("{} {}", change.action, change.address);
        }
    }
    if plan.is_empty() {
        println!("No changes. Infrastructure matches the document.");
    } else {
        println!(
            "Plan: {} to add, {} to change, {} to destroy.",
            plan.count(Action::Create),
            plan.count(Action::Update),
            plan.count(Action::Delete)
        );
    }
}

async fn run_acceptance<A: LoadBalancerApi + Clone>(
    api: A,
    protocol: Protocol,
    scenario: Option<Scenario>,
) -> Result<()> {
    let cases = match scenario {
        Some(Scenario::Basic) => vec![acceptance::basic(protocol)],
        Some(Scenario::Import) => vec![acceptance::import_basic(protocol)],
        None => vec![acceptance::basic(protocol), acceptance::import_basic(protocol)],
    };

    let harness = Harness::new(api);
    for case in &cases {
        harness.run(case).await?;
        println!("PASS {}", case.name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nsxt_provider::resource::{L4MonitorState, StateEntry};

    #[tokio::test]
    async fn test_show_works_without_manager_config() {
        let dir = tempfile::tempdir().unwrap();
        let state_path = dir.path().join("state.json");

        let mut state = StateFile::new();
        let monitor = L4MonitorState {
            id: "m-1".to_string(),
            protocol: Protocol::Udp,
            revision: 0,
            display_name: "dns".to_string(),
            description: None,
            fall_count: 3,
            rise_count: 3,
            interval: 5,
            timeout: 15,
            monitor_port: Some(53),
            send: None,
            receive: None,
            tags: Vec::new(),
        };
        state.insert(
            &ResourceAddress::new("nsxt_lb_udp_monitor", "dns"),
            StateEntry::from_monitor(&monitor),
        );
        state.save(&state_path).unwrap();

        // A config file that does not exist fails any command that connects
        let missing_config = dir.path().join("missing.yaml");
        let args = Args::parse_from([
            "nsxt-provider",
            "--config",
            missing_config.to_str().unwrap(),
            "--state",
            state_path.to_str().unwrap(),
            "show",
        ]);
        run(args).await.unwrap();

        let output = show(&StateFile::load(&state_path).unwrap()).unwrap();
        assert!(output.contains("nsxt_lb_udp_monitor.dns"));
        assert!(output.contains("monitor_port"));
        assert!(output.contains("53"));
    }
}
