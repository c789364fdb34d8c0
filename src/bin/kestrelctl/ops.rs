use anyhow::Result;
use kestrel::api::ApiClient;
use kestrel::campaign::Campaign;
use kestrel::channel::WebSocketConnector;
use kestrel::config::{Config, ConfigUtils};
use kestrel::controller::{Completion, QueryRunController, RunEvent};
use kestrel::logging::log_error_with_context;
use kestrel::query::validate_query;
use kestrel::targets::SelectedTargets;
use tracing::{info, warn};

enum Step {
    Event(Option<RunEvent>),
    Interrupted,
}

fn print_progress(campaign: Option<&Campaign>) {
    if let Some(campaign) = campaign {
        if campaign.is_loading() {
            println!("[{}] waiting for hosts...", campaign.id);
        } else {
            println!("[{}] {}", campaign.id, campaign);
        }
    }
}

pub async fn run_query(
    config: &Config,
    query: &str,
    hosts: Vec<u64>,
    labels: Vec<u64>,
    export: bool,
    filename_base: Option<String>,
) -> Result<()> {
    let client = ApiClient::new(&config.server)?;
    let connector = WebSocketConnector::new(config.server.websocket_url()?, config.server.token.clone());
    let mut controller = QueryRunController::new(client, connector);

    let campaign_id = controller
        .start(query, SelectedTargets::new(hosts, labels))
        .await?;
    println!("Campaign {campaign_id} started; press Ctrl-C to stop");

    loop {
        // The select borrows the controller; stop() runs once it has resolved.
        let step = tokio::select! {
            event = controller.next_event() => Step::Event(event),
            _ = tokio::signal::ctrl_c() => Step::Interrupted,
        };

        match step {
            Step::Interrupted => {
                controller.stop();
                break;
            }
            Step::Event(None) => break,
            Step::Event(Some(RunEvent::Updated)) | Step::Event(Some(RunEvent::Finished)) => {
                print_progress(controller.campaign());
            }
            Step::Event(Some(RunEvent::Incomplete(e))) => {
                warn!(error = %e, "Run ended early");
            }
            Step::Event(Some(RunEvent::Duplicate)) | Step::Event(Some(RunEvent::Ignored)) => {}
        }
    }

    match controller.completion() {
        Some(Completion::Finished) => println!("Campaign {campaign_id} finished"),
        Some(Completion::Stopped) => println!("Campaign {campaign_id} stopped"),
        Some(Completion::Incomplete { reason }) => {
            println!("Campaign {campaign_id} incomplete: {reason}")
        }
        None => {}
    }
    if let Some(campaign) = controller.campaign() {
        println!("{campaign}");
        for error in &campaign.errors {
            println!("  error: {error}");
        }
    }

    if export {
        let base = filename_base.unwrap_or_else(|| config.campaign.export_filename_base.clone());
        let saved = controller
            .export(&base)
            .and_then(|file| file.save_to(&config.campaign.export_directory));
        match saved {
            Ok(path) => println!("Exported results to {}", path.display()),
            Err(e) => {
                log_error_with_context(&e, "Exporting query results");
                return Err(e.into());
            }
        }
    }

    Ok(())
}

pub async fn list_targets(config: &Config, query: &str) -> Result<()> {
    let client = ApiClient::new(&config.server)?;
    let search = match client
        .search_targets(query, &SelectedTargets::default())
        .await
    {
        Ok(search) => search,
        Err(e) => {
            log_error_with_context(&e, "Searching targets");
            return Err(e.into());
        }
    };

    println!("Hosts:");
    for host in &search.hosts {
        println!("- {host}");
    }
    println!("Labels:");
    for label in &search.labels {
        println!("- {label}");
    }
    println!(
        "{} targets, {} online, {} missing in action",
        search.targets_count, search.targets_online, search.targets_missing_in_action
    );
    Ok(())
}

pub fn validate(query: &str) -> Result<()> {
    validate_query(query)?;
    println!("Query OK");
    Ok(())
}

pub fn show_config(config: &Config, as_env: bool) -> Result<()> {
    if as_env {
        let mut vars: Vec<_> = config.to_env_vars().into_iter().collect();
        vars.sort();
        for (key, value) in vars {
            println!("{key}={value}");
        }
        return Ok(());
    }

    ConfigUtils::print_config(config);
    println!("{}", ConfigUtils::export_as_json(config)?);

    let warnings = ConfigUtils::check_configuration_health(config);
    if warnings.is_empty() {
        info!("Configuration health check passed");
    }
    for warning in warnings {
        println!("warning: {warning}");
    }
    Ok(())
}
