use std::sync::Arc;

use chrono::Utc;

use tiller_agents::{AgentExecutor, EngineServices, HttpAdvisor};
use tiller_core::config::{AppConfig, LoadOptions, LogFormat};
use tiller_core::domain::directory::OrgId;
use tiller_db::repositories::{
    SqlActionRepository, SqlConfigurationRepository, SqlProjectRepository,
    SqlPullRequestRepository, SqlTaskRepository, SqlUserRepository,
};
use tiller_db::{connect_with_settings, DbPool};
use tiller_notify::{
    InAppChannel, InMemoryInAppStore, NotificationChannel, Notifier, SlackWebhookChannel,
};

use crate::commands::CommandResult;

type CommandFailure = (&'static str, String, u8);

pub fn run(org: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "tick",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    init_tracing(&config);

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "tick",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let org_id = OrgId(org.to_string());
    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        let services = build_services(&config, pool.clone())?;
        let executor = AgentExecutor::new(services);

        let report = executor
            .run_for_org(&org_id, Utc::now())
            .await
            .map_err(|error| ("executor", error.to_string(), 6u8))?;

        pool.close().await;

        let executed_drains =
            report.drained.iter().filter(|outcome| outcome.executed).count();
        Ok::<String, CommandFailure>(format!(
            "org `{}`: {} configurations ran ({} failed), {} actions created, {} approved \
             actions drained ({} executed)",
            report.org_id.0,
            report.cycles.len(),
            report.failed_configurations(),
            report.actions_created(),
            report.drained.len(),
            executed_drains,
        ))
    });

    match result {
        Ok(message) => CommandResult::success("tick", message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("tick", error_class, message, exit_code)
        }
    }
}

fn build_services(config: &AppConfig, pool: DbPool) -> Result<EngineServices, CommandFailure> {
    let advisor = HttpAdvisor::new(config.advisory.clone())
        .map_err(|error| ("advisory_init", error.to_string(), 5u8))?;

    let mut channels: Vec<Arc<dyn NotificationChannel>> = Vec::new();
    for channel in &config.notify.channels {
        match channel.as_str() {
            "slack" => {
                // Validation guarantees the webhook is present when the
                // channel is enabled.
                if let Some(webhook_url) = config.notify.slack_webhook_url.clone() {
                    let slack = SlackWebhookChannel::new(webhook_url)
                        .map_err(|error| ("notify_init", error.to_string(), 5u8))?;
                    channels.push(Arc::new(slack));
                }
            }
            "in_app" => {
                channels.push(Arc::new(InAppChannel::new(Arc::new(
                    InMemoryInAppStore::default(),
                ))));
            }
            other => {
                tracing::warn!(channel = other, "skipping unrecognized notification channel");
            }
        }
    }

    Ok(EngineServices {
        configurations: Arc::new(SqlConfigurationRepository::new(pool.clone())),
        actions: Arc::new(SqlActionRepository::new(pool.clone())),
        tasks: Arc::new(SqlTaskRepository::new(pool.clone())),
        pull_requests: Arc::new(SqlPullRequestRepository::new(pool.clone())),
        users: Arc::new(SqlUserRepository::new(pool.clone())),
        projects: Arc::new(SqlProjectRepository::new(pool)),
        advisor: Arc::new(advisor),
        notifier: Notifier::new(channels),
    })
}

fn init_tracing(config: &AppConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = match config.logging.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };

    // A second init in the same process (tests) is fine to ignore.
    if let Err(error) = result {
        tracing::debug!(%error, "tracing subscriber already initialized");
    }
}
