use serde_json::json;

use tiller_core::config::{AppConfig, LoadOptions};
use tiller_db::{connect_with_settings, migrations};

struct Check {
    name: &'static str,
    ok: bool,
    detail: String,
}

pub fn run(json_output: bool) -> String {
    let mut checks = Vec::new();

    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            checks.push(Check {
                name: "config",
                ok: true,
                detail: "configuration loads and validates".to_string(),
            });
            Some(config)
        }
        Err(error) => {
            checks.push(Check { name: "config", ok: false, detail: error.to_string() });
            None
        }
    };

    if let Some(config) = &config {
        checks.push(Check {
            name: "advisory",
            ok: true,
            detail: if config.advisory.is_configured() {
                format!("configured (model {})", config.advisory.model)
            } else {
                "not configured; agents run in degraded (silent) advisory mode".to_string()
            },
        });

        checks.push(database_check(config));
    }

    render(checks, json_output)
}

fn database_check(config: &AppConfig) -> Check {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return Check {
                name: "database",
                ok: false,
                detail: format!("runtime init failed: {error}"),
            };
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("connect failed: {error}"))?;
        migrations::run_pending(&pool)
            .await
            .map_err(|error| format!("migrations failed: {error}"))?;
        pool.close().await;
        Ok::<(), String>(())
    });

    match result {
        Ok(()) => Check {
            name: "database",
            ok: true,
            detail: "connected and migrations are current".to_string(),
        },
        Err(detail) => Check { name: "database", ok: false, detail },
    }
}

fn render(checks: Vec<Check>, json_output: bool) -> String {
    let healthy = checks.iter().all(|check| check.ok);

    if json_output {
        return json!({
            "command": "doctor",
            "status": if healthy { "ok" } else { "error" },
            "checks": checks
                .iter()
                .map(|check| json!({
                    "name": check.name,
                    "ok": check.ok,
                    "detail": check.detail,
                }))
                .collect::<Vec<_>>(),
        })
        .to_string();
    }

    let mut lines = vec![format!("tiller doctor: {}", if healthy { "ok" } else { "issues found" })];
    for check in checks {
        lines.push(format!("  [{}] {}: {}", if check.ok { "ok" } else { "!!" }, check.name, check.detail));
    }
    lines.join("\n")
}
