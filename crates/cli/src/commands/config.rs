use serde_json::json;

use tiller_core::config::{AppConfig, LoadOptions, LogFormat};

pub fn run() -> String {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => {
            let format = match config.logging.format {
                LogFormat::Compact => "compact",
                LogFormat::Pretty => "pretty",
                LogFormat::Json => "json",
            };
            json!({
                "command": "config",
                "status": "ok",
                "database": {
                    "url": config.database.url,
                    "max_connections": config.database.max_connections,
                },
                "advisory": {
                    "configured": config.advisory.is_configured(),
                    "base_url": config.advisory.base_url,
                    "model": config.advisory.model,
                    "timeout_secs": config.advisory.timeout_secs,
                    "api_key": config.advisory.is_configured().then_some("<redacted>"),
                },
                "notify": {
                    "channels": config.notify.channels,
                    "slack_webhook_url": config
                        .notify
                        .slack_webhook_url
                        .as_ref()
                        .map(|_| "<redacted>"),
                },
                "logging": { "level": config.logging.level, "format": format },
            })
            .to_string()
        }
        Err(error) => json!({
            "command": "config",
            "status": "error",
            "error_class": "config_validation",
            "message": error.to_string(),
        })
        .to_string(),
    }
}
