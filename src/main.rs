mod command;
mod config;
mod intake;
mod ledger;
mod transport;

#[cfg(test)]
mod test_support;

use anyhow::{Context, Result};
use clap::Parser;
use command::CommandExecutor;
use config::RelayConfig;
use intake::{IntakeConfig, IntakeCoordinator};
use ledger::{LedgerClient, LedgerCredentials, RealtimeConfig, RealtimeSubscription};
use std::sync::Arc;
use std::time::Duration;
use transport::MqttPublisher;

use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Time allowed for the MQTT disconnect to reach the broker
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let config = RelayConfig::parse();
    init_tracing(config.log_json);

    info!("Edge relay starting: device {}", config.device_id);
    info!("  Site: {}", config.site_id);
    info!("  Ledger: {}", config.ledger_url);
    info!("  Broker: {}:{}", config.mqtt_host, config.mqtt_port);

    let ledger = Arc::new(LedgerClient::new(
        &config.ledger_url,
        &config.ledger_key,
        LedgerCredentials {
            email: config.device_email.clone(),
            password: config.device_password.clone(),
        },
    ));
    ledger
        .sign_in()
        .await
        .context("device sign-in to the ledger failed")?;

    let (publisher, driver) = MqttPublisher::connect(config.mqtt_config());

    let executor = Arc::new(CommandExecutor::new(
        &config.site_id,
        ledger.clone(),
        Arc::new(publisher.clone()),
    ));

    let events = RealtimeSubscription::new(
        RealtimeConfig::new(&config.device_id, &config.commands_table),
        ledger.clone(),
    )
    .spawn();

    let coordinator = IntakeCoordinator::new(
        IntakeConfig {
            poll_interval: config.poll_interval(),
            ..IntakeConfig::new(&config.device_id)
        },
        executor,
        ledger,
    );

    tokio::select! {
        _ = coordinator.run(events) => {
            warn!("Intake stopped unexpectedly");
        }
        signal = shutdown_signal() => {
            let signal = signal.context("failed to listen for shutdown signals")?;
            info!("Received {}, shutting down", signal);
        }
    }

    publisher.disconnect().await;
    driver.join(SHUTDOWN_GRACE).await;
    info!("Edge relay stopped");
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer()).init();
    }
}

/// Resolves on ctrl-c, or SIGTERM on unix
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "interrupt"),
            _ = terminate.recv() => Ok("terminate"),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.map(|_| "interrupt")
    }
}
