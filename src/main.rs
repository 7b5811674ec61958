use log::{error, info, warn};
use std::sync::Arc;
use tokio::time::{sleep, Duration};

use emw_meter::config::{ConfigStore, FileConfigStore, Settings, KEY_BROKER};
use emw_meter::sensor::{run_indoor_sampler, W1Thermometer};
use emw_meter::store::TelemetryStore;
use emw_meter::telemetry::{MqttConnector, TelemetryClient, TelemetryStarter};
use emw_meter::utils::{
    client_id_from_mac, describe_buffer, describe_forecast, describe_value, format_datetime,
    wait_for_shutdown, TokioSleeper,
};
use emw_meter::wifi::{BootOutcome, ConnectivityManager, LoopbackRadio, WifiDriver};

const SUMMARY_INTERVAL_SECS: u64 = 60;

async fn summary_loop(store: Arc<TelemetryStore>, manager: Arc<ConnectivityManager>) {
    loop {
        sleep(Duration::from_secs(SUMMARY_INTERVAL_SECS)).await;

        let telemetry = store.snapshot();
        let status = manager.status().await;

        info!("Summary ({:?}):", status.serving());
        match telemetry.updated_at() {
            Some(at) => info!("  Last update: {}", format_datetime(&at)),
            None => warn!("  No broker data received yet"),
        }
        info!(
            "  Indoor: {}°C, history {}",
            describe_value(telemetry.indoor().value(), 1),
            describe_buffer(telemetry.indoor_stats(), 0.1)
        );
        info!(
            "  Outdoor: {}°C, history {}",
            describe_value(telemetry.outdoor().value(), 1),
            describe_buffer(telemetry.outdoor_stats(), 0.1)
        );
        info!(
            "  Power: {} W, history {}",
            describe_value(telemetry.power().value(), 0),
            describe_buffer(telemetry.power_stats(), 1.0)
        );
        info!("  Forecast: {}", describe_forecast(&telemetry.forecast()));
    }
}

async fn run(settings: Settings) -> Result<(), Box<dyn std::error::Error>> {
    let config: Arc<dyn ConfigStore> = Arc::new(FileConfigStore::open(&settings.config_path)?);
    let store = Arc::new(TelemetryStore::new());
    let driver = Arc::new(LoopbackRadio::new(settings.mac));

    let mac = driver.mac_address().await?;
    let client_id = client_id_from_mac(&mac);
    info!("Client id {}", client_id);
    if config.get(KEY_BROKER).is_none() {
        warn!("No broker configured, telemetry stays idle until one is set");
    }

    let client = TelemetryClient::new(
        Arc::clone(&store),
        Arc::clone(&config),
        Arc::new(MqttConnector::new()),
        client_id,
    );
    let starter = Arc::new(TelemetryStarter::new(client));

    let manager = ConnectivityManager::new(driver, Arc::clone(&config), starter)
        .with_static_address(settings.static_ip)
        .start();

    match manager.reconcile_at_boot().await {
        BootOutcome::Station => info!("Booted as station"),
        BootOutcome::AccessPoint => info!("Booted as access point"),
        BootOutcome::AccessPointWithRetry(_) => info!("Booted as access point, join retry running"),
    }

    if let Some(device) = &settings.onewire_device {
        info!("Sampling indoor temperature from {}", device.display());
        tokio::spawn(run_indoor_sampler(
            Arc::clone(&store),
            Arc::new(W1Thermometer::new(device)),
            Arc::new(TokioSleeper),
            settings.sample_interval,
        ));
    } else {
        warn!("No 1-wire device configured, indoor temperature stays missing");
    }

    summary_loop(store, manager).await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_secs()
        .init();

    // Load configuration
    let settings = match Settings::new() {
        Ok(settings) => settings,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle Ctrl+C gracefully
    let (tx, mut rx) = tokio::sync::oneshot::channel();
    tokio::spawn(async move {
        wait_for_shutdown(tokio::signal::ctrl_c()).await;
        let _ = tx.send(());
    });

    tokio::select! {
        result = run(settings) => {
            match result {
                Ok(_) => info!("Program completed successfully"),
                Err(e) => error!("Fatal error: {}", e),
            }
        }
        _ = &mut rx => {
            info!("Program terminated by user. Exiting gracefully.");
        }
    }

    Ok(())
}
