use color_eyre::eyre::{WrapErr, eyre};
use rustls::crypto;
use rustls::crypto::CryptoProvider;
use sea_orm::Database;
use std::sync::Arc;
use tor_weather::AppResources;
use tor_weather::config::load_config;
use tor_weather::directory::OnionooClient;
use tor_weather::notify::{LogNotifier, Notifier, SmtpNotifier};
use tor_weather::store::Store;
use tor_weather::weather::{recurring_weather_checks, run_with_fresh_directory};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "tor_weather=info,hyper=warn,sea_orm=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true).with_level(true))
        .init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();
    initialize_tracing();

    let config = Arc::new(load_config().wrap_err("Failed to load configuration")?);

    let ring_provider = crypto::ring::default_provider();
    CryptoProvider::install_default(ring_provider)
        .map_err(|_| eyre!("Failed to install crypto provider"))?;

    let db = Database::connect(&config.database_url)
        .await
        .wrap_err("Failed to connect to database")?;
    let resources = Arc::new(AppResources::new(Store::new(db), config.clone()));
    let client = OnionooClient::new(&config.directory)?;

    tracing::info!(
        name = "weather.startup",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        directory = %client.url(),
        interval_secs = config.weather.check_interval_secs,
        dry_run = config.weather.dry_run,
        run_once = config.weather.run_once,
        message = "Starting Tor Weather"
    );

    if config.weather.dry_run {
        drive(resources.clone(), client, LogNotifier).await;
    } else {
        let notifier = SmtpNotifier::new(&config.smtp, &config.base_url)?;
        drive(resources.clone(), client, notifier).await;
    }

    match Arc::try_unwrap(resources) {
        Ok(resources) => resources.store.close().await?,
        Err(_) => tracing::warn!(
            name = "weather.shutdown.store_in_use",
            target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
            message = "Database handle still shared at shutdown, not closing explicitly"
        ),
    }
    Ok(())
}

/// Runs once or loops until ctrl-c, depending on configuration.
async fn drive<N: Notifier>(resources: Arc<AppResources>, client: OnionooClient, notifier: N) {
    if resources.config.weather.run_once {
        run_with_fresh_directory(&resources, &client, &notifier).await;
        return;
    }

    tokio::select! {
        _ = recurring_weather_checks(resources.clone(), client, notifier) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!(
                name = "weather.shutdown",
                target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                message = "Received ctrl-c, shutting down"
            );
        }
    }
}
