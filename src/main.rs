use dotenvy::dotenv;
use shuttle_runtime::SecretStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use context_gate::settings::{Settings, SECRET_KEYS};

#[shuttle_runtime::main]
async fn rocket(#[shuttle_runtime::Secrets] secrets: SecretStore) -> shuttle_rocket::ShuttleRocket {
    // Shuttle may have installed a global subscriber already, hence try_init
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,rocket=info".into());
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(env_filter))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .ok();

    // Local .env first, Shuttle secrets win when present
    dotenv().ok();
    load_secrets_to_env(&secrets);

    let settings = Settings::from_env();
    let rocket = context_gate::build_rocket(settings).map_err(|e| shuttle_runtime::Error::Custom(e.into()))?;

    Ok(rocket.into())
}

fn load_secrets_to_env(secrets: &SecretStore) {
    for key in SECRET_KEYS {
        if let Some(val) = secrets.get(key) {
            std::env::set_var(key, val);
        }
    }
}
