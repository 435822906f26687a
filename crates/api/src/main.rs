use anyhow::Context;

use stockor_api::settings::Settings;
use stockor_core::Configuration;
use stockor_infra::schema::{PgMigrator, migrations};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    stockor_observability::init();

    let config = Configuration::from_env();
    Configuration::install(config.clone());
    let settings = Settings::from_env()?;

    if let Some(database_url) = &settings.database_url {
        let pool = sqlx::PgPool::connect(database_url)
            .await
            .context("failed to connect to DATABASE_URL")?;
        PgMigrator::new(pool).up(&config, &migrations()).await?;
    }

    let app = stockor_api::app::build_app(settings.jwt_secret.clone());

    let addr = format!("0.0.0.0:{}", settings.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");

    axum::serve(listener, app).await?;
    Ok(())
}
