use actix_cors::Cors;
use actix_web::{middleware::Compress, web, App, HttpServer};
use std::sync::Arc;
use tracing::{error, info, warn, Level};
use tracing_actix_web::TracingLogger;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi; // bring trait into scope for ApiDoc::openapi()
use utoipa_swagger_ui::SwaggerUi;

use anonboard::openapi::ApiDoc;
use anonboard::repo::Repo;
use anonboard::storage::build_blob_store;
use anonboard::{config, AppConfig, AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load .env automatically only in debug builds; production sets the environment externally.
    if cfg!(debug_assertions) {
        let _ = dotenv::dotenv();
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let app_config = match AppConfig::from_env() {
        Ok(c) => Arc::new(c),
        Err(e) => fatal(&format!("invalid configuration: {e}")),
    };
    info!("Bootstrapping anonboard server");
    info!("Blob public URL: {}", app_config.blob_public_url);

    let repo = match build_repo(&app_config).await {
        Ok(r) => r,
        Err(e) => fatal(&format!("repository setup failed: {e:#}")),
    };
    let blob_store = match build_blob_store(&app_config.s3).await {
        Ok(s) => s,
        Err(e) => fatal(&format!("blob store setup failed: {e:#}")),
    };

    let state = web::Data::new(AppState { repo, blob_store, config: app_config.clone() });
    let openapi = ApiDoc::openapi();
    info!("OpenAPI spec generated");

    let cors_origins = app_config.cors_origins.clone();
    let server = HttpServer::new(move || {
        let cors = {
            let mut c = Cors::default()
                .allow_any_header()
                .allowed_methods(["GET", "POST", "OPTIONS"])
                .max_age(3600);
            if cors_origins.is_empty() {
                // local Vite dev server
                c = c.allowed_origin("http://localhost:5173").allowed_origin("http://127.0.0.1:5173");
            }
            for origin in &cors_origins {
                c = c.allowed_origin(origin);
            }
            c
        };

        App::new()
            .wrap(TracingLogger::default())
            .wrap(Compress::default())
            .wrap(cors)
            .app_data(state.clone())
            .configure(config)
            .service(SwaggerUi::new("/docs/{_:.*}").url("/docs/openapi.json", openapi.clone()))
    })
    .bind(app_config.bind_addr.as_str())?;

    info!("Listening on http://{}", app_config.bind_addr);
    server.run().await
}

/// Postgres when `DATABASE_URL` is set, otherwise the in-memory store.
async fn build_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    #[cfg(feature = "postgres-store")]
    if let Some(url) = cfg.database_url.as_deref() {
        use sqlx::postgres::PgPoolOptions;
        let pool = PgPoolOptions::new()
            .max_connections(cfg.db_max_connections)
            .connect(url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Using Postgres repository backend (max {} connections)", cfg.db_max_connections);
        return Ok(Arc::new(anonboard::repo::pg::PgRepo::new(pool)));
    }

    fallback_repo(cfg)
}

#[cfg(feature = "inmem-store")]
fn fallback_repo(cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    if cfg.database_url.is_some() {
        warn!("DATABASE_URL is set but postgres-store is disabled; ignoring it");
    } else {
        warn!("DATABASE_URL not set; using in-memory repository (data is lost on restart)");
    }
    Ok(Arc::new(anonboard::repo::inmem::InMemRepo::new()))
}

#[cfg(not(feature = "inmem-store"))]
fn fallback_repo(_cfg: &AppConfig) -> anyhow::Result<Arc<dyn Repo>> {
    Err(anyhow::anyhow!("DATABASE_URL must be set when the in-memory store is disabled"))
}

fn fatal(msg: &str) -> ! {
    error!("{msg}");
    eprintln!("{msg}");
    std::process::exit(1);
}
