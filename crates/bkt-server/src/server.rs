use std::sync::Arc;

use tokio::net::TcpListener;

use bkt_store::Db;

use crate::config::ServerConfig;
use crate::csrf::CsrfGuard;
use crate::error::{ServerError, ServerResult};
use crate::metadata::bootstrap;
use crate::router::{build_router, AppState};

/// The bkt HTTP server.
pub struct BktServer {
    config: ServerConfig,
    db: Arc<Db>,
    csrf: Option<Arc<CsrfGuard>>,
}

impl BktServer {
    /// Open the database named in `config` and prepare its buckets.
    pub fn open(config: ServerConfig) -> ServerResult<Self> {
        let db = Db::open(&config.db_path)?;
        Self::with_db(config, Arc::new(db))
    }

    /// Serve an already opened database.
    pub fn with_db(config: ServerConfig, db: Arc<Db>) -> ServerResult<Self> {
        config.validate()?;
        bootstrap(&db)?;
        let csrf = config
            .csrf
            .as_ref()
            .map(CsrfGuard::from_config)
            .transpose()?
            .map(Arc::new);
        Ok(Self { config, db, csrf })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn db(&self) -> &Arc<Db> {
        &self.db
    }

    /// Build the router (useful for testing).
    pub fn router(&self) -> axum::Router {
        let state = AppState::new(Arc::clone(&self.db), self.config.max_body_size);
        build_router(state, self.csrf.clone())
    }

    /// Start serving requests.
    pub async fn serve(self) -> ServerResult<()> {
        let app = self.router();
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        tracing::info!(
            db = %self.config.db_path.display(),
            csrf = self.csrf.is_some(),
            "bkt server listening on {}",
            self.config.bind_addr
        );
        axum::serve(listener, app)
            .await
            .map_err(|e| ServerError::Internal(e.to_string()))
    }
}
