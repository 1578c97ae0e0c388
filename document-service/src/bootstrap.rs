// Wiring of tuple store, engine and facade from settings
use crate::{
    error::BootstrapError,
    settings::{ServiceConfig, StorageBackend, StorageConfig},
};
use document_authz::{
    repository::{InMemoryTupleStore, PostgresTupleStore, TupleStore},
    AuthorizationEngine, PermissionFacade,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Open a PostgreSQL tuple store from the storage settings.
///
/// # Errors
///
/// `InvalidConfig` without a database URL, `Database` if the pool cannot connect.
pub async fn connect_postgres(
    storage: &StorageConfig,
) -> Result<PostgresTupleStore, BootstrapError> {
    let url = storage.database_url.as_deref().ok_or_else(|| {
        BootstrapError::InvalidConfig("storage.database_url is not set".to_string())
    })?;

    let pool = PgPoolOptions::new()
        .max_connections(storage.max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .connect(url)
        .await?;

    info!("Tuple store connection pool created");
    Ok(PostgresTupleStore::new(pool))
}

/// # Errors
///
/// See [`connect_postgres`].
pub async fn connect_store(storage: &StorageConfig) -> Result<Arc<dyn TupleStore>, BootstrapError> {
    match storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory tuple store");
            Ok(Arc::new(InMemoryTupleStore::new()))
        }
        StorageBackend::Postgres => Ok(Arc::new(connect_postgres(storage).await?)),
    }
}

/// Build the permission facade the composing application hands to its handlers.
///
/// # Errors
///
/// See [`connect_postgres`].
pub async fn build_facade(config: &ServiceConfig) -> Result<PermissionFacade, BootstrapError> {
    let store = connect_store(&config.storage).await?;
    let engine = AuthorizationEngine::new(store).with_settings(config.authz.clone());
    Ok(PermissionFacade::new(Arc::new(engine)))
}
