//! Application state wiring all services together.
//!
//! The core service and supervisor are generic over the repository traits;
//! AppState pins them to the SQLite implementations.

use std::path::PathBuf;
use std::sync::Arc;

use relay_core::engine::supervisor::Supervisor;
use relay_core::handler::registry::HandlerRegistry;
use relay_core::service::workflow::WorkflowService;
use relay_infra::config::load_global_config;
use relay_infra::filesystem::{ensure_data_dir, resolve_data_dir};
use relay_infra::integrations::{build_http_client, register_all};
use relay_infra::sqlite::credential::SqliteCredentialRepository;
use relay_infra::sqlite::pool::{DatabasePool, database_url};
use relay_infra::sqlite::reaction_output::SqliteReactionOutputRepository;
use relay_infra::sqlite::workflow::SqliteWorkflowRepository;
use relay_types::config::GlobalConfig;

/// Concrete type aliases for the generics pinned to infra implementations.
pub type ConcreteWorkflowService = WorkflowService<
    SqliteWorkflowRepository,
    SqliteCredentialRepository,
    SqliteReactionOutputRepository,
>;

pub type ConcreteSupervisor = Supervisor<
    SqliteWorkflowRepository,
    SqliteCredentialRepository,
    SqliteReactionOutputRepository,
>;

/// Whether this process runs workflow cycles or only edits the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `relay serve`: a supervisor is attached to the service.
    Supervised,
    /// Every other command.
    StoreOnly,
}

/// Shared application state used by the CLI commands.
#[derive(Clone)]
pub struct AppState {
    pub workflow_service: Arc<ConcreteWorkflowService>,
    pub credentials: Arc<SqliteCredentialRepository>,
    pub registry: Arc<HandlerRegistry>,
    pub config: GlobalConfig,
    pub data_dir: PathBuf,
}

impl AppState {
    /// Initialize the application state in the resolved data directory.
    pub async fn init(mode: Mode) -> anyhow::Result<Self> {
        Self::init_in(resolve_data_dir(), mode).await
    }

    /// Load config, open the database, build the handler registry and wire
    /// the workflow service.
    pub async fn init_in(data_dir: PathBuf, mode: Mode) -> anyhow::Result<Self> {
        ensure_data_dir(&data_dir).await?;
        let config = load_global_config(&data_dir).await;

        let db_pool = DatabasePool::new(&database_url(&data_dir)).await?;
        let workflows = Arc::new(SqliteWorkflowRepository::new(db_pool.clone()));
        let credentials = Arc::new(SqliteCredentialRepository::new(db_pool.clone()));
        let outputs = Arc::new(SqliteReactionOutputRepository::new(db_pool));

        let http = build_http_client(config.http_timeout())?;
        let mut builder = HandlerRegistry::builder();
        register_all(&mut builder, &config.integrations, &http);
        let registry = Arc::new(builder.build());

        let mut service = WorkflowService::new(
            Arc::clone(&workflows),
            Arc::clone(&credentials),
            Arc::clone(&outputs),
            Arc::clone(&registry),
        );
        if mode == Mode::Supervised {
            let supervisor = Supervisor::new(
                workflows,
                Arc::clone(&credentials),
                outputs,
                Arc::clone(&registry),
                config.poll_interval(),
            );
            service = service.with_supervisor(Arc::new(supervisor));
        }

        tracing::debug!(
            data_dir = %data_dir.display(),
            handlers = registry.len(),
            supervised = mode == Mode::Supervised,
            "application state ready"
        );

        Ok(Self {
            workflow_service: Arc::new(service),
            credentials,
            registry,
            config,
            data_dir,
        })
    }

    pub fn supervisor(&self) -> Option<&Arc<ConcreteSupervisor>> {
        self.workflow_service.supervisor()
    }
}
