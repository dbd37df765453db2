use crate::auth::{CredentialAuthority, StaticAuthority};
use crate::cli::CommandLineArgs;
use crate::error::EquipStatError;
use crate::report::{ReportRenderer, TextReportRenderer};
use crate::resource_manager::ResourceManager;
use crate::retention::{EnvelopeBackend, MemoryBackend, RetentionStore, SledBackend};

use std::sync::Arc;
use std::time::Duration;

use expanduser::expanduser;

/// Shared application state passed to each request handler.
#[derive(Debug)]
pub struct AppState {
    /// Command line arguments.
    pub args: CommandLineArgs,

    /// Resource manager.
    pub resource_manager: ResourceManager,

    /// Retained upload summaries.
    pub store: RetentionStore,

    /// Issuer and verifier of tokens.
    pub authority: Box<dyn CredentialAuthority>,

    /// Report document renderer.
    pub renderer: Box<dyn ReportRenderer>,
}

impl AppState {
    /// Create and return an [AppState].
    ///
    /// Opens the persistent store in `args.data_dir` if set, otherwise keeps summaries in memory.
    pub fn new(args: &CommandLineArgs) -> Result<Self, EquipStatError> {
        let backend: Box<dyn EnvelopeBackend> = match &args.data_dir {
            Some(data_dir) => {
                let path = expanduser(data_dir).map_err(EquipStatError::storage)?;
                tracing::info!("Persisting summaries in {}", path.display());
                Box::new(SledBackend::open(path)?)
            }
            None => Box::new(MemoryBackend::new()),
        };
        let store = RetentionStore::open(backend, args.retention_capacity)?;
        if args.users.is_empty() {
            tracing::warn!("No users configured, nobody can log in");
        }
        let authority = StaticAuthority::new(
            args.users.iter().cloned(),
            Duration::from_secs(args.access_token_ttl),
            Duration::from_secs(args.refresh_token_ttl),
        );
        Ok(Self::with_parts(
            args,
            store,
            Box::new(authority),
            Box::new(TextReportRenderer),
        ))
    }

    /// Create an [AppState] from its collaborators.
    pub fn with_parts(
        args: &CommandLineArgs,
        store: RetentionStore,
        authority: Box<dyn CredentialAuthority>,
        renderer: Box<dyn ReportRenderer>,
    ) -> Self {
        let task_limit = args
            .thread_limit
            .or_else(|| Some(num_cpus::get().saturating_sub(1).max(1)));
        let resource_manager = ResourceManager::new(args.memory_limit, task_limit);
        Self {
            args: args.clone(),
            resource_manager,
            store,
            authority,
            renderer,
        }
    }
}

/// AppState wrapped in an Atomic Reference Count (Arc) to allow multiple references.
pub type SharedAppState = Arc<AppState>;
