use axum::{
    Router,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post},
};
use common::ContentDb;
use common::auth::{Authenticator, admin_auth_middleware};
use common::blob::BlobBackend;
use common::cache::TtlCache;
use common::clock::Clock;
use common::config::{Configuration, DraftBackendKind};
use common::drafts::{DraftBackend, DraftStore, MemoryDraftBackend};
use reconciler::{BlobReconciler, DatabaseReferences, MediaSweeper};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod endpoints;
pub mod error;

pub use error::ApiError;

/// Cached `GET /cleanup-blobs` responses, keyed by listing limit.
pub type StatsCache = TtlCache<usize, serde_json::Value>;

pub trait RouterState: std::fmt::Debug + Clone + Send + Sync + 'static {
    fn config(&self) -> &Configuration;
    fn authenticator(&self) -> &Arc<Authenticator>;
    fn reconciler(&self) -> &BlobReconciler;
    fn media_sweeper(&self) -> &MediaSweeper;
    fn stats_cache(&self) -> &StatsCache;
    fn drafts(&self) -> &DraftStore;

    fn is_development(&self) -> bool {
        self.config().server.environment.is_development()
    }
}

/// Shared state for route handlers
#[derive(Clone)]
pub struct AppState {
    config: Arc<Configuration>,
    authenticator: Arc<Authenticator>,
    reconciler: Arc<BlobReconciler>,
    media_sweeper: MediaSweeper,
    stats_cache: StatsCache,
    drafts: DraftStore,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &"Configuration")
            .field("authenticator", &self.authenticator)
            .field("storage_configured", &self.reconciler.is_configured())
            .field("stats_cache", &self.stats_cache)
            .field("drafts", &self.drafts)
            .finish()
    }
}

impl AppState {
    /// Wire the services. `backend` is `None` when no storage credential is
    /// configured.
    pub fn new(
        config: Configuration,
        db: ContentDb,
        backend: Option<Arc<dyn BlobBackend>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let authenticator = Arc::new(Authenticator::new(&config.auth));

        let references = DatabaseReferences::new(db.clone(), &config.storage.public_url);
        let reconciler = BlobReconciler::new(
            backend,
            Arc::new(references),
            clock.clone(),
            &config.blob_cleanup,
        );

        let draft_backend: Arc<dyn DraftBackend> = match config.drafts.backend {
            DraftBackendKind::Database => Arc::new(db.clone()),
            DraftBackendKind::Memory => Arc::new(MemoryDraftBackend::new()),
        };
        let drafts = DraftStore::new(
            draft_backend,
            clock.clone(),
            config.drafts.debounce,
            config.drafts.ttl,
        );

        Self {
            stats_cache: TtlCache::new(config.cache.ttl, clock),
            media_sweeper: MediaSweeper::new(db),
            reconciler: Arc::new(reconciler),
            authenticator,
            drafts,
            config: Arc::new(config),
        }
    }
}

impl RouterState for AppState {
    fn config(&self) -> &Configuration {
        &self.config
    }

    fn authenticator(&self) -> &Arc<Authenticator> {
        &self.authenticator
    }

    fn reconciler(&self) -> &BlobReconciler {
        &self.reconciler
    }

    fn media_sweeper(&self) -> &MediaSweeper {
        &self.media_sweeper
    }

    fn stats_cache(&self) -> &StatsCache {
        &self.stats_cache
    }

    fn drafts(&self) -> &DraftStore {
        &self.drafts
    }
}

/// Create a new router instance with all routes configured
pub fn create_router<S: RouterState>(state: S) -> Router {
    let authenticator = state.authenticator().clone();
    let auth_layer = middleware::from_fn(move |req, next| {
        admin_auth_middleware(authenticator.clone(), req, next)
    });

    let admin = Router::new()
        .route(
            "/cleanup-blobs",
            get(endpoints::cleanup::blob_stats::<S>).post(endpoints::cleanup::cleanup_blobs::<S>),
        )
        .route(
            "/media-cleanup",
            post(endpoints::media::media_cleanup::<S>),
        )
        .merge(endpoints::drafts::router::<S>())
        .route("/logout", post(endpoints::session::logout::<S>))
        .layer(auth_layer);

    Router::new()
        // Public health check endpoint (no authentication)
        .route("/health", get(health_check))
        .merge(admin)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Basic health check endpoint
async fn health_check() -> impl IntoResponse {
    StatusCode::OK
}
