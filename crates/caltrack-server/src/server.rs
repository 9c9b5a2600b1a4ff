use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    extract::FromRef,
    middleware,
    routing::{get, post, put},
};
use caltrack_auth::{
    AccountService, AccountStorage, AuthState, Authenticator, Group, InMemoryAccountStorage,
    SessionCache, SessionConfig, SessionManager, request_id, user_auth,
};
use tokio::task::JoinHandle;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

use crate::{config::AppConfig, handlers};

/// Shared state of the HTTP application.
#[derive(Clone)]
pub struct AppState {
    pub accounts: AccountService,
    pub auth: AuthState,
    pub session: SessionManager,
}

impl AppState {
    /// Wires one session cache through the account service and the
    /// authentication middleware.
    pub fn new(storage: Arc<dyn AccountStorage>, session_config: SessionConfig) -> Self {
        let session = SessionManager::new(Arc::new(SessionCache::new()), session_config);
        let authenticator = Authenticator::new(storage.clone(), session.principals().clone());
        Self {
            accounts: AccountService::new(storage, session.clone()),
            auth: AuthState::new(authenticator, session.bindings().clone()),
            session,
        }
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

pub struct CaltrackServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
    reaper: Option<JoinHandle<()>>,
}

pub fn build_app(state: AppState, cfg: &AppConfig) -> Router {
    let body_limit = cfg.server.body_limit_bytes;

    let protected = Router::new()
        .route("/auth/signout", post(handlers::sign_out))
        .route("/users", post(handlers::create_user))
        .route("/users/me", get(handlers::me))
        .route("/users/{id}", put(handlers::update_user))
        .route("/users/{id}/password", post(handlers::reset_password))
        .route("/users/{id}/group/{group_id}", put(handlers::change_group))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            user_auth,
        ));

    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/auth/login", post(handlers::login))
        .route("/auth/signup", post(handlers::sign_up))
        .merge(protected)
        // Middleware stack (order: body limit -> compression/cors -> trace -> request id)
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    let req_id = req
                        .extensions()
                        .get::<caltrack_auth::RequestId>()
                        .map(|id| id.as_str().to_string())
                        .unwrap_or_default();
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri().path(),
                        http.status_code = Empty,
                        request_id = %req_id
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        // Outermost so the trace span sees the request id
        .layer(middleware::from_fn(request_id))
        .with_state(state)
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
    storage: Option<Arc<dyn AccountStorage>>,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
            storage: None,
        }
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Uses the given account store instead of a fresh in-memory one.
    pub fn with_storage(mut self, storage: Arc<dyn AccountStorage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub async fn build(self) -> anyhow::Result<CaltrackServer> {
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(InMemoryAccountStorage::new()));
        let state = AppState::new(storage, self.config.session.clone());

        bootstrap_admin(&state, &self.config).await?;
        let reaper = state.session.spawn_reaper();
        let app = build_app(state.clone(), &self.config);

        Ok(CaltrackServer {
            addr: self.addr,
            app,
            state,
            reaper,
        })
    }
}

/// Creates the configured admin user unless the email is already taken.
async fn bootstrap_admin(state: &AppState, cfg: &AppConfig) -> anyhow::Result<()> {
    let Some(admin) = &cfg.bootstrap.admin_user else {
        return Ok(());
    };

    if state.accounts.find_by_email(&admin.email).await?.is_some() {
        tracing::info!(email = %admin.email, "Admin user already exists");
        return Ok(());
    }

    let user = state
        .accounts
        .register(&admin.email, &admin.name, &admin.password, Group::Admin)
        .await?;
    tracing::info!(user_id = user.id, email = %user.email, "Admin user created");
    Ok(())
}

impl CaltrackServer {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Serves on an already bound listener until `shutdown` resolves.
    pub async fn serve<F>(self, listener: tokio::net::TcpListener, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tracing::info!("listening on {}", listener.local_addr()?);
        let result = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await;
        if let Some(reaper) = self.reaper {
            reaper.abort();
        }
        result?;
        Ok(())
    }
}

async fn shutdown_signal() {
    // Wait for Ctrl+C
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
