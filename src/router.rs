use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::auth::local::LocalTokenVerifier;
use crate::auth::{TokenVerifier, verifier_from_config};
use crate::config::{AuthStrategy, Config};
use crate::db::{self, AccountStorage, DocumentStorage, SqlitePool, TrackedFileStorage};
use crate::drive::DriveConnector;
use crate::drive::google::GoogleDriveConnector;
use crate::error::GatewayError;
use crate::google_oauth::state::StateSigner;
use crate::google_oauth::{GoogleOauth, OauthFlow};
use crate::handlers::{ai, auth, chat, documents, drive, health, pages};
use crate::service::{AccountService, SyncEngine};
use crate::upstream::{Processing, ProcessingClient};

/// Services that exist only when Drive OAuth is configured.
#[derive(Clone)]
pub struct DriveServices {
    pub accounts: Arc<AccountService>,
    pub sync: Arc<SyncEngine>,
}

#[derive(Clone)]
pub struct GatewayState {
    pub config: Arc<Config>,
    pub verifier: Arc<dyn TokenVerifier>,
    /// Present when `auth.strategy = local`; mints `/auth/login` tokens.
    pub local_tokens: Option<LocalTokenVerifier>,
    pub processing: Arc<dyn Processing>,
    pub documents: DocumentStorage,
    drive: Option<DriveServices>,
}

impl GatewayState {
    /// Wire the production clients from configuration.
    pub async fn from_config(config: Config) -> Result<Self, GatewayError> {
        let pool = db::connect(&config.basic.database_url).await?;
        let verifier = verifier_from_config(&config.auth, reqwest::Client::new())?;
        let processing: Arc<dyn Processing> = Arc::new(ProcessingClient::new(&config.upstream)?);

        let drive_backend = match config.drive.oauth() {
            Some(settings) => {
                let oauth: Arc<dyn OauthFlow> =
                    Arc::new(GoogleOauth::new(&settings, &config.drive)?);
                let connector: Arc<dyn DriveConnector> =
                    Arc::new(GoogleDriveConnector::new(oauth.clone(), &config.drive)?);
                Some((oauth, connector))
            }
            None => {
                info!("Drive OAuth not configured; /drive routes disabled");
                None
            }
        };

        Ok(Self::assemble(config, pool, verifier, processing, drive_backend))
    }

    /// Build the state around already constructed collaborators.
    pub fn assemble(
        config: Config,
        pool: SqlitePool,
        verifier: Arc<dyn TokenVerifier>,
        processing: Arc<dyn Processing>,
        drive_backend: Option<(Arc<dyn OauthFlow>, Arc<dyn DriveConnector>)>,
    ) -> Self {
        let local_tokens = (config.auth.strategy == AuthStrategy::Local)
            .then(|| LocalTokenVerifier::new(&config.auth.jwt_secret));

        let drive = drive_backend.map(|(oauth, connector)| {
            let files = TrackedFileStorage::new(pool.clone());
            let accounts = Arc::new(AccountService::new(
                AccountStorage::new(pool.clone()),
                files.clone(),
                oauth,
                connector,
                StateSigner::new(&config.auth.jwt_secret),
                config.drive.app_folder_name.clone(),
            ));
            let sync = Arc::new(SyncEngine::new(
                accounts.clone(),
                files,
                processing.clone(),
                config.upstream.ocr_languages.clone(),
            ));
            DriveServices { accounts, sync }
        });

        Self {
            config: Arc::new(config),
            verifier,
            local_tokens,
            processing,
            documents: DocumentStorage::new(pool),
            drive,
        }
    }

    pub fn drive(&self) -> Result<&DriveServices, GatewayError> {
        self.drive
            .as_ref()
            .ok_or(GatewayError::FeatureDisabled("Google Drive"))
    }
}

pub fn gateway_router(state: GatewayState) -> Router {
    let body_limit = state.config.basic.upload_limit_bytes;

    Router::new()
        .route("/", get(health::health))
        .route("/health", get(health::health))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        .route("/documents", post(documents::create).get(documents::list))
        .route("/documents/{id}", get(documents::get))
        .route("/drive/status", get(drive::status))
        .route("/drive/oauth2/start", get(drive::oauth_start))
        .route("/drive/oauth2/callback", get(drive::oauth_callback))
        .route("/drive/folder/init", post(drive::init_folder))
        .route("/drive/upload", post(drive::upload))
        .route("/drive/sync", post(drive::sync))
        .route("/pages/{page_id}/ocr", post(pages::ocr))
        .route(
            "/pages/{page_id}/remove-handwriting",
            post(pages::remove_handwriting),
        )
        .route("/ai/index/upsert-ocr", post(ai::upsert_ocr))
        .route("/ai/index/upsert-pdf", post(ai::upsert_pdf))
        .route("/ai/index/delete", post(ai::delete))
        .route("/ai/chat/ask", post(ai::ask))
        .route("/chat/ask", post(chat::ask))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
