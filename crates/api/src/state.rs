//! Process-scoped application state.
//!
//! Everything that used to be ambient (signing key, SSO clients, template
//! engine, pools) is constructed exactly once here and injected into
//! handlers through axum state.

use std::sync::Arc;

use redis::aio::ConnectionManager;
use sqlx::PgPool;

use coffer_auth::TokenSigner;
use coffer_infra::{
    connect_pool, connect_redis, AuditLog, AutomatedEmailsRepository, FileBucket, SsoKeyCache,
    TokenRepository, TransactionsRepository, UserCache, UserRepository,
};
use coffer_mail::{EmailGenerator, Mailer, SesMailer};
use coffer_sso::{AppleSso, GoogleClientIds};

use crate::config::Settings;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub db: PgPool,
    pub redis: ConnectionManager,
    pub signer: Arc<TokenSigner>,
    pub mailer: Arc<dyn Mailer>,
    pub templates: Arc<EmailGenerator>,
    pub apple: Option<Arc<AppleSso>>,
    pub google_client_ids: Arc<GoogleClientIds>,
    pub sso_keys: SsoKeyCache,
    pub bucket: FileBucket,
}

impl AppState {
    pub async fn initialize(settings: Settings) -> anyhow::Result<Self> {
        let db = connect_pool(&settings.database_url).await?;
        let redis = connect_redis(&settings.redis_url).await?;

        let signer = Arc::new(TokenSigner::from_files(
            &settings.jwt_signing_key,
            &settings.jwt_public_key,
        )?);

        let mailer: Arc<dyn Mailer> = Arc::new(SesMailer::new(
            settings.ses_region.clone(),
            settings.ses_api_key.clone(),
            settings.ses_api_secret.clone(),
            settings.smtp_email.clone(),
            settings.friendly_from.clone(),
        ));

        let templates = Arc::new(EmailGenerator::new(
            settings.template_dir.clone(),
            &settings.email_tagline,
            &settings.base_app_url,
        ));

        // Apple Sign-In is optional per deployment; without a key the
        // /sso/apple surface reports an integration failure.
        let apple = match std::fs::read(&settings.apple_sso_key_path) {
            Ok(pem) => Some(Arc::new(AppleSso::new(
                settings.apple_team_id.clone(),
                settings.apple_services_id.clone(),
                settings.apple_sso_key_id.clone(),
                &pem,
            )?)),
            Err(e) => {
                tracing::warn!(
                    path = %settings.apple_sso_key_path,
                    "apple sso disabled, signing key unavailable: {e}"
                );
                None
            }
        };

        let google_client_ids = Arc::new(GoogleClientIds::load(
            &settings.google_client_id,
            &settings.google_client_ids_file,
        ));

        let sso_keys = SsoKeyCache::new(redis.clone());
        let bucket = FileBucket::new(settings.bucket_storage.clone());

        Ok(Self {
            settings: Arc::new(settings),
            db,
            redis,
            signer,
            mailer,
            templates,
            apple,
            google_client_ids,
            sso_keys,
            bucket,
        })
    }

    // Repositories are cheap handles over the shared pool.

    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.db.clone())
    }

    pub fn tokens(&self) -> TokenRepository {
        TokenRepository::new(self.db.clone())
    }

    pub fn transactions(&self) -> TransactionsRepository {
        TransactionsRepository::new(self.db.clone())
    }

    pub fn automated_emails(&self) -> AutomatedEmailsRepository {
        AutomatedEmailsRepository::new(self.db.clone(), self.settings.environment.clone())
    }

    pub fn user_cache(&self) -> UserCache {
        UserCache::new(self.redis.clone())
    }

    pub fn audit(&self) -> AuditLog {
        AuditLog::new(self.db.clone())
    }
}
