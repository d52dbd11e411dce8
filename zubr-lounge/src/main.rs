use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use zubr_lounge::api::ZubrApi;
use zubr_lounge::config::{self, Cli, LoungeConfig};
use zubr_lounge::error::ApiError;
use zubr_lounge::ident::IdentRegistry;
use zubr_lounge::session::{Session, SessionSettings};
use zubr_lounge::store::{ApiStore, ConfigStore, FileStore};
use zubr_lounge::viewer::{GUEST_PREFIX, ResumeContext, ResumeDecision, ViewerHub, resume_decision};

/// Who the session runs as and where its config lives.
struct Identity {
    user: String,
    token: Option<String>,
    store: Arc<dyn ConfigStore>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Use JSON logs in production (ZUBR_LOG_JSON=1), human-readable otherwise
    let json_logs = std::env::var("ZUBR_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env().add_directive("zubr_lounge=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }

    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let lounge = LoungeConfig::load(&config_path);
    tracing::info!("Loaded settings from {}", config_path.display());

    let identity = resolve_identity(&cli, &lounge).await?;
    tracing::info!(user = %identity.user, "Starting session");

    let settings = SessionSettings {
        name: identity.user,
        token: identity.token,
        away_message: cli.away.clone(),
        lounge,
    };
    let session = Session::start(
        settings,
        Arc::new(ViewerHub::new()),
        Arc::new(IdentRegistry::new()),
        identity.store,
    )
    .await
    .context("starting session")?;

    tokio::signal::ctrl_c().await?;
    session.shutdown().await;
    Ok(())
}

async fn resolve_identity(cli: &Cli, lounge: &LoungeConfig) -> Result<Identity> {
    let data_dir = cli.data_dir.clone().unwrap_or_else(config::data_dir);

    if cli.local {
        let Some(ref user) = cli.user else {
            bail!("--user is required with --local");
        };
        return Ok(Identity {
            user: user.clone(),
            token: None,
            store: Arc::new(FileStore::for_user(&data_dir, user)),
        });
    }

    let api = ZubrApi::new(lounge.zubr_server.url.clone());
    let mut ctx = ResumeContext {
        stored_user: cli.user.as_deref(),
        has_token: cli.token.is_some(),
        public_instance: lounge.zubr_server.public,
        rejected: false,
    };

    loop {
        match resume_decision(ctx) {
            ResumeDecision::StoredCredentials => {
                let token = cli.token.clone().unwrap_or_default();
                match api.verify_token(&token).await {
                    Ok(user) => {
                        return Ok(Identity {
                            user,
                            store: Arc::new(ApiStore::new(api, token.clone())),
                            token: Some(token),
                        });
                    }
                    Err(ApiError::Unauthorized) => {
                        tracing::warn!("Stored token was rejected");
                        ctx.rejected = true;
                    }
                    Err(e) => return Err(e).context("verifying stored token"),
                }
            }
            ResumeDecision::Guest => {
                let user = format!("{GUEST_PREFIX}{}", &uuid::Uuid::new_v4().simple().to_string()[..8]);
                tracing::info!(%user, "Starting guest session");
                return Ok(Identity {
                    store: Arc::new(FileStore::for_user(&data_dir, &user)),
                    user,
                    token: None,
                });
            }
            ResumeDecision::SignIn => {
                let (Some(user), Some(password)) = (cli.user.as_deref(), cli.password.as_deref()) else {
                    bail!("sign-in required: pass --user and --password");
                };
                let login = api.login(user, password).await.context("signing in")?;
                return Ok(Identity {
                    user: login.username,
                    store: Arc::new(ApiStore::new(api, login.token.clone())),
                    token: Some(login.token),
                });
            }
        }
    }
}
