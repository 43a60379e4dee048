use clap::Subcommand;

use calsync_core::model::AccountType;
use calsync_core::providers::caldav_base_url;
use calsync_core::{oauth, provider_for, Account, SyncEngine};

use super::{CliResult, Ctx};

#[derive(Subcommand)]
pub enum AccountAction {
    /// Add an account and run its first sync
    Add {
        #[command(subcommand)]
        kind: AddKind,
    },
    /// List configured accounts
    List,
    /// Remove an account and all its data
    Remove {
        id: String,
    },
    /// Re-enable an account for syncing
    Enable {
        id: String,
    },
    /// Keep an account's data but stop syncing it
    Disable {
        id: String,
    },
}

#[derive(Subcommand)]
pub enum AddKind {
    /// Google account via OAuth (opens a browser)
    Google {
        /// Display name; defaults to the authenticated email
        #[arg(long)]
        name: Option<String>,
    },
    /// CalDAV server with basic auth (generic, or apple/outlook/samsung)
    Caldav {
        #[arg(long)]
        name: String,
        /// Account flavor: caldav, apple, outlook or samsung
        #[arg(long, default_value = "caldav")]
        provider: String,
        /// Server root; defaults to the provider's well-known URL
        #[arg(long)]
        server_url: Option<String>,
        #[arg(long)]
        username: String,
        #[arg(long)]
        app_password: String,
    },
}

pub async fn run(action: AccountAction) -> CliResult {
    let ctx = Ctx::init()?;
    match action {
        AccountAction::Add { kind } => add(&ctx, kind).await,
        AccountAction::List => list(&ctx),
        AccountAction::Remove { id } => {
            ctx.store.delete_account(&id)?;
            println!("removed account {id}");
            Ok(())
        }
        AccountAction::Enable { id } => set_enabled(&ctx, &id, true),
        AccountAction::Disable { id } => set_enabled(&ctx, &id, false),
    }
}

async fn add(ctx: &Ctx, kind: AddKind) -> CliResult {
    let account = match kind {
        AddKind::Google { name } => {
            let oauth_config = ctx.config.google_oauth()?;
            println!("Opening browser for Google authorization...");
            let tokens = oauth::authorize(&oauth_config).await?;
            let email = oauth::fetch_user_email(&oauth_config, &tokens.access_token).await;

            let mut account =
                Account::new(name.unwrap_or_else(|| email.clone()), AccountType::Google);
            account.email = email;
            account.access_token = tokens.access_token;
            account.refresh_token = tokens.refresh_token.unwrap_or_default();
            if account.refresh_token.is_empty() {
                tracing::warn!("no refresh token issued; re-authentication will be required");
            }
            account.token_expiry = tokens.expires_at;
            account
        }
        AddKind::Caldav {
            name,
            provider,
            server_url,
            username,
            app_password,
        } => {
            let kind = match AccountType::parse(&provider) {
                AccountType::Local | AccountType::Google => AccountType::CalDav,
                other => other,
            };
            let server_url = server_url
                .or_else(|| caldav_base_url(kind).map(String::from))
                .ok_or("a caldav account needs --server-url")?;
            let mut account = Account::new(name, kind);
            account.server_url = server_url;
            account.username = username;
            account.app_password = app_password;
            account
        }
    };

    ctx.store.save_account(&account)?;
    println!("added account {} ({})", account.name, account.id);

    // First sync right away so the new account has data.
    let engine = SyncEngine::new(
        ctx.store.clone(),
        ctx.config.google_oauth().ok(),
        &ctx.config.sync,
    );
    let provider = provider_for(account, ctx.config.google_oauth().ok());
    let report = engine.sync_with(provider).await;
    println!(
        "synced {} calendars, {} events",
        report.calendars_synced, report.events_synced
    );
    for failure in &report.failures {
        eprintln!("warning: {failure}");
    }
    Ok(())
}

fn list(ctx: &Ctx) -> CliResult {
    for account in ctx.store.get_all_accounts()? {
        let state = if account.enabled { "enabled" } else { "disabled" };
        let last_sync = account
            .last_sync
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "{}  {}  [{}] {}  last sync: {}",
            account.id,
            account.name,
            account.kind.as_str(),
            state,
            last_sync
        );
    }
    Ok(())
}

fn set_enabled(ctx: &Ctx, id: &str, enabled: bool) -> CliResult {
    let mut account = ctx.store.get_account(id)?;
    account.enabled = enabled;
    ctx.store.save_account(&account)?;
    println!(
        "account {} is now {}",
        account.name,
        if enabled { "enabled" } else { "disabled" }
    );
    Ok(())
}
