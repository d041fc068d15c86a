//! gk: ghostkeys command-line client
//!
//! Offline commands edit the local store only:
//!   identity new|import|list|switch|show
//!   vault new|list|rename|status
//!   cell, row, column, grid, note, login
//!
//! Network commands talk to the custody service:
//!   sync [<vault>]       - push unsynced changes (all vaults by default)
//!   pull <vault>         - replace the local copy with the remote one
//!   import               - fetch every remote vault of the active identity
//!   clear-remote         - delete every vault of the active identity
//!   vault delete|transfer - drop the remote copy, then act locally

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, warn};

use gk_core::config::GkConfig;
use gk_core::{CellKey, GkResult, Profile, Vault, VaultData};
use gk_crypto::Identity;
use gk_store::{RecordStore, StoreBackend};
use gk_sync::profiles::{self, IdentityParams};
use gk_sync::vaults;
use gk_sync::{Confirmation, FileRemote, SyncEngine, SyncOptions};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "gk",
    version,
    about = "ghostkeys client",
    long_about = "gk: keep logins, notes, and a secret grid in local vaults and sync them, encrypted, to a custody service"
)]
struct Cli {
    /// Path to the configuration file (default: ~/.config/ghostkeys/config.toml)
    #[arg(long, short = 'c', env = "GK_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); overrides the config
    #[arg(long, env = "GK_LOG", global = true)]
    log: Option<String>,

    /// Log format; overrides the config
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Prompt for the BIP-39 passphrase used when the identity was created
    #[arg(long, global = true)]
    passphrase: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Identity profiles (mnemonic-derived)
    Identity {
        #[command(subcommand)]
        action: IdentityAction,
    },

    /// Vault management
    Vault {
        #[command(subcommand)]
        action: VaultAction,
    },

    /// Single grid cells
    Cell {
        #[command(subcommand)]
        action: CellAction,
    },

    /// Grid rows
    Row {
        #[command(subcommand)]
        action: RowAction,
    },

    /// Grid column names and visibility
    Column {
        #[command(subcommand)]
        action: ColumnAction,
    },

    /// Whole-grid display, CSV/TSV import and export
    Grid {
        #[command(subcommand)]
        action: GridAction,
    },

    /// Free-text secure notes
    Note {
        #[command(subcommand)]
        action: NoteAction,
    },

    /// Login sites and their credentials
    Login {
        #[command(subcommand)]
        action: LoginAction,
    },

    /// Push unsynced changes to the custody service
    Sync {
        /// Vault name or id (default: every vault of the active identity)
        vault: Option<String>,
    },

    /// Replace the local copy of a vault with the remote one
    Pull {
        vault: String,
        /// Discard unsynced local changes
        #[arg(long)]
        yes: bool,
    },

    /// Fetch every remote vault of the active identity
    Import,

    /// Delete every vault of the active identity, remotely and locally
    #[command(name = "clear-remote")]
    ClearRemote {
        #[arg(long)]
        yes: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum IdentityAction {
    /// Generate a new mnemonic and make it the active identity
    New,
    /// Restore an identity from its 12-word mnemonic
    Import {
        /// Read the mnemonic from stdin instead of prompting
        #[arg(long)]
        stdin: bool,
    },
    /// List stored identities
    List,
    /// Make another stored identity active
    Switch {
        /// User id or principal
        user: String,
        /// Leave unsynced vaults of the current identity behind
        #[arg(long)]
        yes: bool,
    },
    /// Show the active identity
    Show {
        /// Also print the mnemonic
        #[arg(long)]
        reveal: bool,
    },
}

#[derive(Subcommand, Debug)]
enum VaultAction {
    /// Create an empty vault
    New { name: String },
    /// List vaults of the active identity
    List,
    Rename { vault: String, name: String },
    /// Delete a vault locally and, if it was ever synced, remotely
    Delete {
        vault: String,
        #[arg(long)]
        yes: bool,
    },
    /// Hand a vault to another stored identity
    Transfer {
        vault: String,
        /// User id or principal of the new owner
        to: String,
        #[arg(long)]
        yes: bool,
    },
    /// Sync state of one or all vaults
    Status { vault: Option<String> },
}

#[derive(Subcommand, Debug)]
enum CellAction {
    /// Set a cell; an empty value clears it
    Set {
        vault: String,
        /// Cell as `row,col`
        key: CellKey,
        value: String,
    },
    Get { vault: String, key: CellKey },
    /// Clear the rectangle spanned by two cells
    Clear {
        vault: String,
        from: CellKey,
        to: Option<CellKey>,
    },
}

#[derive(Subcommand, Debug)]
enum RowAction {
    /// Insert an empty row, shifting rows below down
    Insert { vault: String, at: u32 },
    /// Delete rows, shifting rows below up
    Delete {
        vault: String,
        start: u32,
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
}

#[derive(Subcommand, Debug)]
enum ColumnAction {
    /// Show columns that differ from the default
    List { vault: String },
    Set {
        vault: String,
        index: u32,
        #[arg(long, default_value = "")]
        name: String,
        #[arg(long)]
        hidden: bool,
    },
    /// Restore the default name and visibility
    Reset { vault: String, index: u32 },
    /// Clear every cell in a run of columns
    Clear {
        vault: String,
        start: u32,
        #[arg(long, default_value_t = 1)]
        count: u32,
    },
}

#[derive(Subcommand, Debug)]
enum GridAction {
    /// Print the used part of the grid
    Show {
        vault: String,
        /// Include hidden columns
        #[arg(long)]
        all: bool,
    },
    /// Paste CSV or TSV from a file (`-` for stdin)
    Import {
        vault: String,
        file: PathBuf,
        /// Top-left cell of the paste
        #[arg(long, default_value = "0,0")]
        at: CellKey,
    },
    /// Print a rectangle as TSV
    Export {
        vault: String,
        from: CellKey,
        to: CellKey,
    },
    /// Clear every cell
    Clear {
        vault: String,
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand, Debug)]
enum NoteAction {
    List { vault: String },
    Show { vault: String, slot: u32 },
    Add {
        vault: String,
        title: String,
        /// Note body (read from stdin when omitted)
        #[arg(long)]
        body: Option<String>,
    },
    Edit {
        vault: String,
        slot: u32,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        body: Option<String>,
    },
    Remove { vault: String, slot: u32 },
}

#[derive(Subcommand, Debug)]
enum LoginAction {
    /// List sites and their logins
    List {
        vault: String,
        /// Print passwords
        #[arg(long)]
        reveal: bool,
    },
    #[command(name = "add-site")]
    AddSite { vault: String, name: String },
    #[command(name = "rename-site")]
    RenameSite { vault: String, site: u32, name: String },
    #[command(name = "remove-site")]
    RemoveSite { vault: String, site: u32 },
    /// Add a credential to a site (password is prompted)
    Add {
        vault: String,
        site: u32,
        login: String,
    },
    /// Replace a credential (password is prompted)
    Update {
        vault: String,
        site: u32,
        index: usize,
        login: String,
    },
    Remove {
        vault: String,
        site: u32,
        index: usize,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);
    let config = load_config(&config_path).await?;

    let level = cli.log.clone().unwrap_or_else(|| config.logging.level.clone());
    let format = cli.log_format.clone().unwrap_or(match config.logging.format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(&level, &format);
    check_config_file(&config, &config_path);

    if let Commands::Config { action: ConfigAction::Show } = cli.command {
        return cmd_config_show(&config, &config_path);
    }

    let mut params = IdentityParams::from_config(&config.crypto);
    if cli.passphrase {
        let passphrase =
            rpassword::prompt_password("Passphrase: ").context("reading passphrase")?;
        params = params.with_passphrase(passphrase);
    }
    let app = App::open(config, params)?;

    match cli.command {
        Commands::Identity { action } => cmd_identity(&app, action),
        Commands::Vault { action } => cmd_vault(&app, action).await,
        Commands::Cell { action } => cmd_cell(&app, action),
        Commands::Row { action } => cmd_row(&app, action),
        Commands::Column { action } => cmd_column(&app, action),
        Commands::Grid { action } => cmd_grid(&app, action),
        Commands::Note { action } => cmd_note(&app, action),
        Commands::Login { action } => cmd_login(&app, action),
        Commands::Sync { vault } => cmd_sync(&app, vault.as_deref()).await,
        Commands::Pull { vault, yes } => cmd_pull(&app, &vault, yes.into()).await,
        Commands::Import => cmd_import(&app).await,
        Commands::ClearRemote { yes } => cmd_clear_remote(&app, yes).await,
        Commands::Config { .. } => Ok(()),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stdout carries command output; logs go to stderr
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ghostkeys")
        .join("config.toml")
}

async fn load_config(path: &Path) -> Result<GkConfig> {
    if path.exists() {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("reading config: {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing config: {}", path.display()))
    } else {
        Ok(GkConfig::default())
    }
}

/// Logged after the subscriber is up, so these are not lost.
fn check_config_file(config: &GkConfig, path: &Path) {
    if !path.exists() {
        debug!(path = %path.display(), "config file not found, using defaults");
        return;
    }
    #[cfg(unix)]
    if config.config_file_mode_check {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = std::fs::metadata(path) {
            if meta.permissions().mode() & 0o004 != 0 {
                warn!(path = %path.display(), "config file is world-readable");
            }
        }
    }
    #[cfg(not(unix))]
    let _ = config;
}

/// Expand `~` in path to the user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

// ── Shared state ──────────────────────────────────────────────────────────────

struct App {
    config: GkConfig,
    params: IdentityParams,
    store: Arc<Mutex<StoreBackend>>,
}

impl App {
    fn open(config: GkConfig, params: IdentityParams) -> Result<Self> {
        let store_path = expand_tilde(&config.store.path);
        let store = StoreBackend::open(&store_path)
            .with_context(|| format!("opening local store: {}", store_path.display()))?;
        debug!(path = %store_path.display(), backend = store.kind(), "opened local store");
        Ok(Self {
            config,
            params,
            store: Arc::new(Mutex::new(store)),
        })
    }

    fn store(&self) -> Result<MutexGuard<'_, StoreBackend>> {
        self.store
            .lock()
            .map_err(|_| anyhow::anyhow!("local store lock poisoned"))
    }

    fn engine(&self) -> Result<SyncEngine<StoreBackend>> {
        let remote_path = expand_tilde(&self.config.remote.path);
        let remote = FileRemote::open(&remote_path)
            .with_context(|| format!("opening custody service: {}", remote_path.display()))?;
        Ok(SyncEngine::new(
            Arc::clone(&self.store),
            Arc::new(remote),
            SyncOptions::from(&self.config.sync),
        ))
    }

    /// The active profile, without deriving its keys.
    fn active_profile(&self) -> Result<Profile> {
        self.store()?
            .active_profile()?
            .context("no active identity; run `gk identity new` or `gk identity import`")
    }

    fn unlock(&self) -> Result<(Profile, Identity)> {
        let store = self.store()?;
        if store.active_profile()?.is_none() {
            anyhow::bail!("no active identity; run `gk identity new` or `gk identity import`");
        }
        profiles::unlock_active(&*store, &self.params).context("unlocking active identity")
    }

    fn vault(&self, wanted: &str) -> Result<Vault> {
        let profile = self.active_profile()?;
        find_vault(&*self.store()?, &profile.user_id, wanted)
    }

    /// Apply an offline edit to a vault of the active identity.
    fn edit<T>(&self, wanted: &str, f: impl FnOnce(&mut VaultData) -> GkResult<T>) -> Result<T> {
        let vault = self.vault(wanted)?;
        let out = self
            .store()?
            .update_vault(&vault.vault_id, |v| v.edit(f))
            .with_context(|| format!("editing vault '{}'", vault.vault_name))?;
        Ok(out)
    }
}

/// Match by vault id first, then by exact name.
fn find_vault<S: RecordStore>(store: &S, user_id: &str, wanted: &str) -> Result<Vault> {
    let vaults = store.list_vaults(user_id)?;
    if let Some(v) = vaults.iter().find(|v| v.vault_id == wanted) {
        return Ok(v.clone());
    }
    let named: Vec<&Vault> = vaults
        .iter()
        .filter(|v| v.vault_name == wanted.trim())
        .collect();
    match named.as_slice() {
        [v] => Ok((*v).clone()),
        [] => anyhow::bail!("no vault named '{wanted}' (see `gk vault list`)"),
        _ => anyhow::bail!("several vaults are named '{wanted}'; use the vault id"),
    }
}

/// Match a stored profile by user id or principal.
fn find_profile<S: RecordStore>(store: &S, wanted: &str) -> Result<Profile> {
    store
        .list_profiles()?
        .into_iter()
        .find(|p| p.user_id == wanted || p.principal == wanted)
        .with_context(|| format!("no stored identity matches '{wanted}' (see `gk identity list`)"))
}

// ── Progress helpers ──────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

// ── `gk identity` ─────────────────────────────────────────────────────────────

fn cmd_identity(app: &App, action: IdentityAction) -> Result<()> {
    match action {
        IdentityAction::New => {
            let (profile, _) = profiles::create_profile(&mut *app.store()?, &app.params)
                .context("creating identity")?;
            println!("Created identity {}", profile.user_id);
            println!();
            println!("Write down these words. They are the only way to recover this identity:");
            println!();
            println!("  {}", profile.seed_phrase);
        }
        IdentityAction::Import { stdin } => {
            let phrase = if stdin {
                let mut line = String::new();
                std::io::stdin()
                    .read_line(&mut line)
                    .context("reading mnemonic from stdin")?;
                line
            } else {
                rpassword::prompt_password("Mnemonic (12 words): ").context("reading mnemonic")?
            };
            let (profile, _) = profiles::import_profile(&mut *app.store()?, &phrase, &app.params)
                .context("importing identity")?;
            println!("Active identity: {}", profile.user_id);
        }
        IdentityAction::List => {
            let all = profiles::list_profiles(&*app.store()?)?;
            if all.is_empty() {
                println!("No identities. Run `gk identity new` or `gk identity import`.");
            }
            for profile in all {
                let marker = if profile.active { "*" } else { " " };
                println!("{marker} {}", profile.user_id);
            }
        }
        IdentityAction::Switch { user, yes } => {
            let mut store = app.store()?;
            let target = find_profile(&*store, &user)?;
            profiles::switch_profile(&mut *store, &target.user_id, yes.into())
                .context("switching identity (use --yes to leave unsynced vaults behind)")?;
            println!("Active identity: {}", target.user_id);
        }
        IdentityAction::Show { reveal } => {
            let profile = app.active_profile()?;
            println!("user id:    {}", profile.user_id);
            println!("principal:  {}", profile.principal);
            println!("created:    {}", profile.created_at);
            if reveal {
                println!("mnemonic:   {}", profile.seed_phrase);
            }
        }
    }
    Ok(())
}

// ── `gk vault` ────────────────────────────────────────────────────────────────

async fn cmd_vault(app: &App, action: VaultAction) -> Result<()> {
    match action {
        VaultAction::New { name } => {
            let (_, identity) = app.unlock()?;
            let vault = vaults::create_vault(&mut *app.store()?, &identity, &name)
                .context("creating vault")?;
            println!("Created vault '{}'", vault.vault_name);
            println!("  id: {}", vault.vault_id);
        }
        VaultAction::List => {
            let profile = app.active_profile()?;
            let all = vaults::list_vaults(&*app.store()?, &profile.user_id)?;
            if all.is_empty() {
                println!("No vaults. Run `gk vault new <name>` or `gk import`.");
            }
            for vault in all {
                let state = if vault.synced && vault.exists_remotely {
                    "synced"
                } else {
                    "unsynced"
                };
                println!("{:<24} {:<9} {}", vault.vault_name, state, vault.vault_id);
            }
        }
        VaultAction::Rename { vault, name } => {
            let current = app.vault(&vault)?;
            vaults::rename_vault(&mut *app.store()?, &current.vault_id, &name)
                .context("renaming vault")?;
            println!("Renamed '{}' to '{}'", current.vault_name, name.trim());
        }
        VaultAction::Delete { vault, yes } => {
            let (_, identity) = app.unlock()?;
            let target = app.vault(&vault)?;
            vaults::ensure_can_leave(&target, yes.into())
                .context("deleting vault (use --yes to discard unsynced changes)")?;
            let engine = app.engine()?;
            let pb = make_spinner("delete");
            pb.set_message(target.vault_name.clone());
            let result = engine.delete_vault(&identity, &target.vault_id).await;
            pb.finish_and_clear();
            result.with_context(|| format!("deleting vault '{}'", target.vault_name))?;
            println!("Deleted vault '{}'", target.vault_name);
        }
        VaultAction::Transfer { vault, to, yes } => {
            let (_, identity) = app.unlock()?;
            let target = app.vault(&vault)?;
            let new_owner = find_profile(&*app.store()?, &to)?;
            let engine = app.engine()?;
            let pb = make_spinner("transfer");
            pb.set_message(target.vault_name.clone());
            let result = engine
                .transfer_vault(&identity, &target.vault_id, &new_owner.user_id, yes.into())
                .await;
            pb.finish_and_clear();
            let moved =
                result.context("transferring vault (use --yes to move unsynced changes)")?;
            println!("Transferred '{}' to {}", moved.vault_name, moved.owner);
            println!("Switch to that identity and run `gk sync` to upload it.");
        }
        VaultAction::Status { vault } => {
            let profile = app.active_profile()?;
            let targets = match vault {
                Some(v) => vec![app.vault(&v)?],
                None => vaults::list_vaults(&*app.store()?, &profile.user_id)?,
            };
            for vault in &targets {
                print_status(&gk_sync::engine::status_of(vault));
            }
        }
    }
    Ok(())
}

fn print_status(status: &gk_sync::VaultStatus) {
    println!("{} ({})", status.vault_name, status.vault_id);
    println!(
        "  state:      {}",
        match (status.synced, status.exists_remotely) {
            (true, true) => "synced",
            (_, false) => "never synced",
            (false, true) => "local changes",
        }
    );
    println!("  revision:   {}", status.remote_revision);
    println!(
        "  pending:    {} records ({} deletions)",
        status.pending_changes, status.pending_tombstones
    );
    if status.unreadable > 0 {
        println!("  unreadable: {} records failed to decrypt", status.unreadable);
    }
}

// ── Grid editing ──────────────────────────────────────────────────────────────

fn cmd_cell(app: &App, action: CellAction) -> Result<()> {
    match action {
        CellAction::Set { vault, key, value } => {
            app.edit(&vault, |d| {
                d.set_cell(key, value);
                Ok(())
            })?;
        }
        CellAction::Get { vault, key } => {
            let vault = app.vault(&vault)?;
            if let Some(value) = vault.data.cell(key) {
                println!("{value}");
            }
        }
        CellAction::Clear { vault, from, to } => {
            app.edit(&vault, |d| {
                d.clear_range(from, to.unwrap_or(from));
                Ok(())
            })?;
        }
    }
    Ok(())
}

fn cmd_row(app: &App, action: RowAction) -> Result<()> {
    match action {
        RowAction::Insert { vault, at } => app.edit(&vault, |d| d.insert_row(at)),
        RowAction::Delete { vault, start, count } => {
            app.edit(&vault, |d| d.delete_rows(start, count))
        }
    }
}

fn cmd_column(app: &App, action: ColumnAction) -> Result<()> {
    match action {
        ColumnAction::List { vault } => {
            let vault = app.vault(&vault)?;
            for (index, meta) in &vault.data.columns {
                if meta.is_default() {
                    continue;
                }
                let hidden = if meta.hidden { " (hidden)" } else { "" };
                println!("{index:>3}  {}{hidden}", meta.display_name(*index));
            }
            Ok(())
        }
        ColumnAction::Set {
            vault,
            index,
            name,
            hidden,
        } => app.edit(&vault, |d| {
            d.set_column(index, &name, hidden);
            Ok(())
        }),
        ColumnAction::Reset { vault, index } => app.edit(&vault, |d| {
            d.reset_column(index);
            Ok(())
        }),
        ColumnAction::Clear { vault, start, count } => app.edit(&vault, |d| {
            d.clear_columns(start, count);
            Ok(())
        }),
    }
}

fn cmd_grid(app: &App, action: GridAction) -> Result<()> {
    match action {
        GridAction::Show { vault, all } => {
            let vault = app.vault(&vault)?;
            print!("{}", render_grid(&vault.data, all));
        }
        GridAction::Import { vault, file, at } => {
            let text = read_input(&file)?;
            let written = app.edit(&vault, |d| gk_core::grid::import_delimited(d, &text, at))?;
            println!("Imported {written} fields at {at}");
        }
        GridAction::Export { vault, from, to } => {
            let vault = app.vault(&vault)?;
            print!("{}", gk_core::grid::export_range(&vault.data, from, to)?);
        }
        GridAction::Clear { vault, yes } => {
            if !yes {
                anyhow::bail!("this clears every cell of '{vault}'; pass --yes to confirm");
            }
            app.edit(&vault, |d| {
                d.clear_all();
                Ok(())
            })?;
        }
    }
    Ok(())
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("reading stdin")?;
        Ok(text)
    } else {
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
    }
}

const GRID_CELL_WIDTH: usize = 16;

/// Plain-text table of the bounding box of all live cells.
fn render_grid(data: &VaultData, include_hidden: bool) -> String {
    let live: Vec<CellKey> = data
        .cells
        .iter()
        .filter(|(_, v)| !v.is_empty())
        .map(|(k, _)| *k)
        .collect();
    let (Some(max_row), Some(max_col)) = (
        live.iter().map(|k| k.row).max(),
        live.iter().map(|k| k.col).max(),
    ) else {
        return "(empty grid)\n".to_string();
    };

    let columns: Vec<u32> = (0..=max_col)
        .filter(|c| include_hidden || !data.column(*c).hidden)
        .collect();
    let fit = |s: &str| -> String {
        let mut out: String = s.chars().take(GRID_CELL_WIDTH).collect();
        if s.chars().count() > GRID_CELL_WIDTH {
            out.pop();
            out.push('~');
        }
        format!("{out:<GRID_CELL_WIDTH$}")
    };

    let mut out = format!("{:>5} ", "");
    for c in &columns {
        out.push_str(&fit(&data.column(*c).display_name(*c)));
        out.push(' ');
    }
    out.push('\n');
    for row in 0..=max_row {
        out.push_str(&format!("{row:>5} "));
        for c in &columns {
            out.push_str(&fit(data.cell(CellKey::new(row, *c)).unwrap_or("")));
            out.push(' ');
        }
        out.push('\n');
    }
    out
}

// ── `gk note` / `gk login` ────────────────────────────────────────────────────

fn cmd_note(app: &App, action: NoteAction) -> Result<()> {
    match action {
        NoteAction::List { vault } => {
            let vault = app.vault(&vault)?;
            for (slot, note) in &vault.data.notes {
                println!("{slot:>3}  {}", note.title);
            }
        }
        NoteAction::Show { vault, slot } => {
            let vault = app.vault(&vault)?;
            let note = vault
                .data
                .notes
                .get(&slot)
                .with_context(|| format!("no note in slot {slot}"))?;
            println!("# {}", note.title);
            println!("{}", note.body);
        }
        NoteAction::Add { vault, title, body } => {
            let body = match body {
                Some(b) => b,
                None => read_input(Path::new("-"))?,
            };
            let slot = app.edit(&vault, |d| Ok(d.add_note(&title, &body)))?;
            println!("Added note {slot}");
        }
        NoteAction::Edit {
            vault,
            slot,
            title,
            body,
        } => {
            app.edit(&vault, |d| {
                let current = d
                    .notes
                    .get(&slot)
                    .cloned()
                    .ok_or_else(|| gk_core::GkError::NotFound(format!("note {slot}")))?;
                d.update_note(
                    slot,
                    title.as_deref().unwrap_or(&current.title),
                    body.as_deref().unwrap_or(&current.body),
                )
            })?;
        }
        NoteAction::Remove { vault, slot } => app.edit(&vault, |d| d.remove_note(slot))?,
    }
    Ok(())
}

fn prompt_secret(prompt: &str) -> Result<String> {
    rpassword::prompt_password(prompt).context("reading password")
}

fn cmd_login(app: &App, action: LoginAction) -> Result<()> {
    match action {
        LoginAction::List { vault, reveal } => {
            let vault = app.vault(&vault)?;
            for (slot, site) in &vault.data.login_sites {
                println!("{slot:>3}  {}", site.name);
                for (i, entry) in site.entries.iter().enumerate() {
                    let password = if reveal { entry.password.as_str() } else { "********" };
                    println!("       {i:>2}  {:<32} {password}", entry.login);
                }
            }
        }
        LoginAction::AddSite { vault, name } => {
            let slot = app.edit(&vault, |d| d.add_login_site(&name))?;
            println!("Added site {slot}");
        }
        LoginAction::RenameSite { vault, site, name } => {
            app.edit(&vault, |d| d.rename_login_site(site, &name))?
        }
        LoginAction::RemoveSite { vault, site } => app.edit(&vault, |d| d.remove_login_site(site))?,
        LoginAction::Add { vault, site, login } => {
            let password = prompt_secret("Password: ")?;
            let index = app.edit(&vault, |d| d.add_login_entry(site, &login, &password))?;
            println!("Added login {site}/{index}");
        }
        LoginAction::Update {
            vault,
            site,
            index,
            login,
        } => {
            let password = prompt_secret("Password: ")?;
            app.edit(&vault, |d| d.update_login_entry(site, index, &login, &password))?;
        }
        LoginAction::Remove { vault, site, index } => {
            app.edit(&vault, |d| d.remove_login_entry(site, index))?
        }
    }
    Ok(())
}

// ── Network commands ──────────────────────────────────────────────────────────

async fn cmd_sync(app: &App, vault: Option<&str>) -> Result<()> {
    let (_, identity) = app.unlock()?;
    let target = vault.map(|v| app.vault(v)).transpose()?;
    let engine = app.engine()?;
    let pb = make_spinner("sync");

    let reports = match &target {
        Some(target) => {
            pb.set_message(target.vault_name.clone());
            let result = engine.sync_vault(&identity, &target.vault_id).await;
            result.map(|r| vec![r])
        }
        None => {
            pb.set_message("all vaults");
            engine.sync_all(&identity).await
        }
    };
    pb.finish_and_clear();
    let reports = reports.context("sync failed")?;

    if reports.is_empty() {
        println!("Nothing to sync.");
    }
    for report in reports {
        if report.attempts == 0 {
            println!("{}: up to date", report.vault_id);
            continue;
        }
        println!(
            "{}: revision {} ({} upserts, {} deletions, {} attempt{})",
            report.vault_id,
            report.revision,
            report.upserts,
            report.tombstones,
            report.attempts,
            if report.attempts == 1 { "" } else { "s" }
        );
        if !report.synced {
            println!("  edited during sync; run `gk sync` again");
        }
    }
    Ok(())
}

async fn cmd_pull(app: &App, vault: &str, confirmation: Confirmation) -> Result<()> {
    let (_, identity) = app.unlock()?;
    let target = app.vault(vault)?;
    let engine = app.engine()?;

    let pb = make_spinner("pull");
    pb.set_message(target.vault_name.clone());
    let result = engine
        .pull_vault(&identity, &target.vault_id, confirmation)
        .await;
    pb.finish_and_clear();
    let report = result.with_context(|| {
        format!(
            "pulling '{}' (use --yes to discard unsynced changes)",
            target.vault_name
        )
    })?;

    println!(
        "Pulled '{}' at revision {} ({} records)",
        target.vault_name, report.revision, report.records
    );
    if report.unreadable > 0 {
        println!("  {} records could not be decrypted and are shown as placeholders", report.unreadable);
    }
    Ok(())
}

async fn cmd_import(app: &App) -> Result<()> {
    let (_, identity) = app.unlock()?;
    let engine = app.engine()?;

    let pb = make_spinner("import");
    pb.set_message("fetching vaults");
    let result = engine.import_all(&identity).await;
    pb.finish_and_clear();
    let report = result.context("import failed")?;

    println!("Import complete:");
    println!("  new:        {}", report.inserted.len());
    println!("  refreshed:  {}", report.refreshed.len());
    println!("  skipped:    {} (unsynced local changes)", report.skipped.len());
    if report.unreadable > 0 {
        println!("  unreadable: {} records", report.unreadable);
    }
    Ok(())
}

async fn cmd_clear_remote(app: &App, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!("this deletes every vault of the active identity; pass --yes to confirm");
    }
    let (profile, identity) = app.unlock()?;
    let engine = app.engine()?;

    let pb = make_spinner("clear");
    pb.set_message(profile.user_id.clone());
    let result = engine.clear_all(&identity).await;
    pb.finish_and_clear();
    let removed = result.context("clearing remote vaults")?;
    println!("Removed {removed} vaults for {}", profile.user_id);
    Ok(())
}

// ── `gk config show` ──────────────────────────────────────────────────────────

fn cmd_config_show(config: &GkConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gk_core::types::user_id_for;
    use gk_store::JsonStore;

    #[test]
    fn expand_tilde_uses_home() {
        let expanded = expand_tilde(Path::new("~/ghostkeys/store.json"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expanded, home.join("ghostkeys/store.json"));
        }
        assert_eq!(expand_tilde(Path::new("/abs/x")), PathBuf::from("/abs/x"));
    }

    #[test]
    fn cli_parses_cell_keys() {
        let cli = Cli::try_parse_from(["gk", "cell", "set", "Personal", "2,1", "x"]).unwrap();
        match cli.command {
            Commands::Cell {
                action: CellAction::Set { key, value, .. },
            } => {
                assert_eq!(key, CellKey::new(2, 1));
                assert_eq!(value, "x");
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(Cli::try_parse_from(["gk", "cell", "get", "Personal", "B2"]).is_err());
    }

    #[test]
    fn find_vault_by_id_or_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonStore::open(&dir.path().join("store.json")).unwrap();
        let identity = Identity::from_key_seed(&[5; 32]);
        let user_id = user_id_for(&identity.principal().to_string());
        let vault = vaults::create_vault(&mut store, &identity, "Personal").unwrap();

        assert_eq!(find_vault(&store, &user_id, "Personal").unwrap().vault_id, vault.vault_id);
        assert_eq!(find_vault(&store, &user_id, &vault.vault_id).unwrap().vault_name, "Personal");
        assert!(find_vault(&store, &user_id, "Work").is_err());
        assert!(find_vault(&store, "UserID_other", "Personal").is_err());
    }

    #[test]
    fn grid_render_skips_hidden_columns() {
        let mut data = VaultData::default();
        data.set_cell(CellKey::new(0, 0), "site");
        data.set_cell(CellKey::new(0, 1), "secret");
        data.set_column(1, "Password", true);

        let shown = render_grid(&data, false);
        assert!(shown.contains("site"));
        assert!(!shown.contains("secret"));
        assert!(render_grid(&data, true).contains("Password"));
        assert_eq!(render_grid(&VaultData::default(), false), "(empty grid)\n");
    }
}
