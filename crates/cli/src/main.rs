use anyhow::{bail, Context, Result};
use bytes::Bytes;
use clap::{Parser, Subcommand};
use cli::browse::{self, BrowseCommand};
use cli::output::{filter_fields, print_json};
use cli::{upload, watch};
use hopper_core::browser::Browser;
use hopper_core::config::{self, AppConfig};
use hopper_core::feed;
use hopper_core::folders;
use hopper_core::pipeline::{self, ScanOptions};
use hopper_core::preview::load_preview;
use hopper_core::reporting::{self, ReportFormats};
use hopper_core::scanner;
use hopper_core::session::Session;
use hopper_core::wizard::{ImportRequest, ImportWizard, WizardStep};
use providers::auth::StaticIdentity;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hopper")]
#[command(about = "Document hopper workspace for insurance claim recovery", long_about = None)]
struct Cli {
    /// Path to config TOML
    #[arg(short, long)]
    config: Option<String>,

    /// Debug logging, and ask the backend for verbose processing
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in and make sure the hopper folder structure exists
    Init,
    /// List a folder (the hopper by default)
    Ls {
        /// Folder id
        folder: Option<String>,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
    /// Interactive folder browser
    Browse,
    /// Upload a file or every file in a directory
    Upload {
        path: PathBuf,
        /// Container folder inside the hopper, e.g. Amazon
        #[arg(long)]
        folder: Option<String>,
    },
    /// Create a folder inside the hopper
    Mkdir { name: String },
    /// Move a file into its folder's _excluded marker folder
    Exclude {
        file_id: String,
        /// Id of the folder currently holding the file
        parent_id: String,
    },
    /// Move a file into its folder's _deleted marker folder
    Delete { file_id: String, parent_id: String },
    /// Find new files in the hopper and send them for refinement
    Scan {
        /// Only list what would be sent
        #[arg(long)]
        dry_run: bool,
        /// Output JSON summary
        #[arg(long)]
        json: bool,
    },
    /// Walk through the mail-archive import and follow its progress
    Import {
        /// Downloaded export archive (.zip)
        archive: PathBuf,
        /// User id the job is created for
        #[arg(long)]
        user: String,
        /// Skip the instruction pauses
        #[arg(long)]
        yes: bool,
    },
    /// Preview a hopper file by name or id
    Preview { file: String },
    /// Extracted results for every file in the hopper
    Feed {
        #[arg(long)]
        json: bool,
    },
    /// Generate a claim report over the hopper
    Report {
        /// Comma-separated: pdf,csv,zip
        #[arg(long, default_value = "pdf,csv")]
        formats: String,
    },
    /// List shards recorded in the local ledger
    Shards {
        /// Filter by status: unprocessed|processing|refined|error
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        json: bool,
        /// Restrict output fields (comma-separated), e.g. id,file_name,status
        #[arg(long, value_delimiter = ',', num_args = 1.., default_values_t = Vec::<String>::new())]
        fields: Vec<String>,
    },
    /// Revoke the access token
    Signout,
}

fn init_logging(debug: bool) {
    let default = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);
    let cfg = config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Shards {
            status,
            json,
            fields,
        } => return run_shards(&cfg, status.as_deref(), json, &fields).await,
        Commands::Signout => {
            let session = open_session(cfg).await?;
            session.sign_out().await;
            println!("signed out");
            return Ok(());
        }
        _ => {}
    }

    let session = open_session(cfg).await?;
    match cli.command {
        Commands::Init => run_init(&session).await,
        Commands::Ls { folder, json } => run_ls(&session, folder, json).await,
        Commands::Browse => run_browse(&session).await,
        Commands::Upload { path, folder } => run_upload(&session, &path, folder.as_deref()).await,
        Commands::Mkdir { name } => {
            let hopper = require_hopper(&session).await?;
            let id = folders::ensure_folder(session.directory(), &name, &hopper).await?;
            println!("{name}: {id}");
            Ok(())
        }
        Commands::Exclude { file_id, parent_id } => {
            folders::exclude_file(session.directory(), &file_id, &parent_id).await?;
            println!("excluded {file_id}");
            Ok(())
        }
        Commands::Delete { file_id, parent_id } => {
            folders::delete_file(session.directory(), &file_id, &parent_id).await?;
            println!("deleted {file_id}");
            Ok(())
        }
        Commands::Scan { dry_run, json } => run_scan(&session, cli.debug, dry_run, json).await,
        Commands::Import { archive, user, yes } => run_import(&session, &archive, user, yes).await,
        Commands::Preview { file } => run_preview(&session, &file).await,
        Commands::Feed { json } => run_feed(&session, json).await,
        Commands::Report { formats } => {
            let response = reporting::generate(&session, ReportFormats::parse(&formats)?).await?;
            print_json(&response.files)
        }
        Commands::Shards { .. } | Commands::Signout => Ok(()),
    }
}

async fn open_session(cfg: AppConfig) -> Result<Session> {
    let identity = StaticIdentity::new(cfg.identity.access_token.clone());
    let session = Session::from_config(cfg);
    session.bootstrap(&identity).await?;
    session
        .sign_in(&identity)
        .await
        .context("set identity.access_token or HOPPER_IDENTITY__ACCESS_TOKEN")?;
    Ok(session)
}

async fn require_hopper(session: &Session) -> Result<String> {
    folders::locate_hopper(session.directory(), &session.config.hopper)
        .await
        .context("hopper folder not found; run `hopper init` first")
}

async fn run_init(session: &Session) -> Result<()> {
    let ids = folders::ensure_skeleton(session.directory(), &session.config.hopper).await?;
    println!("{}: {}", session.config.hopper.hopper_name, ids.hopper_id);
    for (name, id) in &ids.containers {
        println!("  {name}: {id}");
    }
    Ok(())
}

async fn run_ls(session: &Session, folder: Option<String>, json: bool) -> Result<()> {
    let folder = match folder {
        Some(id) => id,
        None => require_hopper(session).await?,
    };
    let items = session.directory().list_children(&folder).await?;
    if json {
        return print_json(&items);
    }
    for node in &items {
        let marker = if node.is_folder() { "d" } else { "-" };
        println!("{marker} {}  {}", node.id, node.name);
    }
    Ok(())
}

async fn run_browse(session: &Session) -> Result<()> {
    let hopper = require_hopper(session).await?;
    let mut browser = Browser::new(
        session.directory_handle(),
        &hopper,
        &session.config.hopper.hopper_name,
    );
    browser.open().await;
    let mut stdout = std::io::stdout();
    write!(stdout, "{}", browse::render_listing(&browser))?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        stdout.flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let command = match BrowseCommand::parse(&line) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("{e}");
                continue;
            }
        };
        match browse::execute(&mut browser, command, &mut stdout).await {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => eprintln!("error: {e:#}"),
        }
    }
    Ok(())
}

async fn run_upload(session: &Session, path: &std::path::Path, folder: Option<&str>) -> Result<()> {
    let hopper = require_hopper(session).await?;
    let target = match folder {
        Some(name) => folders::locate_folder(session.directory(), name, &hopper)
            .await
            .with_context(|| format!("no folder named {name} in the hopper"))?,
        None => hopper,
    };
    let report = upload::upload_path(
        session.directory(),
        path,
        &target,
        &session.config.upload.exclude,
    )
    .await?;
    for node in &report.uploaded {
        println!("uploaded {} ({})", node.name, node.mime_type);
    }
    for (path, reason) in &report.failed {
        eprintln!("failed {}: {reason}", path.display());
    }
    if !report.failed.is_empty() {
        bail!("{} of {} uploads failed", report.failed.len(), report.failed.len() + report.uploaded.len());
    }
    Ok(())
}

async fn run_scan(session: &Session, debug: bool, dry_run: bool, json: bool) -> Result<()> {
    let pool = storage::connect(&session.config.database.path).await?;
    storage::migrate(&pool).await?;
    let summary = pipeline::run_scan(session, &pool, &ScanOptions { debug, dry_run }).await?;
    if json {
        return print_json(&summary);
    }
    if dry_run {
        for name in &summary.submitted_names {
            println!("would send {name}");
        }
    }
    println!(
        "{} discovered {}, sent {}, failed {}, skipped {}",
        summary.status_message(),
        summary.discovered,
        summary.submitted,
        summary.failed,
        summary.skipped
    );
    Ok(())
}

async fn pause(yes: bool) -> Result<()> {
    if yes {
        return Ok(());
    }
    print!("Press Enter to continue... ");
    std::io::stdout().flush()?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    lines.next_line().await?;
    Ok(())
}

async fn run_import(session: &Session, archive: &std::path::Path, user: String, yes: bool) -> Result<()> {
    let mut wizard = ImportWizard::new();
    while wizard.step() != WizardStep::Upload {
        println!("{}", wizard.step().instructions());
        pause(yes).await?;
        wizard.advance();
    }
    println!("{}", wizard.step().instructions());

    let bytes = tokio::fs::read(archive)
        .await
        .with_context(|| format!("reading {}", archive.display()))?;
    let file_name = archive
        .file_name()
        .and_then(|n| n.to_str())
        .context("archive path has no file name")?
        .to_string();
    let mut subscription = wizard
        .start_import(
            session.backend(),
            session.jobs(),
            ImportRequest {
                user_id: user,
                file_name,
                bytes: Bytes::from(bytes),
            },
            &session.access_token()?,
        )
        .await?;
    println!("{}", wizard.step().instructions());
    let last = watch::follow_job(&mut subscription, |view| println!("{}", view.line())).await;
    if !last.is_complete() {
        bail!("job {} stopped at {}%", subscription.job_id, last.progress);
    }
    Ok(())
}

async fn run_preview(session: &Session, wanted: &str) -> Result<()> {
    let hopper = require_hopper(session).await?;
    let settings = &session.config.hopper;
    let files = scanner::scan(session.directory(), &hopper, &settings.hopper_name, settings.scan_depth).await;
    let file = files
        .iter()
        .find(|f| f.node.id == wanted || f.node.name == wanted)
        .with_context(|| format!("{wanted} not found in the hopper"))?;
    let preview = load_preview(session.directory(), &file.node).await;
    println!("{}", preview.render());
    Ok(())
}

async fn run_feed(session: &Session, json: bool) -> Result<()> {
    let entries = feed::build_feed(session.directory(), &session.config.hopper).await;
    if json {
        return print_json(&entries);
    }
    if entries.is_empty() {
        println!("No refined shards yet.");
    }
    for entry in &entries {
        println!("{}", entry.line());
    }
    Ok(())
}

async fn run_shards(cfg: &AppConfig, status: Option<&str>, json: bool, fields: &[String]) -> Result<()> {
    let pool = storage::connect(&cfg.database.path).await?;
    storage::migrate(&pool).await?;
    let rows = storage::list_shards(&pool, status).await?;
    let vals = rows
        .iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    let filtered = filter_fields(vals, fields);
    if json {
        print_json(&filtered)
    } else {
        for v in &filtered {
            println!("{}", serde_json::to_string(v)?);
        }
        Ok(())
    }
}
