mod logging;

use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing::info;
use wikisync_core::attachments::AttachmentSequence;
use wikisync_core::cancel::CancelFlag;
use wikisync_core::config::{
    FlatConfigPatch, RemoteOverrides, SyncConfig, load_config, patch_flat_config,
};
use wikisync_core::flat::{FlatOptions, FlatReport, build_flat_wiki};
use wikisync_core::notation::{Dialect, convert};
use wikisync_core::runtime::{
    PathOverrides, ResolutionContext, ResolvedPaths, ValueSource, init_config, resolve_paths,
};
use wikisync_core::sync::{SyncReport, download, upload};

#[derive(Debug, Parser)]
#[command(
    name = "wikisync",
    version,
    about = "Mirror a hierarchical Backlog wiki to a local folder tree and a flat wiki"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH", help = "Local mirror folder")]
    wiki_dir: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(long, global = true, help = "Print the final report as JSON")]
    json: bool,
    #[arg(short, long, global = true, help = "Enable debug logging")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    wiki_dir: Option<PathBuf>,
    diagnostics: bool,
    json: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            wiki_dir: cli.wiki_dir.clone(),
            diagnostics: cli.diagnostics,
            json: cli.json,
        }
    }

    fn path_overrides(&self) -> PathOverrides {
        PathOverrides {
            project_root: self.project_root.clone(),
            config: self.config.clone(),
            wiki_dir: self.wiki_dir.clone(),
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Write a starter .wikisync.toml")]
    Init(InitArgs),
    #[command(about = "Mirror remote pages into the local folder tree")]
    Download(DownloadArgs),
    #[command(about = "Push local pages and new images back to the remote wiki")]
    Upload(UploadArgs),
    #[command(name = "build-flat", about = "Export the local tree as a flat wiki")]
    BuildFlat(BuildFlatArgs),
    #[command(about = "Convert markup between the Backlog and Markdown dialects")]
    Convert(ConvertArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

#[derive(Debug, Args)]
struct RemoteArgs {
    #[arg(long, value_name = "URL", help = "Space URL (any page URL works)")]
    space_url: Option<String>,
    #[arg(long, value_name = "KEY")]
    project_key: Option<String>,
}

#[derive(Debug, Args)]
struct DownloadArgs {
    #[command(flatten)]
    remote: RemoteArgs,
    #[arg(
        long,
        value_name = "PREFIX",
        help = "Only pages whose name starts with PREFIX (or a page URL)"
    )]
    prefix: Option<String>,
}

#[derive(Debug, Args)]
struct UploadArgs {
    #[command(flatten)]
    remote: RemoteArgs,
    #[arg(long, value_name = "URL", help = "Upload only the page at this URL")]
    target_url: Option<String>,
    #[arg(long, help = "Report what would change without writing")]
    dry_run: bool,
}

#[derive(Debug, Args)]
struct BuildFlatArgs {
    #[arg(short, long, value_name = "PATH", help = "Wiki folder to export")]
    input: Option<PathBuf>,
    #[arg(short, long, value_name = "PATH", help = "Existing output folder")]
    output: Option<PathBuf>,
    #[arg(short, long, value_name = "TEXT")]
    separator: Option<String>,
    #[arg(short, long, value_name = "N", help = "Sidebar levels expanded by default")]
    expand_level: Option<usize>,
    #[arg(long, help = "Do not remember input/output in the config file")]
    no_save: bool,
}

#[derive(Debug, Args)]
struct ConvertArgs {
    #[arg(long, value_name = "DIALECT", help = "markdown | backlog")]
    to: String,
    #[arg(value_name = "FILE", help = "Input file (stdin when omitted)")]
    file: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Download(args)) => run_download(&runtime, args),
        Some(Commands::Upload(args)) => run_upload(&runtime, args),
        Some(Commands::BuildFlat(args)) => run_build_flat(&runtime, args),
        Some(Commands::Convert(args)) => run_convert(args),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let wrote = init_config(&paths, args.force)?;

    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("wrote_config: {}", format_flag(wrote));
    if runtime.diagnostics {
        print_diagnostics(runtime, &paths, &SyncConfig::default());
    }
    Ok(())
}

fn run_download(runtime: &RuntimeOptions, args: DownloadArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let mut config = load_runtime_config(&paths)?;
    config.apply_overrides(RemoteOverrides {
        space_url: args.remote.space_url,
        project_key: args.remote.project_key,
        wiki_prefix: args.prefix,
        ..RemoteOverrides::default()
    });
    let (wiki_dir, _) = paths.wiki_dir(&runtime.path_overrides(), &config);
    if runtime.diagnostics {
        print_diagnostics(runtime, &paths, &config);
    }

    let cancel = install_interrupt_handler()?;
    let report = download(&wiki_dir, &config, &cancel)?;
    finish_sync(runtime, &report)
}

fn run_upload(runtime: &RuntimeOptions, args: UploadArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let mut config = load_runtime_config(&paths)?;
    config.apply_overrides(RemoteOverrides {
        space_url: args.remote.space_url,
        project_key: args.remote.project_key,
        target_url: args.target_url,
        ..RemoteOverrides::default()
    });
    let (wiki_dir, _) = paths.wiki_dir(&runtime.path_overrides(), &config);
    if runtime.diagnostics {
        print_diagnostics(runtime, &paths, &config);
    }

    let cancel = install_interrupt_handler()?;
    let report = upload(&wiki_dir, &config, args.dry_run, &cancel)?;
    finish_sync(runtime, &report)
}

fn run_build_flat(runtime: &RuntimeOptions, args: BuildFlatArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_runtime_config(&paths)?;

    let input_dir = match (&args.input, &config.flat.input_dir) {
        (Some(path), _) => absolutize(path, &paths.project_root),
        (None, Some(configured)) => absolutize(Path::new(configured), &paths.project_root),
        (None, None) => paths.wiki_dir(&runtime.path_overrides(), &config).0,
    };
    let output_dir = match (&args.output, &config.flat.output_dir) {
        (Some(path), _) => absolutize(path, &paths.project_root),
        (None, Some(configured)) => absolutize(Path::new(configured), &paths.project_root),
        (None, None) => bail!("output folder is required (pass --output or set [flat].output_dir)"),
    };
    let options = FlatOptions {
        separator: args
            .separator
            .clone()
            .unwrap_or_else(|| config.separator().to_string()),
        expand_level: args.expand_level.unwrap_or_else(|| config.expand_level()),
    };

    if !args.no_save {
        let saved = patch_flat_config(
            &paths.config_path,
            &FlatConfigPatch {
                set_input_dir: args.input.as_deref().map(normalize_path),
                set_output_dir: args.output.as_deref().map(normalize_path),
                ..FlatConfigPatch::default()
            },
        )?;
        if saved {
            info!("remembered flat folders in {}", normalize_path(&paths.config_path));
        }
    }
    if runtime.diagnostics {
        print_diagnostics(runtime, &paths, &config);
    }

    let cancel = install_interrupt_handler()?;
    let mut sequence = AttachmentSequence::new();
    let report = build_flat_wiki(&input_dir, &output_dir, &options, &mut sequence, &cancel)?;
    if runtime.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_flat_report(&report);
    }
    if report.interrupted {
        bail!("flat export interrupted");
    }
    Ok(())
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    let target = Dialect::parse(&args.to)?;
    let content = match &args.file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", normalize_path(path)))?,
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read stdin")?;
            buffer
        }
    };
    print!("{}", convert(&content, target));
    Ok(())
}

fn install_interrupt_handler() -> Result<CancelFlag> {
    let cancel = CancelFlag::new();
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        eprintln!("interrupt received; stopping after the current page");
        handler_flag.cancel();
    })
    .context("failed to install Ctrl-C handler")?;
    Ok(cancel)
}

fn finish_sync(runtime: &RuntimeOptions, report: &SyncReport) -> Result<()> {
    if runtime.json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        print_sync_report(report);
    }
    if report.interrupted {
        bail!("{} interrupted", report.direction.as_str());
    }
    Ok(())
}

fn print_sync_report(report: &SyncReport) {
    println!("{}", report.direction.as_str());
    println!("success: {}", format_flag(report.success));
    println!("dry_run: {}", format_flag(report.dry_run));
    println!("total: {}", report.total);
    println!("succeeded: {}", report.succeeded);
    println!("skipped: {}", report.skipped);
    println!("failed: {}", report.failed);
    println!("attachments_transferred: {}", report.attachments.transferred);
    println!("attachments_skipped: {}", report.attachments.skipped);
    println!("attachments_failed: {}", report.attachments.failed);
    println!("interrupted: {}", format_flag(report.interrupted));
    println!("request_count: {}", report.request_count);
    if !report.pages.is_empty() {
        println!("pages:");
        for page in &report.pages {
            match &page.detail {
                Some(detail) => println!("  - [{}] {} ({detail})", page.action, page.name),
                None => println!("  - [{}] {}", page.action, page.name),
            }
        }
    }
    print_list("warnings", &report.warnings);
    print_list("errors", &report.errors);
}

fn print_flat_report(report: &FlatReport) {
    println!("build-flat");
    println!("success: {}", format_flag(report.success));
    println!("input_dir: {}", report.input_dir);
    println!("output_dir: {}", report.output_dir);
    println!("removed_files: {}", report.removed_files);
    println!("sidebar_entries: {}", report.sidebar_entries);
    println!("pages_written: {}", report.pages_written);
    println!("images_copied: {}", report.images_copied);
    println!("failed: {}", report.failed);
    println!("interrupted: {}", format_flag(report.interrupted));
    print_list("errors", &report.errors);
}

fn print_list(label: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    println!("{label}:");
    for item in items {
        println!("  - {item}");
    }
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths, config: &SyncConfig) {
    let wiki_dir = paths.wiki_dir(&runtime.path_overrides(), config);
    println!("\n[diagnostics]\n{}", paths.diagnostics(&wiki_dir));
    println!(
        "space_url={}\nproject_key={}\napi_key={}",
        config.space_url().as_deref().unwrap_or("<unset>"),
        config.project_key().as_deref().unwrap_or("<unset>"),
        if config.api_key().is_some() { "<set>" } else { "<unset>" },
    );
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = runtime.path_overrides();

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

/// An explicitly named config file must exist; the default one is optional.
fn load_runtime_config(paths: &ResolvedPaths) -> Result<SyncConfig> {
    if paths.config_source != ValueSource::Default && !paths.config_path.exists() {
        bail!("config file not found: {}", normalize_path(&paths.config_path));
    }
    load_config(&paths.config_path)
}

fn absolutize(path: &Path, base: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
