//! dcp - WebDAV-style copy
//!
//! Recursive COPY and MOVE with RFC 4918 semantics, powered by davcopy.

use clap::{Parser, ValueEnum};
use davcopy::{
    ActionResult, ActionStatus, DavResponse, Depth, Destination, Error as DavError, FileSystem,
    LocalFileSystem, RemoteClient, TransferBuilder, TransferKind, TransferOutcome,
};
use http::Version;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing_subscriber::EnvFilter;
use url::Url;

/// dcp - WebDAV-style recursive copy
///
/// Copy or move a file or directory tree with WebDAV semantics. DESTINATION
/// names the resource to create or replace, never a directory to copy into.
///
/// Usage:
///   dcp SOURCE DESTINATION
///   dcp --move SOURCE DESTINATION
///   dcp SOURCE https://server/collection/name
#[derive(Parser, Debug)]
#[command(name = "dcp", version, about, long_about = None)]
struct Args {
    /// Local file or directory to transfer
    source: PathBuf,

    /// Local path or http(s):// URL of the resource to create or replace
    destination: String,

    /// Move instead of copy
    ///
    /// A source collection is only removed once its whole subtree arrived.
    #[arg(short = 'm', long = "move")]
    moving: bool,

    /// How deep to recurse: 0, 1, ... or infinity
    ///
    /// Only infinity is accepted together with --move.
    #[arg(short = 'd', long, default_value = "infinity", value_parser = parse_depth)]
    depth: Depth,

    /// Fail instead of replacing an existing destination
    #[arg(short = 'n', long)]
    no_overwrite: bool,

    /// Buffer size in bytes for streamed copies
    #[arg(long, default_value_t = davcopy::DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    /// Output format
    #[arg(long, value_enum, default_value = "human")]
    output: OutputMode,

    /// Disable the spinner and per-item warnings
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Verbose output (logs every item)
    #[arg(short = 'v', long)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
enum OutputMode {
    /// Status line and per-status listing
    Human,
    /// Every item as a JSON record
    Json,
    /// The rendered WebDAV response body
    Xml,
}

fn parse_depth(value: &str) -> Result<Depth, String> {
    Depth::parse_header(value).map_err(|e| e.to_string())
}

type CliResult<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
enum CliError {
    #[error("Source does not exist: {path}")]
    SourceNotFound { path: PathBuf },

    #[error("Failed to resolve source: {path}: {source}")]
    SourceMetadata { path: PathBuf, source: io::Error },

    #[error("Destination parent does not exist: {path}")]
    DestinationParentNotFound { path: PathBuf },

    #[error("Path has no usable name or is not valid UTF-8: {path}")]
    InvalidPath { path: PathBuf },

    #[error("Invalid destination URL: {url}: {source}")]
    InvalidUrl {
        url: String,
        source: url::ParseError,
    },

    #[error(transparent)]
    Transfer(#[from] DavError),

    #[error("Failed to start runtime: {source}")]
    Runtime { source: io::Error },

    #[error("Failed to serialize JSON output: {source}")]
    JsonSerialize { source: serde_json::Error },
}

impl CliError {
    fn code(&self) -> &'static str {
        match self {
            Self::SourceNotFound { .. } => "source_not_found",
            Self::DestinationParentNotFound { .. } => "parent_not_found",
            Self::InvalidPath { .. } | Self::InvalidUrl { .. } => "invalid_input",
            Self::Transfer(error) if error.status_code().is_client_error() => "request_rejected",
            Self::Transfer(_) => "transfer_failed",
            Self::SourceMetadata { .. } | Self::Runtime { .. } => "io_error",
            Self::JsonSerialize { .. } => "output_error",
        }
    }

    /// 2 for requests that could never succeed as given, 1 otherwise.
    fn exit_code(&self) -> i32 {
        match self {
            Self::SourceNotFound { .. }
            | Self::DestinationParentNotFound { .. }
            | Self::InvalidPath { .. }
            | Self::InvalidUrl { .. } => 2,
            Self::Transfer(error) if error.status_code().is_client_error() => 2,
            _ => 1,
        }
    }
}

fn main() {
    let code = match run() {
        Ok(code) => code,
        Err(error) => {
            eprintln!("error[{}]: {}", error.code(), error);
            error.exit_code()
        }
    };
    std::process::exit(code);
}

fn run() -> CliResult<i32> {
    let args = Args::parse();

    if args.verbose {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("davcopy=debug"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .init();
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|source| CliError::Runtime { source })?;
    runtime.block_on(execute(args))
}

async fn execute(args: Args) -> CliResult<i32> {
    let (fs, source, destination) = resolve_request(&args)?;

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel_clone = cancel.clone();
        ctrlc::set_handler(move || {
            if cancel_clone.load(Ordering::Relaxed) {
                eprintln!("\nForce quit.");
                std::process::exit(130);
            }
            cancel_clone.store(true, Ordering::Relaxed);
            eprintln!(
                "\nCancelling... finishing the current item. Press Ctrl+C again to abort immediately."
            );
        })
        .ok();
    }

    let kind = if args.moving {
        TransferKind::Move
    } else {
        TransferKind::Copy
    };
    let mut builder = TransferBuilder::new(kind, fs, source, destination)
        .depth(args.depth)
        .buffer_size(args.buffer_size)
        .cancel_token(cancel.clone());
    if args.no_overwrite {
        builder = builder.no_overwrite();
    }
    // With --verbose the tracing subscriber reports warnings
    if !args.verbose {
        let handler: fn(&str) = if args.quiet {
            ignore_warning
        } else {
            print_warning
        };
        builder = builder.on_warning(handler);
    }

    let pb = if args.output == OutputMode::Human && !args.quiet {
        spinner(&format!("{kind} {}...", args.source.display()))
    } else {
        None
    };
    let outcome = builder.run().await;
    if let Some(pb) = pb {
        pb.finish_and_clear();
    }
    let outcome = outcome?;
    let response = outcome.evaluate(Version::HTTP_11)?;

    match args.output {
        OutputMode::Human => print_human(&outcome, &response, args.verbose),
        OutputMode::Json => print_json_value(&json_report(&outcome, &response))?,
        OutputMode::Xml => {
            if let Some(body) = response.body() {
                println!("{body}");
            }
        }
    }

    if cancel.load(Ordering::Relaxed) {
        let skipped = outcome
            .flatten()
            .filter(|r| r.status == ActionStatus::Ignored)
            .count();
        eprintln!("Cancelled; {skipped} items were not attempted.");
        return Ok(130);
    }
    Ok(if response.status().is_success() { 0 } else { 1 })
}

fn print_warning(msg: &str) {
    eprintln!("warning: {msg}");
}

fn ignore_warning(_: &str) {}

fn spinner(message: &str) -> Option<ProgressBar> {
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} {msg}")
        .ok()?;
    let pb = ProgressBar::new_spinner();
    pb.set_style(style);
    pb.enable_steady_tick(Duration::from_millis(100));
    pb.set_message(message.to_owned());
    Some(pb)
}

/// Open the backend and work out the source path and destination.
///
/// Two local paths share one backend rooted at their common ancestor, so a
/// same-disk transfer takes the native rename/copy path.
fn resolve_request(args: &Args) -> CliResult<(Arc<dyn FileSystem>, String, Destination)> {
    let source = canonical_source(&args.source)?;

    if let Some(url) = remote_url(&args.destination)? {
        let root = source.parent().unwrap_or(&source).to_path_buf();
        let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new(&root)?);
        let path = dav_path(&root, &source)?;
        return Ok((fs, path, Destination::remote(RemoteClient::new()?, url)));
    }

    let destination = absolute_destination(Path::new(&args.destination))?;
    let mut root = common_ancestor(&source, &destination);
    if !root.is_dir() {
        if let Some(parent) = root.parent() {
            root = parent.to_path_buf();
        }
    }
    let base_url =
        Url::from_directory_path(&root).map_err(|()| CliError::InvalidPath { path: root.clone() })?;
    let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new(&root)?);
    let source_path = dav_path(&root, &source)?;
    let destination_path = dav_path(&root, &destination)?;
    Ok((
        fs.clone(),
        source_path,
        Destination::local(fs, destination_path, base_url),
    ))
}

fn canonical_source(path: &Path) -> CliResult<PathBuf> {
    std::fs::canonicalize(path).map_err(|source| match source.kind() {
        io::ErrorKind::NotFound => CliError::SourceNotFound {
            path: path.to_path_buf(),
        },
        _ => CliError::SourceMetadata {
            path: path.to_path_buf(),
            source,
        },
    })
}

fn remote_url(destination: &str) -> CliResult<Option<Url>> {
    if !(destination.starts_with("http://") || destination.starts_with("https://")) {
        return Ok(None);
    }
    Url::parse(destination)
        .map(Some)
        .map_err(|source| CliError::InvalidUrl {
            url: destination.to_owned(),
            source,
        })
}

/// Absolute form of a destination that may not exist yet.
fn absolute_destination(path: &Path) -> CliResult<PathBuf> {
    if let Ok(canonical) = std::fs::canonicalize(path) {
        return Ok(canonical);
    }
    let name = path.file_name().ok_or_else(|| CliError::InvalidPath {
        path: path.to_path_buf(),
    })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let parent = std::fs::canonicalize(parent).map_err(|_| CliError::DestinationParentNotFound {
        path: parent.to_path_buf(),
    })?;
    Ok(parent.join(name))
}

fn common_ancestor(a: &Path, b: &Path) -> PathBuf {
    a.components()
        .zip(b.components())
        .take_while(|(x, y)| x == y)
        .map(|(x, _)| x)
        .collect()
}

/// `/`-separated path of `path` below the backend root.
fn dav_path(root: &Path, path: &Path) -> CliResult<String> {
    let invalid = || CliError::InvalidPath {
        path: path.to_path_buf(),
    };
    let relative = path.strip_prefix(root).map_err(|_| invalid())?;
    let mut dav = String::new();
    for component in relative.components() {
        let Component::Normal(name) = component else {
            return Err(invalid());
        };
        dav.push('/');
        dav.push_str(name.to_str().ok_or_else(invalid)?);
    }
    if dav.is_empty() {
        dav.push('/');
    }
    Ok(dav)
}

fn print_human(outcome: &TransferOutcome, response: &DavResponse, verbose: bool) {
    let status = response.status();
    println!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or_default()
    );

    let mut groups: BTreeMap<ActionStatus, Vec<&ActionResult>> = BTreeMap::new();
    for result in outcome.flatten() {
        groups.entry(result.status).or_default().push(result);
    }
    for (status, results) in &groups {
        println!("{}: {}", status.as_str(), results.len());
        // Successes are only itemized on request
        if !status.is_failure() && !verbose {
            continue;
        }
        for result in results {
            match &result.error {
                Some(error) => println!("  {}  ({error})", result.href),
                None => println!("  {}", result.href),
            }
        }
    }
}

fn json_report(outcome: &TransferOutcome, response: &DavResponse) -> Value {
    let items: Vec<Value> = outcome
        .flatten()
        .map(|result| {
            json!({
                "href": result.href.as_str(),
                "status": result.status.as_str(),
                "code": result.status.status_code().map(|code| code.as_u16()),
                "error": result.error.as_ref().map(ToString::to_string),
            })
        })
        .collect();
    json!({
        "status": response.status().as_u16(),
        "multistatus": response.is_multistatus(),
        "items": items,
    })
}

fn print_json_value(value: &Value) -> CliResult<()> {
    let serialized =
        serde_json::to_string(value).map_err(|source| CliError::JsonSerialize { source })?;
    println!("{serialized}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_ancestor() {
        assert_eq!(
            common_ancestor(Path::new("/a/b/c"), Path::new("/a/b/d/e")),
            PathBuf::from("/a/b")
        );
        assert_eq!(
            common_ancestor(Path::new("/x"), Path::new("/y")),
            PathBuf::from("/")
        );
    }

    #[test]
    fn test_dav_path() {
        let root = Path::new("/srv/data");
        assert_eq!(dav_path(root, Path::new("/srv/data/a/b.txt")).unwrap(), "/a/b.txt");
        assert_eq!(dav_path(root, root).unwrap(), "/");
        assert!(dav_path(root, Path::new("/elsewhere")).is_err());
    }

    #[test]
    fn test_remote_url() {
        assert!(remote_url("./local/path").unwrap().is_none());
        assert_eq!(
            remote_url("https://dav.example.com/a/").unwrap().unwrap().host_str(),
            Some("dav.example.com")
        );
        assert!(remote_url("http://").is_err());
    }

    #[test]
    fn test_parse_depth() {
        assert_eq!(parse_depth("infinity").unwrap(), Depth::Infinite);
        assert_eq!(parse_depth("0").unwrap(), Depth::Zero);
        assert!(parse_depth("deep").is_err());
    }
}
