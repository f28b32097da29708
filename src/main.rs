//! gitobj CLI - plumbing commands over a git-style object directory
//!
//! `init`, `hash-object`, `cat-file` and `ls-tree`, reading and writing
//! `<git-dir>/objects` in git's loose-object format.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use gitobj::{Error, ObjectId, ObjectKind, ObjectStore};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "gitobj")]
#[command(about = "A git-compatible content-addressed object store")]
#[command(version)]
struct Cli {
    /// Path to the repository directory
    #[arg(long, global = true, default_value = ".git")]
    git_dir: PathBuf,

    /// Output format (json or text)
    #[arg(short, long, global = true, default_value = "text")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    Json,
    Text,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty repository directory
    Init,

    /// Compute an object id, optionally writing the object
    HashObject {
        /// Write the object into the store
        #[arg(short)]
        w: bool,
        /// Object type
        #[arg(short = 't', long = "type", default_value = "blob")]
        kind: ObjectKind,
        /// Read content from stdin instead of a file
        #[arg(long, conflicts_with = "file")]
        stdin: bool,
        /// File to hash
        #[arg(required_unless_present = "stdin")]
        file: Option<PathBuf>,
    },

    /// Show an object's content, type, or size
    CatFile {
        #[command(flatten)]
        mode: CatMode,
        /// Object id (40 hex characters)
        object: String,
    },

    /// List the entries of a tree object
    LsTree {
        /// Only print entry names
        #[arg(long)]
        name_only: bool,
        /// Tree id (40 hex characters)
        tree: String,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct CatMode {
    /// Pretty-print the content
    #[arg(short = 'p')]
    pretty: bool,
    /// Show the object type
    #[arg(short = 't')]
    kind: bool,
    /// Show the object size
    #[arg(short = 's')]
    size: bool,
    /// Exit with status 0 if the object exists, 1 otherwise
    #[arg(short = 'e')]
    exists: bool,
}

fn main() -> ExitCode {
    init_tracing();
    // Usage errors exit 1; status 2 is reserved for a missing object.
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            let code = err.downcast_ref::<Error>().map_or(1, Error::exit_code);
            eprintln!("error: {:#}", err);
            ExitCode::from(code)
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let store = ObjectStore::open(cli.git_dir.join("objects"));

    match cli.command {
        Commands::Init => {
            init_repository(&cli.git_dir)?;
            let message = format!("Initialized git directory at {}", cli.git_dir.display());
            output(
                &cli.format,
                &message,
                &serde_json::json!({ "status": "ok", "message": message }),
            );
        }

        Commands::HashObject {
            w,
            kind,
            stdin,
            file,
        } => {
            let id = match (stdin, file) {
                (true, _) => {
                    let mut data = Vec::new();
                    io::stdin().read_to_end(&mut data)?;
                    if w {
                        store.store_bytes(kind, &data)?
                    } else {
                        gitobj::object_id(kind, &data)
                    }
                }
                (false, Some(path)) => {
                    let id = if w {
                        store.store_file(kind, &path)
                    } else {
                        gitobj::hash_file(kind, &path)
                    };
                    id.with_context(|| format!("hashing {}", path.display()))?
                }
                (false, None) => anyhow::bail!("no input given"),
            };
            output(
                &cli.format,
                id,
                &serde_json::json!({ "id": id, "type": kind, "written": w }),
            );
        }

        Commands::CatFile { mode, object } => {
            let id: ObjectId = object.parse()?;
            if mode.exists {
                return Ok(if store.contains(&id) {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                });
            }
            if mode.kind || mode.size {
                let header = store.header(&id)?;
                if mode.kind {
                    let json = serde_json::json!({ "id": id, "type": header.kind });
                    output(&cli.format, header.kind, &json);
                } else {
                    let json = serde_json::json!({ "id": id, "size": header.len });
                    output(&cli.format, header.len, &json);
                }
            } else {
                pretty_print(&store, &id, cli.format)?;
            }
        }

        Commands::LsTree { name_only, tree } => {
            let id: ObjectId = tree.parse()?;
            list_tree(&store, &id, name_only, cli.format)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn init_repository(git_dir: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(git_dir.join("objects"))?;
    fs::create_dir_all(git_dir.join("refs"))?;
    let head = git_dir.join("HEAD");
    if !head.exists() {
        fs::write(&head, "ref: refs/heads/main\n")
            .with_context(|| format!("writing {}", head.display()))?;
    }
    Ok(())
}

fn pretty_print(store: &ObjectStore, id: &ObjectId, format: OutputFormat) -> anyhow::Result<()> {
    let mut reader = store.load(id)?;
    match (reader.kind(), format) {
        (ObjectKind::Tree, _) => list_tree(store, id, false, format),
        (_, OutputFormat::Text) => {
            let mut stdout = io::stdout().lock();
            if let Err(e) = io::copy(&mut reader, &mut stdout) {
                return ignore_broken_pipe(e);
            }
            stdout.flush().or_else(ignore_broken_pipe)
        }
        (kind, OutputFormat::Json) => {
            let object = reader.into_object()?;
            output(
                &format,
                "",
                &serde_json::json!({
                    "id": id,
                    "type": kind,
                    "size": object.size(),
                    "content": String::from_utf8_lossy(&object.data),
                }),
            );
            Ok(())
        }
    }
}

fn list_tree(
    store: &ObjectStore,
    id: &ObjectId,
    name_only: bool,
    format: OutputFormat,
) -> anyhow::Result<()> {
    if format == OutputFormat::Json {
        let entries = store.read_tree(id)?;
        output(
            &format,
            "",
            &serde_json::json!({ "id": id, "entries": entries }),
        );
        return Ok(());
    }

    let mut stdout = io::stdout().lock();
    let mut write_result: io::Result<()> = Ok(());
    store.scan_tree(id, |entry| {
        if write_result.is_err() {
            return;
        }
        write_result = if name_only {
            writeln!(stdout, "{}", entry.name)
        } else {
            writeln!(stdout, "{}", entry)
        };
    })?;
    write_result.or_else(ignore_broken_pipe)
}

// Read errors come back wrapped in io::Error; unwrap them so the exit code
// still reflects the original failure.
fn ignore_broken_pipe(err: io::Error) -> anyhow::Result<()> {
    if err.kind() == io::ErrorKind::BrokenPipe {
        Ok(())
    } else {
        Err(Error::from(err).into())
    }
}

fn output(format: &OutputFormat, text: impl std::fmt::Display, value: &serde_json::Value) {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string(value).unwrap_or_default());
        }
        OutputFormat::Text => {
            println!("{}", text);
        }
    }
}
