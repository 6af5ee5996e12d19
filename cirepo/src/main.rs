mod output;

use anyhow::{Context, Result};
use cirepo_core::{
    Algorithm, CachedFileSystemReader, DeleteObjectsByTypeJob, DeleteReport, FileMetadataStore,
    FileSystemReader, FileSystemWriter, JsonMetadataStore, MemoryDatabase, ObjectTypeInfo,
    ProgressJournal, ProgressLog, RepositoryConfiguration, RepositoryHashManager,
    RepositoryReader, StorageOperations, StoreObjectsByTypeJob, TracingProgress, detect_drift,
    scan_files, scan_locations,
};
use clap::{Parser, Subcommand};
use output::{
    FileHash, HashOutput, InitOutput, JournalEntryInfo, JournalOutput, LsOutput, OutputWriter,
    PutOutput, RESULT_INCOMPLETE, RESULT_OK, ReconcileOutput, RmOutput,
    SnapshotOutput, StatusOutput, StoreOutput,
};
use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// cirepo - file-system repository for continuous integration of database objects
#[derive(Parser)]
#[command(name = "cirepo")]
#[command(about = "File-system repository for continuous integration of database objects", long_about = None)]
#[command(version)]
struct Cli {
    /// Repository root directory (defaults to CIREPO_ROOT env var or the current directory)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Log debug details to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new repository
    Init {
        /// Hash algorithm (blake3-256 or sha256)
        #[arg(long, default_value = "blake3-256")]
        algo: String,

        /// Truncate hashes to this many hex characters
        #[arg(long)]
        hash_length: Option<usize>,

        /// Keep file metadata in sync with the repository
        #[arg(long)]
        file_metadata: bool,

        /// Only these object types belong to the repository
        #[arg(long, value_delimiter = ',')]
        include: Vec<String>,

        /// Object types that never belong to the repository
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,
    },

    /// Write a repository file from a local file or stdin
    Put {
        /// Relative path inside the repository
        path: String,

        /// Source file (reads stdin if omitted)
        #[arg(long)]
        from: Option<PathBuf>,
    },

    /// Output a repository file to stdout
    Cat {
        /// Relative path inside the repository
        path: String,
    },

    /// Print the hash of repository files
    Hash {
        /// Relative paths inside the repository
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Delete a repository file
    Rm {
        /// Relative path inside the repository
        path: String,

        /// Succeed when the file does not exist
        #[arg(short, long)]
        force: bool,
    },

    /// List repository files grouped per object
    Ls {
        /// Show separated field files too
        #[arg(short, long)]
        long: bool,
    },

    /// Compare repository files with the recorded file metadata
    Status,

    /// Record the hash of every repository file as file metadata
    Snapshot,

    /// Serialize all objects of a type from the object database
    Store {
        /// JSON object database
        #[arg(long)]
        db: PathBuf,

        /// Object type name
        #[arg(long = "type")]
        object_type: String,

        /// The type is a many-to-many binding
        #[arg(long)]
        binding: bool,
    },

    /// Delete database objects of a type that are missing from the repository
    Reconcile {
        /// JSON object database
        #[arg(long)]
        db: PathBuf,

        /// Object type name
        #[arg(long = "type")]
        object_type: String,

        /// The type is a many-to-many binding
        #[arg(long)]
        binding: bool,

        /// Report what would be deleted without saving the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Show recent job progress entries
    Journal {
        /// Number of entries to show
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let output = OutputWriter::new(cli.json);

    // Determine repository root: CLI arg > CIREPO_ROOT env var > current directory
    let root = cli
        .root
        .clone()
        .or_else(|| std::env::var("CIREPO_ROOT").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));

    match run(cli.command, &root, &output) {
        Ok(code) => ExitCode::from(code),
        Err(err) => ExitCode::from(output.report_error(&err)),
    }
}

/// Logs go to stderr so stdout stays clean for command output.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn run(command: Commands, root: &Path, output: &OutputWriter) -> Result<u8> {
    match command {
        Commands::Init {
            algo,
            hash_length,
            file_metadata,
            include,
            exclude,
        } => cmd_init(root, &algo, hash_length, file_metadata, include, exclude, output),
        Commands::Put { path, from } => cmd_put(root, &path, from.as_deref(), output),
        Commands::Cat { path } => cmd_cat(root, &path),
        Commands::Hash { paths } => cmd_hash(root, &paths, output),
        Commands::Rm { path, force } => cmd_rm(root, &path, force, output),
        Commands::Ls { long } => cmd_ls(root, long, output),
        Commands::Status => cmd_status(root, output),
        Commands::Snapshot => cmd_snapshot(root, output),
        Commands::Store {
            db,
            object_type,
            binding,
        } => cmd_store(root, &db, &type_info(object_type, binding), output),
        Commands::Reconcile {
            db,
            object_type,
            binding,
            dry_run,
        } => cmd_reconcile(root, &db, &type_info(object_type, binding), dry_run, output),
        Commands::Journal { count } => cmd_journal(root, count, output),
    }
}

fn type_info(name: String, binding: bool) -> ObjectTypeInfo {
    if binding {
        ObjectTypeInfo::binding(name)
    } else {
        ObjectTypeInfo::new(name)
    }
}

/// Everything one command works with: shared configuration and hash manager.
struct Session {
    config: Arc<RepositoryConfiguration>,
    reader: CachedFileSystemReader<FileSystemReader>,
    writer: FileSystemWriter,
}

impl Session {
    fn open(root: &Path) -> Result<Self> {
        debug!(root = %root.display(), "opening repository");
        let config = RepositoryConfiguration::open(root)
            .with_context(|| format!("Failed to open repository at {}", root.display()))?;
        let config = Arc::new(config);
        let hashes = RepositoryHashManager::new(config.crypto());
        let operations = StorageOperations::new(config.clone(), hashes);

        Ok(Self {
            config,
            reader: CachedFileSystemReader::new(FileSystemReader::new(operations.clone())),
            writer: FileSystemWriter::new(operations),
        })
    }

    fn metadata_store(&self) -> Result<JsonMetadataStore> {
        let path = self.config.metadata_path();
        JsonMetadataStore::open(&path)
            .with_context(|| format!("Failed to open file metadata at {}", path.display()))
    }

    /// Push recorded hashes into the file metadata when the repository keeps it.
    fn sync_metadata(&self) -> Result<()> {
        if !self.config.use_file_metadata() {
            return Ok(());
        }
        let mut store = self.metadata_store()?;
        self.writer
            .hashes()
            .flush(&mut store)
            .with_context(|| "Failed to update file metadata")?;
        Ok(())
    }

    fn progress(&self) -> Result<Vec<Box<dyn ProgressLog>>> {
        let path = self.config.journal_path();
        let journal = ProgressJournal::open(&path)
            .with_context(|| format!("Failed to open journal at {}", path.display()))?;
        Ok(vec![Box::new(TracingProgress), Box::new(journal)])
    }
}

fn load_database(path: &Path) -> Result<MemoryDatabase> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read object database {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid object database {}", path.display()))
}

fn save_database(path: &Path, database: &MemoryDatabase) -> Result<()> {
    let json = serde_json::to_vec_pretty(database)?;
    fs::write(path, json)
        .with_context(|| format!("Failed to write object database {}", path.display()))
}

fn cmd_init(
    root: &Path,
    algo: &str,
    hash_length: Option<usize>,
    file_metadata: bool,
    include: Vec<String>,
    exclude: Vec<String>,
    output: &OutputWriter,
) -> Result<u8> {
    let algorithm = Algorithm::parse(algo)?;

    let config = RepositoryConfiguration::new(root)
        .with_algorithm(algorithm)
        .with_hash_length(hash_length)
        .with_file_metadata(file_metadata)
        .with_included_types(include)
        .with_excluded_types(exclude)
        .init()
        .with_context(|| format!("Failed to initialize repository at {}", root.display()))?;

    let data = InitOutput {
        root: root.display().to_string(),
        algorithm: config.algorithm().as_str().to_string(),
        hash_length: config.hash_length(),
        file_metadata: config.use_file_metadata(),
    };
    output.report(RESULT_OK, &data, |data| {
        format!(
            "Initialized repository at {}\nAlgorithm: {}\n",
            data.root, data.algorithm
        )
    })
}

fn cmd_put(root: &Path, path: &str, from: Option<&Path>, output: &OutputWriter) -> Result<u8> {
    let session = Session::open(root)?;

    let content = match from {
        Some(source) => fs::read(source)
            .with_context(|| format!("Failed to read {}", source.display()))?,
        None => {
            let mut buffer = Vec::new();
            io::stdin()
                .read_to_end(&mut buffer)
                .with_context(|| "Failed to read stdin")?;
            buffer
        }
    };

    let hash = session
        .writer
        .write_bytes(path, &content)
        .with_context(|| format!("Failed to write {}", path))?;
    session.sync_metadata()?;

    let data = PutOutput {
        path: path.to_string(),
        bytes: content.len(),
        hash,
    };
    output.report(RESULT_OK, &data, |data| format!("{} {}\n", data.hash, data.path))
}

fn cmd_cat(root: &Path, path: &str) -> Result<u8> {
    let session = Session::open(root)?;

    let content = session
        .reader
        .read_bytes(path)
        .with_context(|| format!("Failed to read {}", path))?;

    let mut stdout = io::stdout().lock();
    stdout.write_all(&content)?;
    stdout.flush()?;
    Ok(RESULT_OK)
}

fn cmd_hash(root: &Path, paths: &[String], output: &OutputWriter) -> Result<u8> {
    let session = Session::open(root)?;

    let mut files = Vec::new();
    for path in paths {
        let hash = session
            .reader
            .file_hash(path)
            .with_context(|| format!("Failed to hash {}", path))?
            .with_context(|| format!("File not found: {}", path))?;
        files.push(FileHash {
            path: path.clone(),
            hash,
        });
    }

    output.report(RESULT_OK, &HashOutput { files }, |data| {
        data.files
            .iter()
            .map(|file| format!("{} {}\n", file.hash, file.path))
            .collect()
    })
}

fn cmd_rm(root: &Path, path: &str, force: bool, output: &OutputWriter) -> Result<u8> {
    let session = Session::open(root)?;

    let deleted = session
        .writer
        .delete_file(path, force)
        .with_context(|| format!("Failed to delete {}", path))?;
    session.sync_metadata()?;

    let data = RmOutput {
        path: path.to_string(),
        deleted,
    };
    output.report(RESULT_OK, &data, |data| {
        if data.deleted {
            format!("Deleted {}\n", data.path)
        } else {
            format!("Not present: {}\n", data.path)
        }
    })
}

fn cmd_ls(root: &Path, long: bool, output: &OutputWriter) -> Result<u8> {
    let session = Session::open(root)?;

    let locations =
        scan_locations(&session.config).with_context(|| "Failed to scan repository")?;

    output.report(RESULT_OK, &LsOutput { locations }, |data| {
        if data.locations.is_empty() {
            return "Repository is empty\n".to_string();
        }
        let mut text = String::new();
        for location in &data.locations {
            for main in location.main() {
                text.push_str(main);
                text.push('\n');
            }
            if long {
                for additional in location.additional() {
                    text.push_str("  + ");
                    text.push_str(additional);
                    text.push('\n');
                }
            }
        }
        text
    })
}

fn cmd_status(root: &Path, output: &OutputWriter) -> Result<u8> {
    let session = Session::open(root)?;
    let store = session.metadata_store()?;

    let files = scan_files(&session.config).with_context(|| "Failed to scan repository")?;
    let drift = detect_drift(&session.reader, &store, &files)
        .with_context(|| "Failed to compare repository with file metadata")?;

    let result_code = if drift.is_clean() {
        RESULT_OK
    } else {
        RESULT_INCOMPLETE
    };
    let data = StatusOutput {
        clean: drift.is_clean(),
        drift,
    };
    output.report(result_code, &data, |data| {
        if data.clean {
            return format!("Clean ({} files)\n", data.drift.unchanged.len());
        }
        let mut text = String::new();
        for path in &data.drift.added {
            text.push_str(&format!("added:    {}\n", path));
        }
        for path in &data.drift.modified {
            text.push_str(&format!("modified: {}\n", path));
        }
        for path in &data.drift.removed {
            text.push_str(&format!("removed:  {}\n", path));
        }
        text
    })
}

fn cmd_snapshot(root: &Path, output: &OutputWriter) -> Result<u8> {
    let session = Session::open(root)?;
    let mut store = session.metadata_store()?;

    let files = scan_files(&session.config).with_context(|| "Failed to scan repository")?;
    for file in &files {
        session
            .reader
            .read_bytes(file)
            .with_context(|| format!("Failed to read {}", file))?;
    }

    // Rows of files that no longer exist are dropped by the flush.
    for row in store.all()? {
        if files.binary_search(&row.location).is_err() {
            session.reader.hashes().remove_hash(&row.location);
        }
    }
    let stats = session
        .reader
        .hashes()
        .flush(&mut store)
        .with_context(|| "Failed to record file metadata")?;

    let data = SnapshotOutput {
        files: files.len(),
        saved: stats.saved,
        removed: stats.removed,
    };
    output.report(RESULT_OK, &data, |data| {
        format!(
            "Recorded {} files ({} stale rows removed)\n",
            data.saved, data.removed
        )
    })
}

fn cmd_store(
    root: &Path,
    db_path: &Path,
    object_type: &ObjectTypeInfo,
    output: &OutputWriter,
) -> Result<u8> {
    let session = Session::open(root)?;
    let database = load_database(db_path)?;
    let progress = session.progress()?;
    let mut store = session.metadata_store()?;

    let report = StoreObjectsByTypeJob::new(
        &session.config,
        &database,
        &session.reader,
        &session.writer,
    )
    .with_progress(&progress)
    .with_metadata_store(&mut store)
    .run(object_type)
    .with_context(|| format!("Failed to store objects of type {}", object_type.name))?;

    output.report(RESULT_OK, &StoreOutput { report }, |data| {
        format!(
            "Stored {}: {} created, {} updated, {} unchanged\n",
            data.report.object_type,
            data.report.created.len(),
            data.report.updated.len(),
            data.report.unchanged
        )
    })
}

fn cmd_reconcile(
    root: &Path,
    db_path: &Path,
    object_type: &ObjectTypeInfo,
    dry_run: bool,
    output: &OutputWriter,
) -> Result<u8> {
    let session = Session::open(root)?;
    let mut database = load_database(db_path)?;
    let progress = session.progress()?;
    let mut store = session.metadata_store()?;

    let existing = scan_locations(&session.config).with_context(|| "Failed to scan repository")?;

    let mut report = DeleteReport::default();
    let outcome = {
        let mut job = DeleteObjectsByTypeJob::new(&session.config, &mut database, &session.reader)
            .with_progress(&progress);
        if !dry_run {
            job = job.with_metadata_store(&mut store);
        }
        job.run_into(object_type, &existing, &mut report)
    };

    // Deletions made before a failure or cancellation are kept.
    if !dry_run {
        save_database(db_path, &database)?;
    }
    outcome.with_context(|| {
        format!(
            "Failed to delete objects of type {} ({} deleted before stopping)",
            object_type.name,
            report.deleted.len()
        )
    })?;

    let result_code = if report.is_complete() {
        RESULT_OK
    } else {
        RESULT_INCOMPLETE
    };
    output.report(result_code, &ReconcileOutput { dry_run, report }, |data| {
        let verb = if data.dry_run { "Would delete" } else { "Deleted" };
        let mut text = format!(
            "{} {} objects of {} ({} kept)\n",
            verb,
            data.report.deleted.len(),
            data.report.object_type,
            data.report.skipped
        );
        for entry in &data.report.not_deleted {
            text.push_str(&format!("not deleted: {} ({})\n", entry.object, entry.message));
        }
        text
    })
}

fn cmd_journal(root: &Path, count: usize, output: &OutputWriter) -> Result<u8> {
    let session = Session::open(root)?;
    let path = session.config.journal_path();
    let journal = ProgressJournal::open(&path)
        .with_context(|| format!("Failed to open journal at {}", path.display()))?;

    let entries: Vec<JournalEntryInfo> = journal
        .read_recent(count)
        .with_context(|| "Failed to read journal")?
        .into_iter()
        .map(JournalEntryInfo::from)
        .collect();

    output.report(RESULT_OK, &JournalOutput { entries }, |data| {
        if data.entries.is_empty() {
            return "No journal entries\n".to_string();
        }
        data.entries
            .iter()
            .map(|entry| {
                format!(
                    "{} {:<7} {:<6} {}\n",
                    entry.timestamp_human, entry.item_type, entry.action, entry.message
                )
            })
            .collect()
    })
}
