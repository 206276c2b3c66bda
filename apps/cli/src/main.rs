use std::env;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use curator_import::{
    scan_paths, DecisionPoint, DuplicateAction, HiddenFileAction, ImportDecisions,
    IrregularNameAction,
};
use curator_manifest::{modified_timestamp, FilenameColumn};
use curator_session::{
    CuratorSettings, DatasetSession, ImportOutcome, MetadataKind, SessionStore, SettingsStore,
};
use curator_structure::{ProjectionKind, PruneOutcome};
use curator_tree::{Classification, DatasetPath, RenameNotice, WalkOptions};
use tracing::debug;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "CURATOR_LOG";
const STATE_DIR: &str = ".curator";

#[derive(Parser)]
#[command(
    name = "curator-cli",
    about = "Curate a dataset as a virtual folder tree before upload",
    author,
    version
)]
struct Cli {
    /// Workspace root (defaults to current directory).  
    /// 指定工作區根目錄；預設為目前目錄。
    #[arg(long, global = true, value_name = "PATH")]
    workspace: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a new dataset session.  
    /// 建立新的資料集工作階段。
    Init(InitArgs),
    /// List or select the top-level classification folders.  
    /// 列出或選擇分類資料夾。
    Classifications(ClassificationsArgs),
    /// Create an empty folder.  
    /// 建立資料夾。
    Mkdir(MkdirArgs),
    /// Import files and folders from disk.  
    /// 匯入檔案與資料夾。
    Import(ImportArgs),
    /// Rename a file or folder.  
    /// 重新命名。
    Rename(RenameArgs),
    /// Move a file or folder under another folder.  
    /// 移動。
    Mv(MoveArgs),
    /// Mark a file or folder deleted.  
    /// 標記刪除。
    Rm(PathArg),
    /// Undo a deletion mark.  
    /// 還原刪除。
    Restore(PathArg),
    /// Drop deleted entries below a path for good.  
    /// 永久移除已刪除項目。
    Purge(PathArg),
    /// Print the dataset tree.  
    /// 顯示資料集樹。
    Tree(TreeArgs),
    /// Count files and folders.  
    /// 統計檔案與資料夾數量。
    Stats(OptionalPathArg),
    /// Set a file's description or additional metadata.  
    /// 設定檔案描述。
    Describe(DescribeArgs),
    /// Manage subjects.  
    /// 管理受試者。
    #[command(subcommand)]
    Subject(SubjectCommand),
    /// Manage samples.  
    /// 管理樣本。
    #[command(subcommand)]
    Sample(SampleCommand),
    /// Manage subject pools.  
    /// 管理受試者群組。
    #[command(subcommand)]
    Pool(PoolCommand),
    /// Mirror subjects and samples into a classification.  
    /// 投影受試者結構到分類資料夾。
    Project(ProjectArgs),
    /// Remove empty subject or sample folders.  
    /// 清除空的投影資料夾。
    Prune(PruneArgs),
    /// Generate, inspect and edit manifests.  
    /// 管理清單。
    #[command(subcommand)]
    Manifest(ManifestCommand),
    /// Attach or detach dataset metadata files.  
    /// 管理描述檔。
    #[command(subcommand)]
    Metadata(MetadataCommand),
    /// Write the upload document.  
    /// 匯出上傳文件。
    Export(ExportArgs),
}

#[derive(Args)]
struct InitArgs {
    /// Dataset name.  
    /// 資料集名稱。
    name: String,
    /// Classification folders to create.  
    /// 要建立的分類資料夾。
    #[arg(long = "classification", short = 'c', value_name = "NAME")]
    classifications: Vec<Classification>,
    /// Replace an existing session.  
    /// 覆寫既有工作階段。
    #[arg(long)]
    force: bool,
}

#[derive(Args)]
struct ClassificationsArgs {
    /// Classifications to keep; unselected ones are removed with their content.  
    /// 保留的分類；未選者連同內容一併移除。
    #[arg(value_name = "NAME")]
    select: Vec<Classification>,
}

#[derive(Args)]
struct MkdirArgs {
    /// Parent folder.  
    /// 上層資料夾。
    parent: String,
    /// Name of the new folder.  
    /// 新資料夾名稱。
    name: String,
}

#[derive(Args)]
struct ImportArgs {
    /// Destination folder inside the dataset.  
    /// 目的資料夾。
    destination: String,
    /// Files or directories on disk.  
    /// 要匯入的檔案或資料夾。
    #[arg(required = true, value_name = "PATH")]
    sources: Vec<PathBuf>,
    #[arg(long, value_enum, value_name = "ACTION")]
    irregular_names: Option<IrregularNameChoice>,
    #[arg(long, value_enum, value_name = "ACTION")]
    hidden_files: Option<HiddenFileChoice>,
    #[arg(long, value_enum, value_name = "ACTION")]
    duplicate_files: Option<DuplicateChoice>,
    #[arg(long, value_enum, value_name = "ACTION")]
    duplicate_folders: Option<DuplicateChoice>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum IrregularNameChoice {
    Replace,
    Strip,
    Cancel,
}

impl From<IrregularNameChoice> for IrregularNameAction {
    fn from(choice: IrregularNameChoice) -> Self {
        match choice {
            IrregularNameChoice::Replace => IrregularNameAction::Replace,
            IrregularNameChoice::Strip => IrregularNameAction::Strip,
            IrregularNameChoice::Cancel => IrregularNameAction::Cancel,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum HiddenFileChoice {
    #[value(alias = "strip")]
    StripMarker,
    #[value(alias = "keep")]
    KeepName,
}

impl From<HiddenFileChoice> for HiddenFileAction {
    fn from(choice: HiddenFileChoice) -> Self {
        match choice {
            HiddenFileChoice::StripMarker => HiddenFileAction::StripMarker,
            HiddenFileChoice::KeepName => HiddenFileAction::KeepName,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum DuplicateChoice {
    #[value(alias = "skip")]
    SkipAll,
    #[value(alias = "replace")]
    ReplaceAll,
    KeepBoth,
    Cancel,
}

impl From<DuplicateChoice> for DuplicateAction {
    fn from(choice: DuplicateChoice) -> Self {
        match choice {
            DuplicateChoice::SkipAll => DuplicateAction::SkipAll,
            DuplicateChoice::ReplaceAll => DuplicateAction::ReplaceAll,
            DuplicateChoice::KeepBoth => DuplicateAction::KeepBoth,
            DuplicateChoice::Cancel => DuplicateAction::Cancel,
        }
    }
}

#[derive(Args)]
struct RenameArgs {
    path: String,
    new_name: String,
}

#[derive(Args)]
struct MoveArgs {
    path: String,
    /// New parent folder.  
    /// 新的上層資料夾。
    destination: String,
}

#[derive(Args)]
struct PathArg {
    path: String,
}

#[derive(Args)]
struct OptionalPathArg {
    /// Defaults to the whole dataset.  
    /// 預設為整個資料集。
    path: Option<String>,
}

#[derive(Args)]
struct TreeArgs {
    path: Option<String>,
    /// Include entries marked deleted.  
    /// 一併顯示已刪除項目。
    #[arg(long)]
    all: bool,
}

#[derive(Args)]
struct DescribeArgs {
    path: String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long, value_name = "TEXT")]
    additional_metadata: Option<String>,
}

#[derive(Subcommand)]
enum SubjectCommand {
    /// Register a subject.  
    /// 新增受試者。
    Add {
        name: String,
        #[arg(long)]
        pool: Option<String>,
    },
    Rename {
        old: String,
        new: String,
    },
    /// Remove a subject and its folders.  
    /// 刪除受試者及其資料夾。
    Rm { name: String },
    /// Move a subject into a pool.  
    /// 移入群組。
    Group { name: String, pool: String },
    /// Move a subject out of its pool.  
    /// 移出群組。
    Ungroup { name: String },
    List,
}

#[derive(Subcommand)]
enum SampleCommand {
    Add {
        subject: String,
        name: String,
    },
    Rename {
        subject: String,
        old: String,
        new: String,
    },
    Rm {
        subject: String,
        name: String,
    },
}

#[derive(Subcommand)]
enum PoolCommand {
    Add { name: String },
    Rename { old: String, new: String },
    /// Remove a pool; its subjects are kept.  
    /// 刪除群組；成員受試者保留。
    Rm { name: String },
}

#[derive(Args)]
struct ProjectArgs {
    classification: Classification,
}

#[derive(Args)]
struct PruneArgs {
    classification: Classification,
    #[arg(long, value_enum, default_value_t = PruneKind::Samples)]
    kind: PruneKind,
    /// Delete instead of listing.  
    /// 實際刪除；否則僅列出。
    #[arg(long)]
    yes: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PruneKind {
    Subjects,
    Samples,
}

impl From<PruneKind> for ProjectionKind {
    fn from(kind: PruneKind) -> Self {
        match kind {
            PruneKind::Subjects => ProjectionKind::Subjects,
            PruneKind::Samples => ProjectionKind::Samples,
        }
    }
}

#[derive(Subcommand)]
enum ManifestCommand {
    /// Regenerate every manifest from the tree.  
    /// 重新產生所有清單。
    Generate,
    /// Print a manifest as tab-separated values.  
    /// 顯示清單（TSV）。
    Show { classification: Classification },
    /// Set one cell of a manifest.  
    /// 設定單一儲存格。
    Set {
        classification: Classification,
        filename: String,
        column: String,
        value: String,
    },
}

#[derive(Subcommand)]
enum MetadataCommand {
    Attach {
        kind: MetadataKind,
        #[arg(value_name = "FILE")]
        source: PathBuf,
    },
    Detach {
        kind: MetadataKind,
    },
    List,
}

#[derive(Args)]
struct ExportArgs {
    /// Destination file path.  
    /// 輸出檔案路徑。
    #[arg(long, value_name = "FILE")]
    output: PathBuf,
}

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .without_time()
        .init();
}

struct Workspace {
    sessions: SessionStore,
    settings: CuratorSettings,
}

impl Workspace {
    fn open(root: &Path) -> Result<Self> {
        let settings_path = root.join(STATE_DIR).join("settings.json");
        let settings = SettingsStore::load(&settings_path)
            .with_context(|| format!("failed to load settings from {}", settings_path.display()))?
            .settings()
            .clone();
        Ok(Self {
            sessions: SessionStore::new(root.join(STATE_DIR).join("session.json")),
            settings,
        })
    }

    fn load(&self) -> Result<DatasetSession> {
        self.sessions
            .load()
            .with_context(|| format!("failed to load {}", self.sessions.path().display()))?
            .ok_or_else(|| {
                anyhow!(
                    "no dataset session at {}; run `curator-cli init` first",
                    self.sessions.path().display()
                )
            })
    }

    fn save(&self, session: &DatasetSession) -> Result<()> {
        self.sessions
            .save(session)
            .with_context(|| format!("failed to save {}", self.sessions.path().display()))
    }

    fn filename_column(&self) -> FilenameColumn {
        self.settings.manifest.filename_column
    }

    /// Loads the session, runs `op` and saves the result.
    fn edit<F>(&self, op: F) -> Result<()>
    where
        F: FnOnce(&mut DatasetSession) -> Result<()>,
    {
        let mut session = self.load()?;
        op(&mut session)?;
        self.save(&session)
    }
}

fn run() -> Result<()> {
    let Cli { workspace, command } = Cli::parse();
    let root = resolve_workspace(workspace)?;
    let ws = Workspace::open(&root)?;
    debug!(workspace = %root.display(), "workspace opened");
    match command {
        Commands::Init(args) => init_session(args, &ws),
        Commands::Classifications(args) => execute_classifications(args, &ws),
        Commands::Mkdir(args) => ws.edit(|session| {
            let created = session
                .tree_mut()
                .create_container(&dataset_path(&args.parent), &args.name)?;
            println!("Created {created}");
            Ok(())
        }),
        Commands::Import(args) => execute_import(args, &ws),
        Commands::Rename(args) => ws.edit(|session| {
            let path = dataset_path(&args.path);
            match session.rename(&path, &args.new_name, ws.filename_column())? {
                Some(notice) => println!("Renamed {} -> {}", notice.from, notice.to),
                None => println!("{path} already has that name"),
            }
            Ok(())
        }),
        Commands::Mv(args) => ws.edit(|session| {
            let moved = session.move_node(
                &dataset_path(&args.path),
                &dataset_path(&args.destination),
                ws.filename_column(),
            )?;
            println!("Moved to {moved}");
            Ok(())
        }),
        Commands::Rm(args) => ws.edit(|session| {
            let path = dataset_path(&args.path);
            let tag = session.tree_mut().soft_delete(&path)?;
            println!("Marked {path} {}", tag.as_str());
            Ok(())
        }),
        Commands::Restore(args) => ws.edit(|session| {
            let path = dataset_path(&args.path);
            if session.tree_mut().restore(&path)? {
                println!("Restored {path}");
            } else {
                println!("{path} was not deleted");
            }
            Ok(())
        }),
        Commands::Purge(args) => ws.edit(|session| {
            let count = session.tree_mut().purge(&dataset_path(&args.path))?;
            println!("Purged {count} deleted entries");
            Ok(())
        }),
        Commands::Tree(args) => print_tree(args, &ws),
        Commands::Stats(args) => {
            let session = ws.load()?;
            let path = optional_path(args.path.as_deref());
            let stats = session.tree().stats(&path)?;
            println!("files: {}", stats.files);
            println!("folders: {}", stats.folders);
            Ok(())
        }
        Commands::Describe(args) => execute_describe(args, &ws),
        Commands::Subject(command) => execute_subject(command, &ws),
        Commands::Sample(command) => execute_sample(command, &ws),
        Commands::Pool(command) => execute_pool(command, &ws),
        Commands::Project(args) => ws.edit(|session| {
            let ensured = session.project(args.classification)?;
            println!(
                "Projected {} folders into {}",
                ensured.len(),
                args.classification
            );
            Ok(())
        }),
        Commands::Prune(args) => execute_prune(args, &ws),
        Commands::Manifest(command) => execute_manifest(command, &ws),
        Commands::Metadata(command) => execute_metadata(command, &ws),
        Commands::Export(args) => {
            let session = ws.load()?;
            let missing = session.metadata_files().missing_required();
            if !missing.is_empty() {
                let names: Vec<String> = missing.iter().map(ToString::to_string).collect();
                eprintln!("Warning: missing metadata files: {}", names.join(", "));
            }
            let output = resolve_input_path(&args.output)?;
            ws.sessions
                .export(&session, &output)
                .with_context(|| format!("failed to export to {}", output.display()))?;
            println!("Exported {} to {}", session.name(), output.display());
            Ok(())
        }
    }
}

fn init_session(args: InitArgs, ws: &Workspace) -> Result<()> {
    if !args.force && ws.sessions.load()?.is_some() {
        bail!(
            "a dataset session already exists at {}; pass --force to replace it",
            ws.sessions.path().display()
        );
    }
    let mut session = DatasetSession::new(args.name);
    session.select_classifications(&args.classifications);
    ws.save(&session)?;
    println!(
        "Initialized dataset '{}' at {}",
        session.name(),
        ws.sessions.path().display()
    );
    Ok(())
}

fn execute_classifications(args: ClassificationsArgs, ws: &Workspace) -> Result<()> {
    let mut session = ws.load()?;
    if !args.select.is_empty() {
        for dropped in session.select_classifications(&args.select) {
            println!("Removed {dropped}");
        }
        ws.save(&session)?;
    }
    for classification in session.tree().classifications() {
        println!("{classification}");
    }
    Ok(())
}

fn execute_import(args: ImportArgs, ws: &Workspace) -> Result<()> {
    let mut session = ws.load()?;
    let sources = args
        .sources
        .iter()
        .map(|path| resolve_input_path(path))
        .collect::<Result<Vec<_>>>()?;
    for source in &sources {
        if !source.exists() {
            bail!("import source '{}' does not exist", source.display());
        }
    }
    let entries = scan_paths(&sources)?;
    let decisions = ImportDecisions {
        irregular_names: args.irregular_names.map(Into::into),
        hidden_files: args.hidden_files.map(Into::into),
        duplicate_files: args.duplicate_files.map(Into::into),
        duplicate_folders: args.duplicate_folders.map(Into::into),
    }
    .or(ws.settings.import.defaults);

    let destination = dataset_path(&args.destination);
    let reconciler = ws.settings.reconciler();
    match session.import(&reconciler, &destination, &entries, &decisions)? {
        ImportOutcome::NeedsDecisions(points) => {
            for point in &points {
                eprintln!("{}", describe_decision(point));
            }
            bail!("import needs decisions; rerun with the flags above");
        }
        ImportOutcome::Cancelled => {
            println!("Import cancelled; nothing changed");
            Ok(())
        }
        ImportOutcome::Imported(report) => {
            ws.save(&session)?;
            println!(
                "Imported {} files into {destination} ({} new, {} replaced, {} unchanged, {} skipped)",
                report.files,
                report.imported.len(),
                report.replaced.len(),
                report.unchanged,
                report.skipped.len()
            );
            for renamed in &report.renamed {
                println!("  {} -> {}", renamed.original, renamed.path);
            }
            Ok(())
        }
    }
}

fn describe_decision(point: &DecisionPoint) -> String {
    let (flag, names) = match point {
        DecisionPoint::IrregularNames(names) => ("--irregular-names <replace|strip|cancel>", names),
        DecisionPoint::HiddenFiles(names) => ("--hidden-files <strip-marker|keep-name>", names),
        DecisionPoint::DuplicateFiles(names) => {
            ("--duplicate-files <skip-all|replace-all|keep-both|cancel>", names)
        }
        DecisionPoint::DuplicateFolders(names) => {
            ("--duplicate-folders <skip-all|replace-all|keep-both|cancel>", names)
        }
    };
    format!("{flag}: {}", names.join(", "))
}

fn print_tree(args: TreeArgs, ws: &Workspace) -> Result<()> {
    let session = ws.load()?;
    let base = optional_path(args.path.as_deref());
    let options = WalkOptions {
        include_deleted: args.all,
    };
    if base.is_root() {
        println!("{}", session.name());
    } else {
        println!("{base}");
    }
    for (path, node) in session.tree().walk_with(&base, options)? {
        let depth = path.depth() - base.depth();
        let mut line = format!("{}{}", "  ".repeat(depth), node.name());
        if node.is_container() {
            line.push('/');
        }
        if node.is_soft_deleted() {
            line.push_str(" [deleted]");
        }
        println!("{line}");
    }
    Ok(())
}

fn execute_describe(args: DescribeArgs, ws: &Workspace) -> Result<()> {
    if args.description.is_none() && args.additional_metadata.is_none() {
        bail!("nothing to set; pass --description and/or --additional-metadata");
    }
    ws.edit(|session| {
        let path = dataset_path(&args.path);
        if let Some(description) = &args.description {
            session
                .tree_mut()
                .set_leaf_description(&path, description.as_str())?;
        }
        if let Some(metadata) = &args.additional_metadata {
            session.tree_mut().set_leaf_metadata(&path, metadata.as_str())?;
        }
        println!("Updated {path}");
        Ok(())
    })
}

fn execute_subject(command: SubjectCommand, ws: &Workspace) -> Result<()> {
    let mode = ws.filename_column();
    match command {
        SubjectCommand::Add { name, pool } => ws.edit(|session| {
            session.registry_mut().add_subject(&name, pool.as_deref())?;
            session.reproject()?;
            println!("Added subject {name}");
            Ok(())
        }),
        SubjectCommand::Rename { old, new } => ws.edit(|session| {
            let notices = session.projector().rename_subject(&old, &new)?;
            migrate_manifest_keys(session, &notices, mode);
            println!("Renamed subject {old} -> {new}");
            Ok(())
        }),
        SubjectCommand::Rm { name } => ws.edit(|session| {
            let removed = session.projector().delete_subject(&name)?;
            println!("Removed subject {name} ({} folders)", removed.len());
            Ok(())
        }),
        SubjectCommand::Group { name, pool } => ws.edit(|session| {
            let moved = session.projector().move_subject_into_pool(&name, &pool)?;
            migrate_manifest_keys(session, &moved, mode);
            println!("Moved {name} into {pool}");
            Ok(())
        }),
        SubjectCommand::Ungroup { name } => ws.edit(|session| {
            let pool = session
                .registry()
                .subject(&name)
                .ok_or_else(|| anyhow!("unknown subject '{name}'"))?
                .pool
                .clone()
                .ok_or_else(|| anyhow!("subject '{name}' is not in a pool"))?;
            let moved = session.projector().move_subject_out_of_pool(&name, &pool)?;
            migrate_manifest_keys(session, &moved, mode);
            println!("Moved {name} out of {pool}");
            Ok(())
        }),
        SubjectCommand::List => {
            let session = ws.load()?;
            for (name, record) in session.registry().subjects() {
                let samples: Vec<&str> = record.samples.keys().map(String::as_str).collect();
                match &record.pool {
                    Some(pool) => println!("{pool}/{name}: {}", samples.join(", ")),
                    None => println!("{name}: {}", samples.join(", ")),
                }
            }
            Ok(())
        }
    }
}

fn execute_sample(command: SampleCommand, ws: &Workspace) -> Result<()> {
    let mode = ws.filename_column();
    match command {
        SampleCommand::Add { subject, name } => ws.edit(|session| {
            session.registry_mut().add_sample(&subject, &name)?;
            session.reproject()?;
            println!("Added sample {subject}/{name}");
            Ok(())
        }),
        SampleCommand::Rename { subject, old, new } => ws.edit(|session| {
            let notices = session.projector().rename_sample(&subject, &old, &new)?;
            migrate_manifest_keys(session, &notices, mode);
            println!("Renamed sample {subject}/{old} -> {new}");
            Ok(())
        }),
        SampleCommand::Rm { subject, name } => ws.edit(|session| {
            let removed = session.projector().delete_sample(&subject, &name)?;
            println!("Removed sample {subject}/{name} ({} folders)", removed.len());
            Ok(())
        }),
    }
}

fn execute_pool(command: PoolCommand, ws: &Workspace) -> Result<()> {
    let mode = ws.filename_column();
    match command {
        PoolCommand::Add { name } => ws.edit(|session| {
            session.registry_mut().add_pool(&name)?;
            println!("Added pool {name}");
            Ok(())
        }),
        PoolCommand::Rename { old, new } => ws.edit(|session| {
            let notices = session.projector().rename_pool(&old, &new)?;
            migrate_manifest_keys(session, &notices, mode);
            println!("Renamed pool {old} -> {new}");
            Ok(())
        }),
        PoolCommand::Rm { name } => ws.edit(|session| {
            let removal = session.delete_pool(&name, mode)?;
            for notice in &removal.relocated {
                debug!(from = %notice.from, to = %notice.to, "projection renamed");
            }
            println!("Removed pool {name} ({} subjects released)", removal.relocated.len());
            Ok(())
        }),
    }
}

fn migrate_manifest_keys(session: &mut DatasetSession, notices: &[RenameNotice], mode: FilenameColumn) {
    session.apply_renames(notices, mode);
    for notice in notices {
        debug!(from = %notice.from, to = %notice.to, "projection renamed");
    }
}

fn execute_prune(args: PruneArgs, ws: &Workspace) -> Result<()> {
    ws.edit(|session| {
        let outcome = session.projector().prune_empty_projections(
            args.classification,
            args.kind.into(),
            args.yes,
        )?;
        match outcome {
            PruneOutcome::Pending(paths) if paths.is_empty() => {
                println!("No empty folders");
            }
            PruneOutcome::Pending(paths) => {
                for path in &paths {
                    println!("{path}");
                }
                println!("{} empty folders; rerun with --yes to delete them", paths.len());
            }
            PruneOutcome::Deleted(paths) => {
                println!("Deleted {} empty folders", paths.len());
            }
        }
        Ok(())
    })
}

fn execute_manifest(command: ManifestCommand, ws: &Workspace) -> Result<()> {
    match command {
        ManifestCommand::Generate => ws.edit(|session| {
            let present =
                session.regenerate_manifests(&ws.settings.synthesizer(), modified_timestamp)?;
            for classification in &present {
                let rows = session
                    .manifests()
                    .get(*classification)
                    .map_or(0, |manifest| manifest.data.len());
                println!("{classification}: {rows} rows");
            }
            if present.is_empty() {
                println!("No files to inventory");
            }
            Ok(())
        }),
        ManifestCommand::Show { classification } => {
            let session = ws.load()?;
            let manifest = session
                .manifests()
                .get(classification)
                .ok_or_else(|| anyhow!("no manifest for {classification}; run `manifest generate`"))?;
            println!("{}", manifest.headers.join("\t"));
            for row in &manifest.data {
                println!("{}", row.join("\t"));
            }
            Ok(())
        }
        ManifestCommand::Set {
            classification,
            filename,
            column,
            value,
        } => ws.edit(|session| {
            let manifest = session
                .manifests_mut()
                .get_mut(classification)
                .ok_or_else(|| anyhow!("no manifest for {classification}"))?;
            if !manifest.set_cell(&filename, &column, &value) {
                bail!("no cell '{column}' for '{filename}' in the {classification} manifest");
            }
            println!("Set {column} of {filename}");
            Ok(())
        }),
    }
}

fn execute_metadata(command: MetadataCommand, ws: &Workspace) -> Result<()> {
    match command {
        MetadataCommand::Attach { kind, source } => ws.edit(|session| {
            let source = resolve_input_path(&source)?;
            if !source.is_file() {
                bail!("metadata file '{}' does not exist", source.display());
            }
            let name = session.attach_metadata_file(kind, &source)?;
            println!("Attached {name}");
            Ok(())
        }),
        MetadataCommand::Detach { kind } => ws.edit(|session| {
            let count = session.detach_metadata_file(kind);
            println!("Detached {count} {kind} files");
            Ok(())
        }),
        MetadataCommand::List => {
            let session = ws.load()?;
            for (name, file) in session.metadata_files().iter() {
                let state = if file.is_deleted() { " [deleted]" } else { "" };
                println!("{name}{state}");
            }
            for kind in session.metadata_files().missing_required() {
                println!("missing: {kind}");
            }
            Ok(())
        }
    }
}

fn dataset_path(text: &str) -> DatasetPath {
    DatasetPath::parse(text)
}

fn optional_path(text: Option<&str>) -> DatasetPath {
    text.map(dataset_path).unwrap_or_else(DatasetPath::root)
}

fn resolve_workspace(workspace: Option<PathBuf>) -> Result<PathBuf> {
    match workspace {
        Some(path) => resolve_input_path(&path),
        None => env::current_dir().context("determine current directory"),
    }
}

fn resolve_input_path(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(env::current_dir()
            .context("determine current directory")?
            .join(path))
    }
}
