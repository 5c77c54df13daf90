use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use notewiki_core::config::load_config;
use notewiki_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, ensure_workspace_ready,
    init_layout, inspect_runtime, resolve_paths,
};
use notewiki_core::tree::{Node, Tree};
use notewiki_core::workspace::Workspace;

#[derive(Debug, Parser)]
#[command(
    name = "notewiki",
    version,
    about = "Wiki-link resolution and indexing over a markdown note corpus"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            root: cli.root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Materialize the .notewiki/ state directory and config")]
    Init(InitArgs),
    #[command(about = "Inspect the runtime layout and corpus")]
    Status,
    #[command(about = "Print the corpus tree")]
    Tree(TreeArgs),
    #[command(about = "Resolve one link label from a referencing document")]
    Resolve(ResolveArgs),
    #[command(about = "Link index queries for one document")]
    Links(LinksArgs),
    #[command(about = "List link-target completion candidates")]
    Completions(CompletionsArgs),
    #[command(about = "Render a document to HTML with wiki-link anchors")]
    Render(RenderArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config file")]
    force: bool,
}

#[derive(Debug, Args)]
struct TreeArgs {
    #[arg(long, help = "Emit the tree as JSON")]
    json: bool,
}

#[derive(Debug, Args)]
struct ResolveArgs {
    label: String,
    #[arg(long, value_name = "DOC", help = "Canonical path of the referencing document")]
    from: String,
}

#[derive(Debug, Args)]
struct LinksArgs {
    #[command(subcommand)]
    command: LinksSubcommand,
}

#[derive(Debug, Subcommand)]
enum LinksSubcommand {
    #[command(about = "Outgoing links of a document, resolved")]
    Outgoing { doc: String },
    #[command(about = "Documents whose links resolve to the given document")]
    Incoming { doc: String },
    #[command(about = "Recognized link spans with navigation targets")]
    Spans { doc: String },
}

#[derive(Debug, Args)]
struct CompletionsArgs {
    #[arg(long, value_name = "TEXT", help = "Line text before the cursor; gates and filters candidates")]
    line: Option<String>,
}

#[derive(Debug, Args)]
struct RenderArgs {
    doc: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Status) => run_status(&runtime).await,
        Some(Commands::Tree(args)) => run_tree(&runtime, args).await,
        Some(Commands::Resolve(args)) => run_resolve(&runtime, args).await,
        Some(Commands::Links(LinksArgs { command })) => match command {
            LinksSubcommand::Outgoing { doc } => run_links_outgoing(&runtime, &doc).await,
            LinksSubcommand::Incoming { doc } => run_links_incoming(&runtime, &doc).await,
            LinksSubcommand::Spans { doc } => run_links_spans(&runtime, &doc).await,
        },
        Some(Commands::Completions(args)) => run_completions(&runtime, args).await,
        Some(Commands::Render(args)) => run_render(&runtime, args).await,
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
    let report = init_layout(
        &paths,
        &InitOptions {
            materialize_config: true,
            force: args.force,
        },
    )?;

    println!("Initialized notewiki runtime layout");
    println!("root: {}", normalize_path(&paths.root));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", report.wrote_config);
    print_diagnostics(runtime, &paths);

    Ok(())
}

async fn run_status(runtime: &RuntimeOptions) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let status = inspect_runtime(&paths);

    println!("runtime status");
    println!("root: {} ({})", normalize_path(&paths.root), paths.root_source.as_str());
    println!("root_exists: {}", format_flag(status.root_exists));
    println!("state_dir_exists: {}", format_flag(status.state_dir_exists));
    println!("config_exists: {}", format_flag(status.config_exists));

    if status.root_exists {
        let workspace = open_workspace(&paths)?;
        let tree = workspace.ensure_tree().await?;
        let (documents, folders) = count_nodes(&tree);
        println!("corpus.extension: {}", workspace.doc_extension());
        println!("corpus.documents: {documents}");
        println!("corpus.folders: {folders}");
    }

    if !status.warnings.is_empty() {
        println!("warnings:");
        for warning in &status.warnings {
            println!("  - {warning}");
        }
    }
    print_diagnostics(runtime, &paths);

    Ok(())
}

#[derive(Debug, Serialize)]
struct NodeReport {
    name: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    children: Option<Vec<NodeReport>>,
}

fn node_report(node: &Node) -> NodeReport {
    match node {
        Node::Document { name, .. } => NodeReport {
            name: name.clone(),
            kind: "document",
            children: None,
        },
        Node::Folder { name, children } => NodeReport {
            name: name.clone(),
            kind: "folder",
            children: Some(children.nodes.iter().map(node_report).collect()),
        },
    }
}

async fn run_tree(runtime: &RuntimeOptions, args: TreeArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let workspace = ready_workspace(&paths)?;
    let tree = workspace.ensure_tree().await?;

    if args.json {
        let report: Vec<NodeReport> = tree.nodes.iter().map(node_report).collect();
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("corpus tree ({})", normalize_path(&paths.root));
        print_tree(&tree, 0);
    }
    print_diagnostics(runtime, &paths);

    Ok(())
}

fn print_tree(tree: &Tree, depth: usize) {
    let indent = depth * 2;
    for node in &tree.nodes {
        match node {
            Node::Document { name, .. } => println!("{:indent$}{name}", ""),
            Node::Folder { name, children } => {
                println!("{:indent$}{name}/", "");
                print_tree(children, depth + 1);
            }
        }
    }
}

async fn run_resolve(runtime: &RuntimeOptions, args: ResolveArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let workspace = ready_workspace(&paths)?;
    let from = canonical_doc_arg(&args.from);
    let canonical = workspace.resolve_label(&args.label, &from).await?;

    println!("resolve");
    println!("label: {}", args.label);
    println!("from: {from}");
    println!("canonical: {canonical}");
    print_diagnostics(runtime, &paths);

    Ok(())
}

async fn run_links_outgoing(runtime: &RuntimeOptions, doc: &str) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let workspace = ready_workspace(&paths)?;
    let doc = canonical_doc_arg(doc);
    let links = workspace.outgoing_links(&doc).await?;

    println!("links outgoing");
    println!("doc: {doc}");
    println!("outgoing.count: {}", links.len());
    if links.is_empty() {
        println!("outgoing: <none>");
    } else {
        for link in links {
            println!("outgoing.link: {} -> {}", link.raw_label, link.canonical_path);
        }
    }
    print_diagnostics(runtime, &paths);

    Ok(())
}

async fn run_links_incoming(runtime: &RuntimeOptions, doc: &str) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let workspace = ready_workspace(&paths)?;
    let doc = canonical_doc_arg(doc);
    let sources = workspace.incoming_links(&doc).await?;

    println!("links incoming");
    println!("doc: {doc}");
    println!("incoming.count: {}", sources.len());
    if sources.is_empty() {
        println!("incoming: <none>");
    } else {
        for source in sources {
            println!("incoming.source: {source}");
        }
    }
    print_diagnostics(runtime, &paths);

    Ok(())
}

async fn run_links_spans(runtime: &RuntimeOptions, doc: &str) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let workspace = ready_workspace(&paths)?;
    let doc = canonical_doc_arg(doc);
    let links = workspace.navigable_links(&doc).await?;

    println!("links spans");
    println!("doc: {doc}");
    println!("spans.count: {}", links.len());
    for link in links {
        println!(
            "spans.link: {} @ {}:{}-{} -> {}",
            link.raw_label,
            link.span.line,
            link.span.start_column,
            link.span.end_column,
            normalize_path(&link.target)
        );
    }
    print_diagnostics(runtime, &paths);

    Ok(())
}

async fn run_completions(runtime: &RuntimeOptions, args: CompletionsArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let workspace = ready_workspace(&paths)?;
    let candidates = workspace
        .completion_candidates(args.line.as_deref())
        .await?;

    println!("completions");
    println!("candidates.count: {}", candidates.len());
    if candidates.is_empty() {
        println!("candidates: <none>");
    } else {
        for candidate in candidates {
            println!("candidates.label: {candidate}");
        }
    }
    print_diagnostics(runtime, &paths);

    Ok(())
}

async fn run_render(runtime: &RuntimeOptions, args: RenderArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let workspace = ready_workspace(&paths)?;
    let doc = canonical_doc_arg(&args.doc);
    let rendered = workspace.render_document(&doc).await?;

    println!("{}", rendered.html);

    Ok(())
}

fn ready_workspace(paths: &ResolvedPaths) -> Result<Workspace> {
    let status = inspect_runtime(paths);
    ensure_workspace_ready(paths, &status)?;
    open_workspace(paths)
}

fn open_workspace(paths: &ResolvedPaths) -> Result<Workspace> {
    let config = load_config(&paths.config_path)?;
    Workspace::open(paths.root.clone(), &config)
        .with_context(|| format!("failed to open corpus at {}", paths.root.display()))
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        root: runtime.root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let root_env = initial.root.join(".env");
    if root_env.exists() {
        let _ = dotenvy::from_path_override(&root_env);
    }

    resolve_paths(&context, &overrides)
}

fn count_nodes(tree: &Tree) -> (usize, usize) {
    let mut documents = 0;
    let mut folders = 0;
    for node in &tree.nodes {
        match node {
            Node::Document { .. } => documents += 1,
            Node::Folder { children, .. } => {
                folders += 1;
                let (inner_docs, inner_folders) = count_nodes(children);
                documents += inner_docs;
                folders += inner_folders;
            }
        }
    }
    (documents, folders)
}

fn canonical_doc_arg(doc: &str) -> String {
    if doc.starts_with('/') {
        doc.to_string()
    } else {
        format!("/{doc}")
    }
}

fn print_diagnostics(runtime: &RuntimeOptions, paths: &ResolvedPaths) {
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
