use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use tracing::debug;

use arbor_index::paths::{node_file_path, references_file_path};
use arbor_index::{node_folder_path, InMemoryStringIndex, StringIndex};
use arbor_persistence::{BundlePersistenceManager, FileSystemBackend, PersistenceConfig};
use arbor_types::{InternalValue, NodeId, PropertyId, PropertyState};

use crate::cli::*;

/// Number of leading bytes shown for binary values.
const BINARY_PREVIEW: usize = 16;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Command::Path(args) => cmd_path(args, cli.format),
        Command::Show(args) => cmd_show(args, cli.format),
        Command::Check(args) => cmd_check(args, cli.format),
        Command::Index(args) => cmd_index(args, cli.format),
    }
}

fn parse_id(text: &str) -> anyhow::Result<NodeId> {
    NodeId::parse(text).with_context(|| format!("invalid node id {text:?}"))
}

struct Repo {
    backend: Arc<FileSystemBackend>,
    manager: BundlePersistenceManager,
}

fn open_repo(args: &RepoArgs) -> anyhow::Result<Repo> {
    let mut config = match &args.config {
        Some(path) => PersistenceConfig::load(path)?,
        None => PersistenceConfig::default(),
    };
    if let Some(size) = &args.cache_size {
        config.set_bundle_cache_size(size)?;
    }
    let registry = Arc::new(InMemoryStringIndex::namespace_registry());
    let backend = Arc::new(
        FileSystemBackend::open(&args.root, registry)
            .with_context(|| format!("opening repository at {}", args.root.display()))?,
    );
    let manager = BundlePersistenceManager::new(backend.clone(), &config)?;
    debug!(root = %args.root.display(), cache_mb = config.bundle_cache_size_mb, "repository opened");
    Ok(Repo { backend, manager })
}

fn cmd_path(args: PathArgs, format: OutputFormat) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    let (folder, bundle, refs) = (node_folder_path(&id), node_file_path(&id), references_file_path(&id));
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::json!({ "id": id.to_string(), "folder": folder, "bundle": bundle, "references": refs })
        ),
        OutputFormat::Text => {
            println!("Node {}", id.to_string().yellow().bold());
            println!("  folder:     {}", folder.cyan());
            println!("  bundle:     {}", bundle.cyan());
            println!("  references: {}", refs.cyan());
        }
    }
    Ok(())
}

fn cmd_show(args: ShowArgs, format: OutputFormat) -> anyhow::Result<()> {
    let id = parse_id(&args.id)?;
    let repo = open_repo(&args.repo)?;
    let node = repo.manager.load_node(&id)?;
    let properties = node
        .property_names
        .iter()
        .map(|name| repo.manager.load_property(&PropertyId::new(id, name.clone())))
        .collect::<Result<Vec<_>, _>>()?;

    if format == OutputFormat::Json {
        let doc = serde_json::json!({ "node": node, "properties": properties });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("Node {}", id.to_string().yellow().bold());
    println!("  type:   {}", node.node_type_name.to_string().cyan());
    match node.parent_id {
        Some(parent) => println!("  parent: {parent}"),
        None => println!("  parent: {}", "(root)".dimmed()),
    }
    for mixin in &node.mixin_type_names {
        println!("  mixin:  {}", mixin.to_string().cyan());
    }
    if !node.child_node_entries.is_empty() {
        println!("  children:");
        for child in &node.child_node_entries {
            println!("    {}[{}] {}", child.name, child.index, child.id.to_string().dimmed());
        }
    }
    println!("  properties:");
    for prop in &properties {
        println!("    {} ({}) = {}", prop.name().to_string().bold(), prop.property_type, render_values(prop));
    }
    Ok(())
}

fn render_values(prop: &PropertyState) -> String {
    let rendered: Vec<String> = prop.values.iter().map(render_value).collect();
    if prop.multi_valued {
        format!("[{}]", rendered.join(", "))
    } else {
        rendered.join(", ")
    }
}

fn render_value(value: &InternalValue) -> String {
    match value.as_binary() {
        Some(data) if data.len() > BINARY_PREVIEW => {
            format!("<{} bytes> {}…", data.len(), hex::encode(&data[..BINARY_PREVIEW]))
        }
        Some(data) => format!("<{} bytes> {}", data.len(), hex::encode(data)),
        None => value.to_string(),
    }
}

fn cmd_check(args: CheckArgs, format: OutputFormat) -> anyhow::Result<()> {
    let ids = args
        .ids
        .iter()
        .map(|s| parse_id(s))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let repo = open_repo(&args.repo)?;

    let mut missing = Vec::new();
    for id in &ids {
        if !repo.manager.exists_node(id)? {
            missing.push(*id);
        }
    }
    let problems = repo.manager.check_consistency(&ids, args.recursive, args.fix)?;

    if format == OutputFormat::Json {
        let missing: Vec<String> = missing.iter().map(NodeId::to_string).collect();
        println!("{}", serde_json::json!({ "missing": missing, "problems": problems }));
        return Ok(());
    }

    for id in &missing {
        println!("  {} {}", "missing:".red(), id);
    }
    for problem in &problems {
        println!("  {} {}", "problem:".red(), problem);
    }
    if missing.is_empty() && problems.is_empty() {
        println!("{} No issues.", "✓".green().bold());
    } else if args.fix {
        println!("{} {} issue(s) found, repairs attempted.", "!".yellow().bold(), missing.len() + problems.len());
    } else {
        println!("{} {} issue(s) found.", "✗".red().bold(), missing.len() + problems.len());
    }
    Ok(())
}

fn cmd_index(args: RepoArgs, format: OutputFormat) -> anyhow::Result<()> {
    let repo = open_repo(&args)?;
    let paths = repo.backend.paths();
    let namespaces = sorted_entries(paths.ns_index());
    let names = sorted_entries(paths.name_index());

    if format == OutputFormat::Json {
        println!("{}", serde_json::json!({ "namespaces": namespaces, "names": names }));
        return Ok(());
    }

    println!("{} ({})", "Namespaces".bold(), namespaces.len());
    for (s, i) in &namespaces {
        println!("  {:>4}  {}", i.to_string().yellow(), if s.is_empty() { "(default)" } else { s.as_str() });
    }
    println!("{} ({})", "Local names".bold(), names.len());
    for (s, i) in &names {
        println!("  {:>4}  {}", i.to_string().yellow(), s);
    }
    Ok(())
}

fn sorted_entries(index: &dyn StringIndex) -> Vec<(String, u32)> {
    let mut entries = index.entries();
    entries.sort_by_key(|(_, i)| *i);
    entries
}
