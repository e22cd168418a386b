use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "arbor",
    about = "Inspect Arbor bundle repositories",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Show where a node's records are stored
    Path(PathArgs),
    /// Load a node and list its properties
    Show(ShowArgs),
    /// Check that bundles exist and are consistent
    Check(CheckArgs),
    /// Dump the namespace and local-name indices
    Index(RepoArgs),
}

#[derive(Args)]
pub struct RepoArgs {
    /// Repository root directory
    #[arg(long, default_value = ".")]
    pub root: PathBuf,

    /// TOML file with persistence settings
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Bundle cache size in megabytes, overriding the config file
    #[arg(long)]
    pub cache_size: Option<String>,
}

#[derive(Args)]
pub struct PathArgs {
    /// Node id (`xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`)
    pub id: String,
}

#[derive(Args)]
pub struct ShowArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Node id
    pub id: String,
}

#[derive(Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub repo: RepoArgs,

    /// Node ids; all bundles when omitted
    pub ids: Vec<String>,

    /// Also check descendants
    #[arg(short, long)]
    pub recursive: bool,

    /// Remove child entries pointing at missing bundles
    #[arg(long)]
    pub fix: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_path() {
        let cli = Cli::try_parse_from(["arbor", "path", "0123abcd-4567-89ef-0123-456789abcdef"]).unwrap();
        if let Command::Path(args) = cli.command {
            assert_eq!(args.id, "0123abcd-4567-89ef-0123-456789abcdef");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_show_with_root() {
        let cli = Cli::try_parse_from(["arbor", "show", "--root", "/tmp/repo", "some-id"]).unwrap();
        if let Command::Show(args) = cli.command {
            assert_eq!(args.repo.root, PathBuf::from("/tmp/repo"));
            assert_eq!(args.id, "some-id");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_check_flags() {
        let cli = Cli::try_parse_from(["arbor", "check", "-r", "--fix", "a", "b"]).unwrap();
        if let Command::Check(args) = cli.command {
            assert!(args.recursive);
            assert!(args.fix);
            assert_eq!(args.ids, vec!["a", "b"]);
            assert_eq!(args.repo.root, PathBuf::from("."));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::try_parse_from(["arbor", "index", "--format", "json", "-v", "--cache-size", "32"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        if let Command::Index(args) = cli.command {
            assert_eq!(args.cache_size.as_deref(), Some("32"));
        } else { panic!("wrong command"); }
    }

    #[test]
    fn show_requires_id() {
        assert!(Cli::try_parse_from(["arbor", "show"]).is_err());
    }
}
