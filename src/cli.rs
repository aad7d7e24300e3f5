use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use declarative::Kind;
use std::path::PathBuf;

use crate::config::Overrides;

#[derive(Parser)]
#[command(name = "keel")]
#[command(version)]
#[command(about = "Declarative configuration and drift control for backup infrastructure", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-essential output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Backup server URL (overrides [api] url)
    #[arg(long, global = true, env = "KEEL_API_URL")]
    pub api_url: Option<String>,

    /// Product profile name (overrides [api] product)
    #[arg(long, global = true)]
    pub product: Option<String>,

    /// Severity override file (overrides [severity] overrides)
    #[arg(long, global = true)]
    pub severity_config: Option<String>,

    /// Ledger file (overrides [state] file)
    #[arg(long, global = true)]
    pub state_file: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        Overrides {
            api_url: self.api_url.clone(),
            product: self.product.clone(),
            severity_config: self.severity_config.clone(),
            state_file: self.state_file.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Command {
    /// Resolve a spec with its profile and overlay and print the result
    Merge(MergeArgs),

    /// Compare desired or recorded configuration against the live server
    Diff(DiffArgs),

    /// Push one or more specs to the server and record them
    Apply(ApplyArgs),

    /// Record the live configuration of a resource as its managed baseline
    Adopt(TargetArgs),

    /// Record the live configuration of a resource for observation only
    Snapshot(TargetArgs),

    /// Inspect or edit the local ledger
    #[command(subcommand)]
    State(StateCommand),

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

// ============================================================================
// Merge inputs
// ============================================================================

/// Layering inputs shared by merge, diff and apply
#[derive(Args, Debug, Clone, Default)]
pub struct LayerArgs {
    /// Profile supplying defaults under the spec
    #[arg(short, long)]
    pub profile: Option<PathBuf>,

    /// Overlay patched on top of the spec
    #[arg(short, long)]
    pub overlay: Option<PathBuf>,

    /// Concatenate arrays instead of replacing them
    #[arg(long)]
    pub append_arrays: bool,

    /// Treat an explicit null as "remove this field"
    #[arg(long)]
    pub null_deletes: bool,
}

#[derive(Args)]
pub struct MergeArgs {
    /// Resource spec file
    pub spec: PathBuf,

    #[command(flatten)]
    pub layers: LayerArgs,
}

// ============================================================================
// Diff
// ============================================================================

#[derive(Args)]
pub struct DiffArgs {
    /// Resource spec file
    #[arg(required_unless_present = "all", conflicts_with = "all")]
    pub spec: Option<PathBuf>,

    #[command(flatten)]
    pub layers: LayerArgs,

    /// Compare the recorded baseline instead of the spec file
    #[arg(long)]
    pub against_state: bool,

    /// Check every managed resource in the ledger
    #[arg(long)]
    pub all: bool,

    /// Restrict --all to one resource kind
    #[arg(long = "type", value_name = "KIND", requires = "all")]
    pub kind: Option<Kind>,

    /// Print differences as JSON
    #[arg(long)]
    pub json: bool,
}

// ============================================================================
// Apply
// ============================================================================

#[derive(Args)]
pub struct ApplyArgs {
    /// Resource spec files, applied in order
    #[arg(required = true)]
    pub specs: Vec<PathBuf>,

    #[command(flatten)]
    pub layers: LayerArgs,

    /// Show what would change without pushing or recording
    #[arg(short = 'n', long)]
    pub dry_run: bool,

    /// Never create; report missing resources as not found
    #[arg(long)]
    pub update_only: bool,
}

// ============================================================================
// Adopt / Snapshot
// ============================================================================

#[derive(Args)]
pub struct TargetArgs {
    /// Resource kind, e.g. BackupJob
    pub kind: Kind,

    /// Resource name on the server
    pub name: String,
}

// ============================================================================
// State
// ============================================================================

#[derive(Subcommand)]
pub enum StateCommand {
    /// List recorded resources
    List {
        /// Only show one resource kind
        #[arg(long = "type", value_name = "KIND")]
        kind: Option<Kind>,
    },

    /// Show one record with its history
    Show {
        /// Resource name
        name: String,
    },

    /// Delete a record from the ledger (the live resource is untouched)
    Rm {
        /// Resource name
        name: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_diff_all_with_type() {
        let cli = Cli::try_parse_from(["keel", "diff", "--all", "--type", "backupjob"]).unwrap();
        match cli.command {
            Command::Diff(args) => {
                assert!(args.all);
                assert_eq!(args.kind, Some(Kind::BackupJob));
                assert!(args.spec.is_none());
            }
            _ => panic!("Expected diff"),
        }
    }

    #[test]
    fn test_diff_requires_spec_or_all() {
        assert!(Cli::try_parse_from(["keel", "diff"]).is_err());
        assert!(Cli::try_parse_from(["keel", "diff", "job.yaml", "--all"]).is_err());
    }

    #[test]
    fn test_parse_apply_batch() {
        let cli = Cli::try_parse_from([
            "keel",
            "apply",
            "a.yaml",
            "b.yaml",
            "--profile",
            "gold.yaml",
            "--update-only",
            "--api-url",
            "http://server:9419",
        ])
        .unwrap();
        assert_eq!(cli.overrides().api_url.as_deref(), Some("http://server:9419"));
        match cli.command {
            Command::Apply(args) => {
                assert_eq!(args.specs.len(), 2);
                assert!(args.update_only);
                assert!(!args.dry_run);
                assert_eq!(args.layers.profile, Some(PathBuf::from("gold.yaml")));
            }
            _ => panic!("Expected apply"),
        }
    }

    #[test]
    fn test_adopt_rejects_unknown_kind() {
        assert!(Cli::try_parse_from(["keel", "adopt", "Widget", "x"]).is_err());
    }
}
