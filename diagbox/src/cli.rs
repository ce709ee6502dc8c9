use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// diagbox - build the diagnostic service's runtime image and run the service
#[derive(Parser, Debug)]
#[command(name = "diagbox")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// Content-addressed layers in the local store
    Local,
    /// Hand the rendered Dockerfile to `docker build`
    Docker,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write the default recipe
    Init {
        /// Recipe file to create
        #[arg(long, value_name = "PATH", default_value = "diagbox.yaml")]
        recipe: PathBuf,

        /// Overwrite an existing recipe
        #[arg(long, short)]
        force: bool,
    },

    /// Print the Dockerfile equivalent of a recipe
    Render {
        /// Recipe file (default: ./diagbox.yaml if present, else built-in defaults)
        #[arg(long, value_name = "PATH")]
        recipe: Option<PathBuf>,

        /// Write to a file instead of stdout
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Build an image from a recipe and a build context
    Build {
        /// Recipe file (default: <context>/diagbox.yaml if present, else built-in defaults)
        #[arg(long, value_name = "PATH")]
        recipe: Option<PathBuf>,

        /// Build context directory
        #[arg(long, value_name = "DIR", default_value = ".")]
        context: PathBuf,

        /// Image tag
        #[arg(long, short, default_value = "diagbox:latest")]
        tag: String,

        /// Layer store directory (default: $DIAGBOX_STORE_DIR or ~/.cache/diagbox)
        #[arg(long, value_name = "DIR")]
        store: Option<String>,

        #[arg(long, value_enum, default_value = "local")]
        backend: BackendKind,
    },

    /// Show an image's manifest and entry point bind address
    Inspect {
        #[arg(value_name = "TAG")]
        tag: String,

        #[arg(long, value_name = "DIR")]
        store: Option<String>,
    },

    /// Flatten an image's layers into a directory
    Export {
        #[arg(value_name = "TAG")]
        tag: String,

        #[arg(value_name = "DEST")]
        dest: PathBuf,

        #[arg(long, value_name = "DIR")]
        store: Option<String>,
    },

    /// Manage the layer store
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Run the HTTP service
    Serve {
        /// Bind host (default: $DIAGBOX_HOST or 0.0.0.0)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (default: $DIAGBOX_PORT or 8000)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheAction {
    /// List images and layers
    List {
        #[arg(long, value_name = "DIR")]
        store: Option<String>,
    },

    /// Remove layers no image references
    Prune {
        #[arg(long, value_name = "DIR")]
        store: Option<String>,

        /// Only show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Remove the whole store
    Clean {
        #[arg(long, value_name = "DIR")]
        store: Option<String>,

        /// Only show what would be removed
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_defaults() {
        let cli = Cli::try_parse_from(["diagbox", "build"]).unwrap();
        match cli.command {
            Commands::Build {
                context,
                tag,
                backend,
                recipe,
                ..
            } => {
                assert_eq!(context, PathBuf::from("."));
                assert_eq!(tag, "diagbox:latest");
                assert_eq!(backend, BackendKind::Local);
                assert!(recipe.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_cache_clean_flags() {
        let cli = Cli::try_parse_from(["diagbox", "cache", "clean", "--dry-run", "-f"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cache {
                action: CacheAction::Clean {
                    dry_run: true,
                    force: true,
                    ..
                }
            }
        ));
    }

    #[test]
    fn test_backend_value() {
        let cli = Cli::try_parse_from(["diagbox", "build", "--backend", "docker", "-t", "svc:1"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Build {
                backend: BackendKind::Docker,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["diagbox", "build", "--backend", "podman"]).is_err());
    }
}
