//! CLI command definitions and handlers.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use tabled::{Table, Tabled};

use volsim_common::VolsimPaths;
use volsim_common::paths::normalize_abs_path;

use crate::image::ImageManifest;
use crate::launch::{Launch, LaunchOptions};
use crate::resolver::MountTable;
use crate::spec::{MountKind, MountSpec};
use crate::volume::VolumeStore;

/// volsim - Container volume-mount precedence sandbox
#[derive(Parser)]
#[command(name = "volsim")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Root directory for volsim data
    #[arg(long, global = true, env = "VOLSIM_ROOT")]
    pub root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Simulate a container start against an image manifest
    Run {
        /// Path to the image manifest (JSON)
        #[arg(short, long)]
        image: PathBuf,

        /// Mount specs (NAME:PATH, /HOST/PATH:PATH, or PATH)
        #[arg(short = 'v', long = "volume")]
        volumes: Vec<String>,

        /// Container name
        #[arg(long)]
        name: Option<String>,

        /// Remove the container's anonymous volumes after the run
        #[arg(long)]
        rm: bool,
    },

    /// Show which backing store answers for a container path
    Resolve {
        /// Mount specs (NAME:PATH, /HOST/PATH:PATH, or PATH)
        #[arg(short = 'v', long = "volume")]
        volumes: Vec<String>,

        /// Container path to resolve
        path: String,
    },

    /// Show the precedence-resolved mount table
    Mounts {
        /// Mount specs (NAME:PATH, /HOST/PATH:PATH, or PATH)
        #[arg(short = 'v', long = "volume")]
        volumes: Vec<String>,

        /// Output format (table, json)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Manage volumes in the store
    Volume {
        /// The volume subcommand to execute.
        #[command(subcommand)]
        command: VolumeCommands,
    },
}

/// Volume store commands.
#[derive(Subcommand)]
pub enum VolumeCommands {
    /// List volumes
    Ls {
        /// Only display volume names
        #[arg(short, long)]
        quiet: bool,
    },

    /// Create a named volume
    Create {
        /// Volume name
        name: String,

        /// Labels (KEY=VALUE)
        #[arg(short, long)]
        label: Vec<String>,
    },

    /// Remove a volume
    Rm {
        /// Volume name
        name: String,

        /// Do not error if the volume is missing
        #[arg(short, long)]
        force: bool,
    },

    /// Remove all anonymous volumes
    Prune,

    /// Show detailed volume information
    Inspect {
        /// Volume name
        name: String,
    },
}

#[derive(Tabled)]
struct MountRow {
    #[tabled(rename = "DESTINATION")]
    destination: String,
    #[tabled(rename = "KIND")]
    kind: String,
    #[tabled(rename = "SOURCE")]
    source: String,
    #[tabled(rename = "MODE")]
    mode: String,
    #[tabled(rename = "SHADOWS")]
    shadows: String,
}

#[derive(Tabled)]
struct VolumeRow {
    #[tabled(rename = "NAME")]
    name: String,
    #[tabled(rename = "ANONYMOUS")]
    anonymous: bool,
    #[tabled(rename = "CREATED")]
    created: String,
}

impl Cli {
    /// Execute the CLI command.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid input or store failures; a simulated
    /// start failure is also reported as an error so the exit code matches
    /// the outcome.
    pub fn execute(self) -> Result<()> {
        let paths = match &self.root {
            Some(root) => VolsimPaths::with_root(root),
            None => VolsimPaths::new(),
        };

        match self.command {
            Commands::Run {
                image,
                volumes,
                name,
                rm,
            } => {
                let image = ImageManifest::load(&image)
                    .map_err(|e| eyre!("Failed to load image manifest: {e}"))?;
                let specs = parse_specs(&volumes)?;
                let mut store = VolumeStore::open(paths)
                    .map_err(|e| eyre!("Failed to open volume store: {e}"))?;

                let launch = Launch::run(
                    image,
                    &specs,
                    &mut store,
                    LaunchOptions { name, remove: rm },
                )
                .map_err(|e| eyre!("Failed to launch container: {e}"))?;

                for check in &launch.report.checks {
                    let status = if check.satisfied { "ok" } else { "MISSING" };
                    println!(
                        "{status:>7}  {}  ({})",
                        check.path.display(),
                        check.origin
                    );
                    if let Some(hint) = &check.hint {
                        println!("         hint: {hint}");
                    }
                }

                let started = launch.report.started;
                let container = launch.container.clone();
                launch
                    .finish(&mut store)
                    .map_err(|e| eyre!("Failed to clean up container: {e}"))?;

                if started {
                    println!("Container {container} started");
                    Ok(())
                } else {
                    Err(eyre!("Container {container} failed to start"))
                }
            }

            Commands::Resolve { volumes, path } => {
                let specs = parse_specs(&volumes)?;
                let table =
                    MountTable::build(specs.iter().map(|s| s.destination.clone()))
                        .map_err(|e| eyre!("{e}"))?;
                let query = normalize_abs_path(&path).map_err(|e| eyre!("{e}"))?;

                match table.resolve(&query) {
                    None => println!("{} -> image layer", query.display()),
                    Some(hit) => {
                        let spec = &specs[hit.index];
                        let backing = match spec.kind {
                            MountKind::Bind => format!(
                                "bind mount {}",
                                spec.source.as_deref().unwrap_or("?")
                            ),
                            MountKind::Volume => format!(
                                "volume {}",
                                spec.source.as_deref().unwrap_or("?")
                            ),
                            MountKind::Anonymous => "anonymous volume".to_string(),
                        };
                        if hit.below.as_os_str().is_empty() {
                            println!(
                                "{} -> {backing} at {}",
                                query.display(),
                                hit.destination.display()
                            );
                        } else {
                            println!(
                                "{} -> {backing} at {} (remainder: {})",
                                query.display(),
                                hit.destination.display(),
                                hit.below.display()
                            );
                        }
                    }
                }
                Ok(())
            }

            Commands::Mounts { volumes, format } => {
                let specs = parse_specs(&volumes)?;
                let table =
                    MountTable::build(specs.iter().map(|s| s.destination.clone()))
                        .map_err(|e| eyre!("{e}"))?;
                let shadows = table.shadows();

                let shadowed_by = |idx: usize| -> Vec<String> {
                    shadows
                        .iter()
                        .filter(|s| s.inner == idx)
                        .map(|s| specs[s.outer].destination.display().to_string())
                        .collect()
                };

                if format == "json" {
                    let entries: Vec<serde_json::Value> = specs
                        .iter()
                        .enumerate()
                        .map(|(idx, spec)| {
                            serde_json::json!({
                                "destination": spec.destination,
                                "kind": spec.kind,
                                "source": spec.source,
                                "readonly": spec.readonly,
                                "shadows": shadowed_by(idx),
                            })
                        })
                        .collect();
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                } else {
                    let rows: Vec<MountRow> = specs
                        .iter()
                        .enumerate()
                        .map(|(idx, spec)| MountRow {
                            destination: spec.destination.display().to_string(),
                            kind: spec.kind.to_string(),
                            source: spec.source.clone().unwrap_or_else(|| "-".to_string()),
                            mode: if spec.readonly { "ro" } else { "rw" }.to_string(),
                            shadows: {
                                let list = shadowed_by(idx);
                                if list.is_empty() {
                                    "-".to_string()
                                } else {
                                    list.join(", ")
                                }
                            },
                        })
                        .collect();
                    println!("{}", Table::new(rows));
                }
                Ok(())
            }

            Commands::Volume { command } => {
                let mut store = VolumeStore::open(paths)
                    .map_err(|e| eyre!("Failed to open volume store: {e}"))?;

                match command {
                    VolumeCommands::Ls { quiet } => {
                        if quiet {
                            for volume in store.list() {
                                println!("{}", volume.name);
                            }
                        } else {
                            let rows: Vec<VolumeRow> = store
                                .list()
                                .iter()
                                .map(|v| VolumeRow {
                                    name: v.name.clone(),
                                    anonymous: v.anonymous,
                                    created: v
                                        .created
                                        .format("%Y-%m-%d %H:%M:%S")
                                        .to_string(),
                                })
                                .collect();
                            println!("{}", Table::new(rows));
                        }
                        Ok(())
                    }

                    VolumeCommands::Create { name, label } => {
                        let labels = parse_labels(&label)?;
                        let volume = store
                            .create(&name, labels)
                            .map_err(|e| eyre!("Failed to create volume: {e}"))?;
                        println!("{}", volume.name);
                        Ok(())
                    }

                    VolumeCommands::Rm { name, force } => {
                        store
                            .remove(&name, force)
                            .map_err(|e| eyre!("Failed to remove volume: {e}"))?;
                        println!("{name}");
                        Ok(())
                    }

                    VolumeCommands::Prune => {
                        let removed = store
                            .prune()
                            .map_err(|e| eyre!("Failed to prune volumes: {e}"))?;
                        for name in &removed {
                            println!("{name}");
                        }
                        println!("Total reclaimed volumes: {}", removed.len());
                        Ok(())
                    }

                    VolumeCommands::Inspect { name } => {
                        let volume = store
                            .get(&name)
                            .ok_or_else(|| eyre!("Volume not found: {name}"))?;
                        let json = serde_json::json!({
                            "name": volume.name,
                            "anonymous": volume.anonymous,
                            "labels": volume.labels,
                            "created": volume.created,
                            "data": volume.data,
                        });
                        println!("{}", serde_json::to_string_pretty(&json)?);
                        Ok(())
                    }
                }
            }
        }
    }
}

/// Parse all `-v` spec strings, failing on the first bad one.
fn parse_specs(raw: &[String]) -> Result<Vec<MountSpec>> {
    raw.iter()
        .map(|s| MountSpec::parse(s).map_err(|e| eyre!("{e}")))
        .collect()
}

/// Parse `KEY=VALUE` label arguments.
fn parse_labels(raw: &[String]) -> Result<HashMap<String, String>> {
    let mut labels = HashMap::new();
    for entry in raw {
        let (key, value) = entry
            .split_once('=')
            .ok_or_else(|| eyre!("Invalid label '{entry}': expected KEY=VALUE"))?;
        labels.insert(key.to_string(), value.to_string());
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_parse() {
        let labels = parse_labels(&["env=dev".to_string(), "team=web".to_string()]).unwrap();
        assert_eq!(labels.get("env").map(String::as_str), Some("dev"));
        assert_eq!(labels.len(), 2);
        assert!(parse_labels(&["nokey".to_string()]).is_err());
    }

    #[test]
    fn bad_spec_surfaces_as_cli_error() {
        assert!(parse_specs(&["./rel:/app".to_string()]).is_err());
        assert!(parse_specs(&["data:/app".to_string()]).is_ok());
    }
}
