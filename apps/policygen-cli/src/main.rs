//! # policygen
//!
//! Command-line front end for policygen-core.
//!
//! Reads one or more PolicyGenerator configuration files (or stdin) and
//! writes the generated Policies, PolicySets, placements, and
//! PlacementBindings to stdout as a multi-document YAML stream.
//!
//! - `policygen config.yaml` — generate from a file
//! - `policygen < config.yaml` — generate from stdin
//! - `policygen --resource-list` — run as a kustomize KRM function

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use policygen_core::{generate_resource_list, PolicyGenerator};
use tracing_subscriber::EnvFilter;

/// Generate governance policies from PolicyGenerator configurations.
#[derive(Parser, Debug)]
#[command(name = "policygen", version, about)]
struct Cli {
    /// Configuration files to process. Reads stdin when omitted or `-`.
    files: Vec<PathBuf>,

    /// Directory manifest paths are resolved against (defaults to each
    /// configuration file's directory).
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Print the full error chain instead of a one-line message.
    #[arg(long)]
    debug: bool,

    /// Treat the input as a KRM ResourceList and emit a ResourceList.
    #[arg(long)]
    resource_list: bool,
}

/// Where one configuration document comes from.
#[derive(Debug, PartialEq)]
enum Input {
    Stdin,
    File(PathBuf),
}

impl Input {
    fn from_args(files: &[PathBuf]) -> Vec<Input> {
        if files.is_empty() {
            return vec![Input::Stdin];
        }
        files
            .iter()
            .map(|f| {
                if f.as_os_str() == "-" {
                    Input::Stdin
                } else {
                    Input::File(f.clone())
                }
            })
            .collect()
    }

    fn read(&self) -> anyhow::Result<String> {
        match self {
            Input::Stdin => {
                let mut source = String::new();
                io::stdin()
                    .read_to_string(&mut source)
                    .context("failed to read the configuration from stdin")?;
                Ok(source)
            }
            Input::File(path) => std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn base_dir(&self, explicit: Option<&Path>) -> anyhow::Result<PathBuf> {
        if let Some(dir) = explicit {
            return Ok(dir.to_path_buf());
        }
        match self {
            Input::File(path) => match path.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => Ok(parent.to_path_buf()),
                _ => current_dir(),
            },
            Input::Stdin => current_dir(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Input::Stdin => "stdin".to_string(),
            Input::File(path) => path.display().to_string(),
        }
    }
}

fn current_dir() -> anyhow::Result<PathBuf> {
    std::env::current_dir().context("failed to determine the current directory")
}

/// Generate output for every input. Nothing is returned unless every input
/// succeeds.
fn run(cli: &Cli) -> anyhow::Result<String> {
    let mut output = String::new();
    for input in Input::from_args(&cli.files) {
        let source = input.read()?;
        let base_dir = input.base_dir(cli.base_dir.as_deref())?;
        let generated = if cli.resource_list {
            generate_resource_list(&source, &base_dir)
        } else {
            PolicyGenerator::from_yaml(&source, &base_dir).and_then(|g| g.generate())
        }
        .with_context(|| format!("failed to generate from {}", input.describe()))?;
        output.push_str(&generated);
    }
    Ok(output)
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("policygen_core=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_ansi(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    match run(&cli) {
        Ok(output) => {
            let mut stdout = io::stdout().lock();
            if let Err(e) = stdout.write_all(output.as_bytes()).and_then(|_| stdout.flush()) {
                eprintln!("error: failed to write the output: {}", e);
                return ExitCode::FAILURE;
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            if cli.debug {
                eprintln!("error: {:?}", e);
            } else {
                eprintln!("error: {:#}", e);
            }
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const CONFIG: &str = r#"
apiVersion: policy.open-cluster-management.io/v1
kind: PolicyGenerator
metadata:
  name: gen
policyDefaults:
  namespace: policies
policies:
  - name: policy-cm
    manifests:
      - path: cm.yaml
"#;

    fn project() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("cm.yaml"),
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: cm\n  namespace: default\n",
        )
        .unwrap();
        fs::write(dir.path().join("generator.yaml"), CONFIG).unwrap();
        dir
    }

    fn cli(files: Vec<PathBuf>) -> Cli {
        Cli {
            files,
            base_dir: None,
            debug: false,
            resource_list: false,
        }
    }

    #[test]
    fn no_files_reads_stdin() {
        assert_eq!(Input::from_args(&[]), vec![Input::Stdin]);
        assert_eq!(
            Input::from_args(&[PathBuf::from("-"), PathBuf::from("a.yaml")]),
            vec![Input::Stdin, Input::File(PathBuf::from("a.yaml"))]
        );
    }

    #[test]
    fn base_dir_defaults_to_config_directory() {
        let input = Input::File(PathBuf::from("/configs/generator.yaml"));
        assert_eq!(input.base_dir(None).unwrap(), PathBuf::from("/configs"));
        assert_eq!(
            input.base_dir(Some(Path::new("/elsewhere"))).unwrap(),
            PathBuf::from("/elsewhere")
        );
    }

    #[test]
    fn generates_from_config_file() {
        let dir = project();
        let output = run(&cli(vec![dir.path().join("generator.yaml")])).unwrap();
        assert!(output.starts_with("---\n"));
        assert!(output.contains("name: policy-cm"));
        assert!(output.contains("kind: PlacementBinding"));
    }

    #[test]
    fn multiple_files_concatenate_output() {
        let dir = project();
        let config = dir.path().join("generator.yaml");
        let single = run(&cli(vec![config.clone()])).unwrap();
        let double = run(&cli(vec![config.clone(), config])).unwrap();
        assert_eq!(double, format!("{}{}", single, single));
    }

    #[test]
    fn failure_names_the_input_and_produces_no_output() {
        let dir = project();
        fs::write(dir.path().join("broken.yaml"), "metadata: {name: gen}\npolicies: []\n").unwrap();
        let err = run(&cli(vec![
            dir.path().join("generator.yaml"),
            dir.path().join("broken.yaml"),
        ]))
        .unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("broken.yaml"));
        assert!(!message.contains('\n'));
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let err = run(&cli(vec![dir.path().join("absent.yaml")])).unwrap_err();
        assert!(err.to_string().contains("absent.yaml"));
    }
}
