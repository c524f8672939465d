use std::path::PathBuf;

use anyhow::{bail, Context, Result};

/// Concurrent callers per key for `fetch`, unless overridden.
const DEFAULT_CALLERS: usize = 1;

pub const USAGE: &str = "\
Usage: spotter [--config <path>] <command>

Commands:
  fetch <key>... [--callers <n>]   Fetch resources through the cache
  warm                             Fetch every critical resource
  resources                        List configured resources
  help                             Show this message

Environment:
  SPOTTER_API_URL, SPOTTER_API_TOKEN override the config file.
  RUST_LOG sets the log filter (default: warn).";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Fetch { keys: Vec<String>, callers: usize },
    Warm,
    Resources,
    Help,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cli {
    pub config_path: Option<PathBuf>,
    pub command: Command,
}

pub fn parse(args: &[String]) -> Result<Cli> {
    let mut config_path = None;
    let mut callers = DEFAULT_CALLERS;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a path")?;
                config_path = Some(PathBuf::from(path));
            }
            "--callers" => {
                let n = iter.next().context("--callers needs a number")?;
                callers = n
                    .parse()
                    .with_context(|| format!("Invalid --callers value: {}", n))?;
                if callers == 0 {
                    bail!("--callers must be at least 1");
                }
            }
            "-h" | "--help" => positional.insert(0, "help".to_string()),
            flag if flag.starts_with("--") => bail!("Unknown flag: {}", flag),
            _ => positional.push(arg.clone()),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        None | Some("help") => Command::Help,
        Some("fetch") => {
            let keys: Vec<String> = positional.collect();
            if keys.is_empty() {
                bail!("fetch needs at least one resource key");
            }
            Command::Fetch { keys, callers }
        }
        Some("warm") => Command::Warm,
        Some("resources") => Command::Resources,
        Some(other) => bail!("Unknown command: {}", other),
    };

    Ok(Cli {
        config_path,
        command,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(String::from).collect()
    }

    #[test]
    fn test_parse_fetch() {
        let cli = parse(&args("fetch stats plans --callers 4")).unwrap();
        assert_eq!(
            cli.command,
            Command::Fetch {
                keys: vec!["stats".to_string(), "plans".to_string()],
                callers: 4
            }
        );
        assert_eq!(cli.config_path, None);
    }

    #[test]
    fn test_parse_config_path() {
        let cli = parse(&args("--config /tmp/spotter.json warm")).unwrap();
        assert_eq!(cli.command, Command::Warm);
        assert_eq!(cli.config_path, Some(PathBuf::from("/tmp/spotter.json")));
    }

    #[test]
    fn test_no_args_is_help() {
        assert_eq!(parse(&[]).unwrap().command, Command::Help);
        assert_eq!(parse(&args("resources --help")).unwrap().command, Command::Help);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse(&args("fetch")).is_err());
        assert!(parse(&args("fetch stats --callers 0")).is_err());
        assert!(parse(&args("fetch stats --callers many")).is_err());
        assert!(parse(&args("--verbose warm")).is_err());
        assert!(parse(&args("purge")).is_err());
    }
}
