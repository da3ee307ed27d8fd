//! ppl-explain: compile a PPL plan tree into a logical plan
//!
//! Reads an unresolved plan serialized as JSON, compiles it against the
//! tables declared in the config file and prints the explain text (or the
//! JSON plan with `--json`) on stdout.

use anyhow::{bail, Context, Result};
use ppl_ast::UnresolvedPlan;
use ppl_planner::Planner;
use std::path::PathBuf;
use tracing::{debug, info};

mod catalog;
mod config;
mod logging;

use config::Config;

const USAGE: &str = "usage: ppl-explain --config <config.yaml> [--json] <ast.json>";

#[derive(Debug, PartialEq)]
struct Args {
    config: PathBuf,
    json: bool,
    input: PathBuf,
}

impl Args {
    fn parse<I: IntoIterator<Item = String>>(args: I) -> Result<Self> {
        let mut config = None;
        let mut json = false;
        let mut input = None;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    let path = args.next().context("--config expects a path")?;
                    config = Some(PathBuf::from(path));
                }
                "--json" => json = true,
                flag if flag.starts_with('-') => bail!("unknown flag {}\n{}", flag, USAGE),
                path => {
                    if input.replace(PathBuf::from(path)).is_some() {
                        bail!("more than one input file\n{}", USAGE);
                    }
                }
            }
        }

        Ok(Self {
            config: config.with_context(|| format!("missing --config\n{}", USAGE))?,
            json,
            input: input.with_context(|| format!("missing input file\n{}", USAGE))?,
        })
    }
}

fn run(args: &Args) -> Result<String> {
    let config = Config::load(&args.config)
        .with_context(|| format!("loading config {}", args.config.display()))?;
    logging::init(&config.logging);

    let provider = catalog::build(&config.tables)?;
    info!(tables = config.tables.len(), "catalog loaded");

    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let query: UnresolvedPlan = serde_json::from_str(&text)
        .with_context(|| format!("decoding plan tree from {}", args.input.display()))?;

    let planner = Planner::new(&provider).with_config(config.planner.clone());
    let plan = planner.plan(&query)?;
    debug!(fingerprint = %plan.fingerprint()?, "compiled plan");

    if args.json {
        Ok(serde_json::to_string_pretty(&plan)?)
    } else {
        Ok(plan.explain())
    }
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse(std::env::args().skip(1))?;
    let output = run(&args)?;
    print!("{}", output);
    if !output.ends_with('\n') {
        println!();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(values: &[&str]) -> Result<Args> {
        Args::parse(values.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["--config", "ppl.yaml", "--json", "query.json"]).unwrap();
        assert_eq!(
            parsed,
            Args {
                config: "ppl.yaml".into(),
                json: true,
                input: "query.json".into(),
            }
        );
        assert!(!args(&["query.json", "-c", "ppl.yaml"]).unwrap().json);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(args(&["query.json"]).is_err());
        assert!(args(&["--config", "ppl.yaml"]).is_err());
        assert!(args(&["--config"]).is_err());
        assert!(args(&["--config", "ppl.yaml", "--verbose", "q.json"]).is_err());
        assert!(args(&["--config", "ppl.yaml", "a.json", "b.json"]).is_err());
    }
}
