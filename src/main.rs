use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use fx_forge::{
    ast::NodeTree,
    config::RuntimeConfig,
    runtime::{EffectRuntime, HeadlessDevice},
};

#[derive(Debug, Clone)]
struct Cli {
    ast_json: Option<PathBuf>,
    config: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    validate: bool,
    size: (u32, u32),
}

impl Default for Cli {
    fn default() -> Self {
        Self {
            ast_json: None,
            config: None,
            output_dir: None,
            validate: false,
            size: (1280, 720),
        }
    }
}

fn parse_size(value: &str) -> Result<(u32, u32)> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| anyhow!("invalid --size {value:?}, expected WxH"))?;
    let w: u32 = w.parse().with_context(|| format!("invalid width in --size {value:?}"))?;
    let h: u32 = h.parse().with_context(|| format!("invalid height in --size {value:?}"))?;
    if w == 0 || h == 0 {
        return Err(anyhow!("--size must be non-zero, got {value:?}"));
    }
    Ok((w, h))
}

fn parse_cli(args: &[String]) -> Result<Cli> {
    let mut cli = Cli::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--validate" => {
                cli.validate = true;
                i += 1;
            }
            "--ast-json" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --ast-json"));
                };
                cli.ast_json = Some(PathBuf::from(v));
                i += 2;
            }
            "--config" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --config"));
                };
                cli.config = Some(PathBuf::from(v));
                i += 2;
            }
            "--outputdir" | "--output-dir" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --output-dir"));
                };
                cli.output_dir = Some(PathBuf::from(v));
                i += 2;
            }
            "--size" => {
                let Some(v) = args.get(i + 1) else {
                    return Err(anyhow!("missing value for --size"));
                };
                cli.size = parse_size(v)?;
                i += 2;
            }
            other => {
                return Err(anyhow!(
                    "unknown argument: {other} (supported: --ast-json <tree.json>, --config <config.json>, --output-dir <dir>, --size WxH, --validate)"
                ));
            }
        }
    }
    Ok(cli)
}

/// Compiles the tree and writes every stage source. Returns false when the
/// compile failed.
fn run(cli: &Cli, ast_json: &Path) -> Result<bool> {
    let tree = NodeTree::load_from_path(ast_json)?;
    let config = match &cli.config {
        Some(path) => RuntimeConfig::load_from_path(path)?,
        None => RuntimeConfig::default(),
    };

    let (width, height) = cli.size;
    let device = HeadlessDevice::new(width, height).with_validation(cli.validate || config.validate_glsl);
    let mut runtime = EffectRuntime::new(device, config);
    runtime.init(width, height)?;

    let report = match runtime.compile(&tree) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("{e:#}");
            return Ok(false);
        }
    };
    if !report.warnings.is_empty() {
        eprintln!("{}", report.warnings);
    }

    let Some(effect) = runtime.effect() else {
        return Ok(true);
    };
    match &cli.output_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("failed to create output dir {}", dir.display()))?;
            for source in &effect.sources {
                let path = dir.join(format!(
                    "{}.{}.{}.glsl",
                    source.technique,
                    source.pass,
                    source.stage.file_tag()
                ));
                std::fs::write(&path, &source.source)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                println!("[fx-forge] wrote: {}", path.display());
            }
        }
        None => println!(
            "[fx-forge] compiled {} technique(s), {} stage source(s)",
            effect.techniques.len(),
            effect.sources.len()
        ),
    }
    Ok(true)
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cli = parse_cli(&args)?;
    let Some(ast_json) = cli.ast_json.clone() else {
        return Err(anyhow!("--ast-json <tree.json> is required"));
    };

    if !run(&cli, &ast_json)? {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_cli_defaults_and_flags() {
        let cli = parse_cli(&args(&[
            "--ast-json",
            "tree.json",
            "--validate",
            "--size",
            "640x480",
        ]))
        .unwrap();
        assert_eq!(cli.ast_json, Some(PathBuf::from("tree.json")));
        assert!(cli.validate);
        assert_eq!(cli.size, (640, 480));
        assert!(cli.output_dir.is_none());
    }

    #[test]
    fn test_parse_cli_rejects_unknown_and_bad_size() {
        assert!(parse_cli(&args(&["--headless"])).is_err());
        assert!(parse_cli(&args(&["--size", "12"])).is_err());
        assert!(parse_cli(&args(&["--size", "0x5"])).is_err());
        assert!(parse_cli(&args(&["--config"])).is_err());
    }
}
