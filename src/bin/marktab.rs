//! Command-line front door: parses flags, reads a script file of path definitions and
//! flag overrides, compiles a schema, and hands everything to the orchestrator.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::Parser;
use log::warn;

use marktab::{seed_jobs, Error, Orchestrator, OrchestratorConfig, Result, Schema};

#[derive(Parser)]
#[command(name = "marktab", about = "Stream tag-delimited markup into a tab-separated table")]
struct Cli {
    /// Script file: header/path definitions and optional flag overrides.
    script: PathBuf,

    /// Source file template (supports glob wildcards).
    #[arg(long = "input", visible_alias = "inp")]
    input: Option<String>,

    /// Destination file, or "stdout".
    #[arg(long = "output", visible_alias = "out")]
    output: Option<String>,

    /// Root tag pattern for multi-entity files.
    #[arg(long = "root")]
    root: Option<String>,

    /// Chunk size in MiB (0 disables chunking).
    #[arg(long = "chunk")]
    chunk: Option<u64>,

    /// Worker count; negative means cpu_count + value.
    #[arg(long = "mp")]
    mp: Option<i64>,

    /// Encoding name passed through to the decoder.
    #[arg(long = "encoding")]
    encoding: Option<String>,

    /// Emit statistics on completion.
    #[arg(long = "info")]
    info: bool,
}

struct ScriptLines {
    header: Option<String>,
    paths: Vec<String>,
    overrides: Vec<(String, String)>,
}

fn parse_script(text: &str) -> ScriptLines {
    let mut header = None;
    let mut paths = Vec::new();
    let mut overrides = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("header:") {
            header = Some(rest.trim().to_string());
            continue;
        }
        if let Some((flag, value)) = line.split_once(':') {
            let flag = flag.trim();
            if matches!(flag, "input" | "output" | "root" | "chunk" | "mp" | "encoding") {
                overrides.push((flag.to_string(), value.trim().to_string()));
                continue;
            }
        }
        paths.push(line.to_string());
    }

    ScriptLines { header, paths, overrides }
}

fn override_value<'a>(overrides: &'a [(String, String)], name: &str) -> Option<&'a str> {
    overrides.iter().find(|(flag, _)| flag == name).map(|(_, v)| v.as_str())
}

fn resolve_against(base: &Path, template: &str) -> String {
    if Path::new(template).is_absolute() {
        template.to_string()
    } else {
        base.join(template).to_string_lossy().into_owned()
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    env_logger::init();

    let script_text = fs::read_to_string(&cli.script).map_err(|e| Error::IoOpen {
        path: cli.script.clone(),
        source: e,
    })?;
    let script_dir = cli
        .script
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let script = parse_script(&script_text);

    let input = cli
        .input
        .clone()
        .or_else(|| override_value(&script.overrides, "input").map(str::to_string))
        .ok_or_else(|| Error::InvalidPathSyntax("no input template given (-input or script)".to_string()))?;
    let output = cli
        .output
        .clone()
        .or_else(|| override_value(&script.overrides, "output").map(str::to_string));
    let root_pattern = cli
        .root
        .clone()
        .or_else(|| override_value(&script.overrides, "root").map(str::to_string));
    let chunk_mib: u64 = cli
        .chunk
        .or_else(|| override_value(&script.overrides, "chunk").and_then(|v| v.parse().ok()))
        .unwrap_or(0);
    let workers: i64 = cli
        .mp
        .or_else(|| override_value(&script.overrides, "mp").and_then(|v| v.parse().ok()))
        .unwrap_or(1);
    let encoding_name = cli
        .encoding
        .clone()
        .or_else(|| override_value(&script.overrides, "encoding").map(str::to_string))
        .unwrap_or_else(|| "utf-8".to_string());
    let encoding = encoding_rs::Encoding::for_label(encoding_name.as_bytes()).unwrap_or(encoding_rs::UTF_8);

    let input_template = resolve_against(&script_dir, &input);
    let chunk_bytes = chunk_mib.saturating_mul(1024 * 1024);
    let jobs = seed_jobs(&input_template, root_pattern.is_some(), chunk_bytes)?;

    let mut schema = Schema::new(script.header.as_deref().unwrap_or(""))?;
    for line in &script.paths {
        schema.add_path(line)?;
    }
    schema.validate()?;
    let tree = schema.tree();

    let config = OrchestratorConfig { root_pattern, encoding, workers };
    let orchestrator = Orchestrator::new(config);

    let stats = match output.as_deref() {
        Some("stdout") | None => {
            let stdout = io::stdout();
            let sink = BufWriter::new(stdout.lock());
            orchestrator.run(jobs, &schema, &tree, sink)?
        }
        Some(path) => {
            let resolved = resolve_against(&script_dir, path);
            let file = fs::File::create(&resolved)
                .map_err(|e| Error::IoOpen { path: PathBuf::from(&resolved), source: e })?;
            let sink = BufWriter::new(file);
            orchestrator.run(jobs, &schema, &tree, sink)?
        }
    };

    if cli.info {
        println!("{}", stats.summary());
    }

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        warn!("marktab failed: {e}");
        eprintln!("marktab: {e}");
        std::process::exit(1);
    }
}
