use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use clap::{value_parser, Arg, ArgMatches, Command};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stitch_artifact::CandidatePayload;
use stitch_assembly::{InjectionMap, TemplateGraph};
use stitch_core::{
    Generator, GeneratorError, Orchestrator, PipelineConfig, PipelineError, PromptContext,
    RunContext, RunOutput, TraceLog,
};
use stitch_guardian::SanitizedPayload;
use stitch_schema::{SchemaId, SchemaRegistry, SchemaValidator};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exit code for an artifact the auditor could not repair
const EXIT_UNRECOVERABLE: i32 = 2;

/// Override and patch modes never call a model
#[derive(Debug)]
struct OfflineGenerator;

#[async_trait]
impl Generator for OfflineGenerator {
    async fn generate(&self, _ctx: &PromptContext) -> Result<String, GeneratorError> {
        Err(GeneratorError::Unavailable(
            "no generator backend in offline mode".to_string(),
        ))
    }
}

fn cli() -> Command {
    let template = Arg::new("template")
        .long("template")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("Template graph (.json or .toml)");
    let injections = Arg::new("injections")
        .long("injections")
        .value_parser(value_parser!(PathBuf))
        .help("Deterministic slot values (.json or .toml)");
    let config = Arg::new("config")
        .long("config")
        .value_parser(value_parser!(PathBuf))
        .help("Pipeline configuration (TOML)");
    let out = Arg::new("out")
        .long("out")
        .value_parser(value_parser!(PathBuf))
        .help("Write the document here instead of stdout");
    let sanitized_out = Arg::new("sanitized-out")
        .long("sanitized-out")
        .value_parser(value_parser!(PathBuf))
        .help("Persist the sanitized payload for later patch runs");
    let trace_out = Arg::new("trace-out")
        .long("trace-out")
        .value_parser(value_parser!(PathBuf))
        .help("Write the cognitive trace as JSON lines");
    let report_out = Arg::new("report-out")
        .long("report-out")
        .value_parser(value_parser!(PathBuf))
        .help("Write the diagnostic report as JSON");

    Command::new("stitch")
        .version(stitch_core::VERSION)
        .about("Sanitize, assemble and audit structured page designs")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("override")
                .about("Assemble an externally supplied design (no generation, no repair)")
                .arg(
                    Arg::new("payload")
                        .long("payload")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Design JSON"),
                )
                .arg(
                    Arg::new("reference")
                        .long("reference")
                        .default_value("manual")
                        .help("Where the design came from"),
                )
                .args([
                    template.clone(),
                    injections.clone(),
                    config.clone(),
                    out.clone(),
                    sanitized_out.clone(),
                    trace_out.clone(),
                    report_out.clone(),
                ]),
        )
        .subcommand(
            Command::new("patch")
                .about("Re-assemble a persisted sanitized payload")
                .arg(
                    Arg::new("sanitized")
                        .long("sanitized")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Sanitized payload written by an earlier run"),
                )
                .args([template, injections, config, out, sanitized_out, trace_out, report_out]),
        )
        .subcommand(
            Command::new("validate")
                .about("Check a design against a schema")
                .arg(
                    Arg::new("payload")
                        .long("payload")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Design JSON"),
                )
                .arg(
                    Arg::new("schema")
                        .long("schema")
                        .default_value("design_variant")
                        .help("Built-in schema id"),
                ),
        )
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let matches = cli().get_matches();
    let code = match dispatch(&matches) {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Run failed");
            eprintln!("error: {e:#}");
            1
        }
    };
    std::process::exit(code);
}

fn dispatch(matches: &ArgMatches) -> Result<i32> {
    match matches.subcommand() {
        Some(("override", args)) => {
            let payload = path_arg(args, "payload")?;
            let raw = read(payload)?;
            let reference = args
                .get_one::<String>("reference")
                .map_or("manual", String::as_str);
            let (orchestrator, injections) = setup(args)?;
            let (log, ctx) = traced();
            let result = orchestrator.run_override(reference, &raw, &injections, &ctx);
            finish(args, result, &log)
        }
        Some(("patch", args)) => {
            let path = path_arg(args, "sanitized")?;
            let sanitized: SanitizedPayload = serde_json::from_str(&read(path)?)
                .with_context(|| format!("parsing sanitized payload {}", path.display()))?;
            let (orchestrator, injections) = setup(args)?;
            let (log, ctx) = traced();
            let result = orchestrator.run_patch(sanitized, &injections, &ctx);
            finish(args, result, &log)
        }
        Some(("validate", args)) => {
            let payload = path_arg(args, "payload")?;
            let schema = args
                .get_one::<String>("schema")
                .map_or("design_variant", String::as_str);
            validate(payload, schema)
        }
        _ => bail!("unknown subcommand"),
    }
}

fn path_arg<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a Path> {
    args.get_one::<PathBuf>(name)
        .map(PathBuf::as_path)
        .with_context(|| format!("--{name} is required"))
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn traced() -> (Arc<TraceLog>, RunContext) {
    let log = Arc::new(TraceLog::new());
    let ctx = RunContext::new(log.clone());
    (log, ctx)
}

fn setup(args: &ArgMatches) -> Result<(Orchestrator, InjectionMap)> {
    let config = match args.get_one::<PathBuf>("config") {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    let template = load_template(path_arg(args, "template")?)?;
    let injections = match args.get_one::<PathBuf>("injections") {
        Some(path) => load_injections(path)?,
        None => InjectionMap::new(),
    };
    let orchestrator = Orchestrator::new(config, Arc::new(OfflineGenerator), template)?;
    Ok((orchestrator, injections))
}

fn is_toml(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("toml"))
}

fn load_template(path: &Path) -> Result<TemplateGraph> {
    let content = read(path)?;
    let graph = if is_toml(path) {
        TemplateGraph::from_toml(&content)
    } else {
        TemplateGraph::from_json(&content)
    };
    graph.with_context(|| format!("loading template {}", path.display()))
}

fn load_injections(path: &Path) -> Result<InjectionMap> {
    let content = read(path)?;
    let map = if is_toml(path) {
        InjectionMap::from_toml(&content)
    } else {
        InjectionMap::from_json(&content)
    };
    map.with_context(|| format!("loading injections {}", path.display()))
}

fn write_json(path: &Path, value: &impl Serialize) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("writing {}", path.display()))
}

fn write_trace(path: &Path, log: &TraceLog) -> Result<()> {
    let mut lines = String::new();
    for entry in log.entries() {
        lines.push_str(&serde_json::to_string(&entry)?);
        lines.push('\n');
    }
    std::fs::write(path, lines).with_context(|| format!("writing {}", path.display()))
}

/// Write every requested output; the trace is written even for failed runs
fn finish(
    args: &ArgMatches,
    result: Result<RunOutput, PipelineError>,
    log: &TraceLog,
) -> Result<i32> {
    if let Some(path) = args.get_one::<PathBuf>("trace-out") {
        write_trace(path, log)?;
    }
    log.verify_integrity()?;

    let output = match result {
        Ok(output) => output,
        Err(PipelineError::Unrecoverable { artifact }) => {
            if let (Some(path), Some(report)) =
                (args.get_one::<PathBuf>("report-out"), artifact.report())
            {
                write_json(path, report)?;
            }
            for defect in artifact.report().map(|r| r.defects.as_slice()).unwrap_or_default() {
                eprintln!("unrepaired: {defect}");
            }
            eprintln!(
                "artifact {} is unrecoverable; it was not written",
                artifact.hash().short()
            );
            return Ok(EXIT_UNRECOVERABLE);
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(path) = args.get_one::<PathBuf>("sanitized-out") {
        write_json(path, &output.sanitized)?;
    }
    if let (Some(path), Some(report)) = (args.get_one::<PathBuf>("report-out"), output.artifact.report()) {
        write_json(path, report)?;
    }
    match args.get_one::<PathBuf>("out") {
        Some(path) => {
            std::fs::write(path, output.artifact.document())
                .with_context(|| format!("writing {}", path.display()))?;
            info!(path = %path.display(), hash = %output.artifact.hash().short(), "Artifact written");
        }
        None => print!("{}", output.artifact.document()),
    }
    Ok(0)
}

fn validate(payload: &Path, schema: &str) -> Result<i32> {
    let id = SchemaId::new(schema);
    let Some(schema) = SchemaRegistry::with_builtins().get(&id) else {
        bail!("unknown schema `{id}`");
    };
    let candidate = CandidatePayload::external(payload.display().to_string(), read(payload)?);
    let result = SchemaValidator::new(schema).validate(&candidate);
    if result.valid {
        println!("valid against `{id}`");
        Ok(0)
    } else {
        println!("{}", result.feedback());
        Ok(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TEMPLATE: &str = r#"{
        "id": "mini",
        "version": 1,
        "shell": "<main>{{@COMPONENTS}}</main>",
        "components": {
            "hero": {"markup": "<h1>{{HEADLINE}}</h1>"},
            "footer": {"markup": "<footer>{{BRAND}}</footer>"}
        },
        "slots": {
            "HEADLINE": {"type": "text", "source": {"from": "payload", "field": "headline"}},
            "BRAND": {"type": "text", "source": {"from": "injection", "key": "brand.name"}}
        }
    }"#;

    const DESIGN: &str = r##"{
        "variant_name": "Mini",
        "layout": "single_column",
        "components": ["hero", "footer"],
        "colors": {"primary": "#112233", "secondary": "#445566", "bg": "#FFFFFF"},
        "typography": {"heading": "Inter", "body": "Inter"},
        "border_radius": "8px",
        "headline": "Hello"
    }"##;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn run(args: &[&str]) -> i32 {
        let matches = cli().try_get_matches_from(args).unwrap();
        dispatch(&matches).unwrap()
    }

    #[test]
    fn override_then_patch_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let template = write(dir.path(), "template.json", TEMPLATE);
        let payload = write(dir.path(), "design.json", DESIGN);
        let injections = write(dir.path(), "injections.toml", "\"brand.name\" = \"Acme\"\n");
        let first = dir.path().join("first.html");
        let second = dir.path().join("second.html");
        let sanitized = dir.path().join("sanitized.json");
        let trace = dir.path().join("trace.jsonl");

        let code = run(&[
            "stitch",
            "override",
            "--payload",
            payload.to_str().unwrap(),
            "--template",
            template.to_str().unwrap(),
            "--injections",
            injections.to_str().unwrap(),
            "--out",
            first.to_str().unwrap(),
            "--sanitized-out",
            sanitized.to_str().unwrap(),
            "--trace-out",
            trace.to_str().unwrap(),
        ]);
        assert_eq!(code, 0);
        let document = std::fs::read_to_string(&first).unwrap();
        assert_eq!(document, "<main><h1>Hello</h1>\n<footer>Acme</footer></main>");
        assert!(std::fs::read_to_string(&trace).unwrap().lines().count() >= 3);

        let code = run(&[
            "stitch",
            "patch",
            "--sanitized",
            sanitized.to_str().unwrap(),
            "--template",
            template.to_str().unwrap(),
            "--injections",
            injections.to_str().unwrap(),
            "--out",
            second.to_str().unwrap(),
        ]);
        assert_eq!(code, 0);
        assert_eq!(std::fs::read_to_string(&second).unwrap(), document);
    }

    #[test]
    fn validate_reports_violations() {
        let dir = tempfile::tempdir().unwrap();
        let good = write(dir.path(), "good.json", DESIGN);
        let bad = write(dir.path(), "bad.json", r#"{"variant_name": "Mini"}"#);

        assert_eq!(run(&["stitch", "validate", "--payload", good.to_str().unwrap()]), 0);
        assert_eq!(run(&["stitch", "validate", "--payload", bad.to_str().unwrap()]), 1);
    }

    #[test]
    fn missing_template_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let payload = write(dir.path(), "design.json", DESIGN);
        let matches = cli()
            .try_get_matches_from([
                "stitch",
                "override",
                "--payload",
                payload.to_str().unwrap(),
                "--template",
                dir.path().join("absent.json").to_str().unwrap(),
            ])
            .unwrap();
        let err = dispatch(&matches).unwrap_err();
        assert!(format!("{err:#}").contains("absent.json"));
    }

    #[test]
    fn cli_definition_is_consistent() {
        cli().debug_assert();
    }
}
