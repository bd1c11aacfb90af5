//! Thin CLI over a definition document: generate, validate, dry-run requests.
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::{Args, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use rayon::prelude::*;
use serde_json::Value;
use tracing::{debug, info};

use json_contract::{Api, Document, Issue, MemoryCollection, RawRequest};

// ————————————————————————————————————————————————————————————————————————————
// TYPES
// ————————————————————————————————————————————————————————————————————————————

/// generate artifacts from an api definition document, validate payloads
/// against it, or dry-run a request through the full pipeline
#[derive(Parser, Debug)]
#[command(name = "json-contract", version)]
pub struct CommandLineInterface {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// emit an OpenAPI 3.1 document
    Openapi(OpenApiOut),
    /// emit JSON Schema (draft 2020-12) for every named definition
    JsonSchema(GenerateOut),
    /// emit TypeScript declarations
    Typescript(GenerateOut),
    /// validate payload files against one action
    Validate(ValidateIn),
    /// run one request against an in-memory record set
    Request(RequestIn),
}

#[derive(Args, Debug, Clone)]
struct DocumentSettings {
    /// api definition document (JSON)
    #[arg(long, short)]
    document: PathBuf,
}

#[derive(Args, Debug, Clone)]
struct GenerateOut {
    #[command(flatten)]
    document_settings: DocumentSettings,

    /// output file (stdout if omitted)
    #[arg(short, long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
struct OpenApiOut {
    #[command(flatten)]
    generate: GenerateOut,

    #[arg(long, default_value = "API")]
    title: String,

    #[arg(long, default_value = "1.0.0")]
    api_version: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Body,
    Query,
    Response,
}

#[derive(Args, Debug, Clone)]
struct ValidateIn {
    #[command(flatten)]
    document_settings: DocumentSettings,

    /// target action as `contract#action`
    #[arg(long, short)]
    action: String,

    /// which part of the exchange the payloads are
    #[arg(long, value_enum, default_value_t = Section::Body)]
    section: Section,

    /// One or more inputs. May be literal paths or quoted glob patterns
    #[arg(long, short, num_args = 1.., required = true)]
    input: Vec<String>,
}

#[derive(Args, Debug, Clone)]
struct RequestIn {
    #[command(flatten)]
    document_settings: DocumentSettings,

    /// target action as `contract#action`
    #[arg(long, short)]
    action: String,

    /// raw query string, e.g. `filter[status]=draft&page[number]=2`
    #[arg(long, default_value = "")]
    query: String,

    /// member id for member actions
    #[arg(long)]
    id: Option<String>,

    /// JSON request body file
    #[arg(long)]
    body: Option<PathBuf>,

    /// JSON array of records to serve from
    #[arg(long)]
    records: Option<PathBuf>,
}

// ————————————————————————————————————————————————————————————————————————————
// IMPLEMENTATION
// ————————————————————————————————————————————————————————————————————————————

impl DocumentSettings {
    fn load(&self) -> anyhow::Result<Api> {
        let api = Document::load(&self.document)?.seal()?;
        info!(document = %self.document.display(), "api loaded");
        Ok(api)
    }
}

impl CommandLineInterface {
    pub fn load() -> Self {
        Self::parse()
    }

    pub fn run(&self) -> anyhow::Result<()> {
        match &self.cmd {
            Command::Openapi(target) => {
                let api = target.generate.document_settings.load()?;
                let doc = json_contract::codegen::openapi(&api, &target.title, &target.api_version);
                write_output(target.generate.out.as_deref(), &serde_json::to_string_pretty(&doc)?)
            }
            Command::JsonSchema(target) => {
                let api = target.document_settings.load()?;
                let doc = json_contract::codegen::json_schema(&api);
                write_output(target.out.as_deref(), &serde_json::to_string_pretty(&doc)?)
            }
            Command::Typescript(target) => {
                let api = target.document_settings.load()?;
                write_output(target.out.as_deref(), &json_contract::codegen::typescript(&api))
            }
            Command::Validate(target) => target.run(),
            Command::Request(target) => target.run(),
        }
    }
}

impl ValidateIn {
    fn run(&self) -> anyhow::Result<()> {
        let api = self.document_settings.load()?;
        let endpoint = api.endpoint_for(&self.action)?;
        let source_paths = resolve_file_path_patterns(&self.input)?;
        debug!(files = source_paths.len(), "validating payloads");

        // sealed graph is shared read-only across workers
        let results: Vec<(PathBuf, anyhow::Result<Vec<Issue>>)> = source_paths
            .into_par_iter()
            .map(|path| {
                let issues = read_json(&path).and_then(|payload| {
                    let issues = match self.section {
                        Section::Body => endpoint.validate(RawRequest::new().with_body(payload))?.issues,
                        Section::Query => {
                            let Value::Object(query) = payload else { bail!("query payload must be an object") };
                            let outcome = endpoint.validate(RawRequest::new().with_query(query))?;
                            outcome.all_issues().cloned().collect()
                        }
                        Section::Response => endpoint.validate_response(Some(&payload))?.issues,
                    };
                    Ok(issues)
                });
                (path, issues)
            })
            .collect();

        let mut failed = 0usize;
        for (path, result) in &results {
            let path = path.to_string_lossy();
            match result {
                Ok(issues) if issues.is_empty() => eprintln!("{} {path}", "✓".green()),
                Ok(issues) => {
                    failed += 1;
                    eprintln!("{} {path}", "✗".red());
                    for issue in issues {
                        eprintln!("    {}", issue.to_string().yellow());
                    }
                }
                Err(error) => {
                    failed += 1;
                    eprintln!("{} {path}: {error:#}", "✗".red().bold());
                }
            }
        }
        if failed > 0 {
            bail!("{failed} of {} payloads failed validation", results.len());
        }
        Ok(())
    }
}

impl RequestIn {
    fn run(&self) -> anyhow::Result<()> {
        let api = self.document_settings.load()?;
        let endpoint = api.endpoint_for(&self.action)?;

        let mut request = RawRequest::new().with_query_string(&self.query);
        if let Some(id) = &self.id {
            request = request.with_path_param("id", id.clone());
        }
        if let Some(body) = &self.body {
            request = request.with_body(read_json(body)?);
        }
        let records = match &self.records {
            Some(path) => match read_json(path)? {
                Value::Array(rows) => rows,
                _ => bail!("{}: records must be a JSON array", path.display()),
            },
            None => Vec::new(),
        };
        let primary_key = endpoint
            .contract()
            .schema_name()
            .and_then(|s| api.schema(s))
            .map_or("id", |s| s.primary_key_name());
        let collection = MemoryCollection::new(records).primary_key(primary_key);

        let response = endpoint.run(request, &collection)?;
        eprintln!("{}", format!("HTTP {}", response.status).bold());
        if let Some(body) = response.body {
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
        Ok(())
    }
}

// ————————————————————————————————————————————————————————————————————————————
// INTERNAL HELPERS
// ————————————————————————————————————————————————————————————————————————————

fn read_json(path: &Path) -> anyhow::Result<Value> {
    let source = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&source).with_context(|| format!("failed to parse JSON source file ({})", path.display()))
}

fn write_output(out: Option<&Path>, contents: &str) -> anyhow::Result<()> {
    match out {
        Some(out) => {
            if let Some(parent) = out.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(out, contents).with_context(|| format!("failed to write {}", out.display()))?;
            info!(out = %out.display(), "written");
        }
        None => println!("{contents}"),
    }
    Ok(())
}

fn resolve_file_path_patterns<I>(patterns: I) -> anyhow::Result<Vec<PathBuf>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    fn has_glob_chars(s: &str) -> bool {
        s.bytes().any(|b| matches!(b, b'*' | b'?' | b'[' | b'{'))
    }

    let mut out = Vec::<PathBuf>::new();

    for raw in patterns {
        let pattern = raw.as_ref();

        if has_glob_chars(pattern) {
            let mut matched_any = false;
            for entry in glob::glob(pattern)? {
                matched_any = true;
                out.push(entry?);
            }
            if !matched_any {
                return Err(anyhow!("glob pattern matched no files: {pattern}"));
            }
        } else {
            out.push(PathBuf::from(pattern));
        }
    }

    Ok(out)
}
