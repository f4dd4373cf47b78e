//! CLI command implementations
//!
//! The watch commands build a mounted context over the fixture's
//! in-memory store, attach one binding and apply the scripted writes one
//! by one. Every state transition of the binding becomes one line, tagged
//! with the step that caused it; a step that changes nothing (a denied
//! write, say) prints no state line. The last line is a summary of the
//! diagnostics listener and the metrics registry.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::binding::{CollectionBinding, DocumentBinding, SubscriptionResult, Writes};
use crate::config::LivedocConfig;
use crate::context::{Identity, ServiceContext};
use crate::diagnostics::DiagnosticsListener;
use crate::observability::{LogTarget, Logger};
use crate::store::{CollectionPath, DocumentPath, FilterOp, Query, SortDirection};

use super::args::Command;
use super::errors::{CliError, CliResult};
use super::fixture::Fixture;
use super::io::write_lines;

/// Parse arguments and run the selected command.
///
/// Stdout carries only command output; every log line goes to stderr.
pub fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    Logger::set_target(LogTarget::Stderr);
    run_command(cli.command)
}

/// Run the appropriate command based on CLI args
pub fn run_command(cmd: Command) -> CliResult<()> {
    let lines = match cmd {
        Command::WatchDoc {
            fixture,
            path,
            uid,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            watch_document(&fixture, &path, uid, &config)?
        }
        Command::WatchQuery {
            fixture,
            collection,
            where_eq,
            order_by,
            desc,
            limit,
            uid,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let query = build_query(&collection, &where_eq, order_by, desc, limit)?;
            watch_query(&fixture, query, uid, &config)?
        }
        Command::CheckConfig { config } => vec![check_config(&config)?],
    };
    write_lines(&lines)
}

fn load_config(path: Option<&Path>) -> CliResult<LivedocConfig> {
    let config = match path {
        Some(path) => LivedocConfig::load(path)?,
        None => LivedocConfig::default(),
    };
    config.apply();
    Ok(config)
}

/// Validate a configuration file and return the effective settings
pub fn check_config(path: &Path) -> CliResult<Value> {
    let config = LivedocConfig::load(path)?;
    Ok(json!({
        "status": "ok",
        "config": serde_json::to_value(&config)?,
    }))
}

/// Build a query from command-line pieces
pub fn build_query(
    collection: &str,
    where_eq: &[String],
    order_by: Option<String>,
    desc: bool,
    limit: Option<usize>,
) -> CliResult<Query> {
    let mut query = Query::new(CollectionPath::parse(collection)?);
    for clause in where_eq {
        let (field, raw) = clause.split_once('=').ok_or_else(|| {
            CliError::invalid_argument(format!("expected FIELD=VALUE, got '{}'", clause))
        })?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        query = query.filter(field, FilterOp::Eq, value);
    }
    if let Some(field) = order_by {
        let direction = if desc {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        };
        query = query.order_by(field, direction);
    }
    if let Some(limit) = limit {
        query = query.limit(limit);
    }
    Ok(query)
}

struct Session {
    ctx: Arc<ServiceContext>,
    fixture: Fixture,
    diagnostics: Option<DiagnosticsListener>,
}

impl Session {
    fn open(fixture_path: &Path, uid: Option<String>, config: &LivedocConfig) -> CliResult<Self> {
        let fixture = Fixture::load(fixture_path)?;
        let backend = fixture.backend()?;

        let mut builder = ServiceContext::builder().backend(Arc::new(backend));
        if let Some(identity) = uid.map(Identity::new).or_else(|| fixture.identity.clone()) {
            builder = builder.identity(identity);
        }
        let ctx = builder.mounted().build();

        let diagnostics = config
            .diagnostics
            .enabled
            .then(|| DiagnosticsListener::attach(ctx.emitter(), config.diagnostics.capacity));

        Ok(Self {
            ctx,
            fixture,
            diagnostics,
        })
    }

    /// Apply every scripted write, recording each transition it causes.
    /// `changes` must have been taken before the binding was watched.
    fn run<V: Serialize>(
        &self,
        mut changes: UnboundedReceiver<SubscriptionResult<V>>,
    ) -> CliResult<Vec<Value>> {
        let mut lines = Vec::new();
        drain("watch", &mut changes, &mut lines)?;

        let writes = Writes::new(Arc::clone(&self.ctx));
        for write in &self.fixture.writes {
            write.apply(&writes)?;
            drain(&write.label(), &mut changes, &mut lines)?;
        }
        lines.push(self.summary());
        Ok(lines)
    }

    fn summary(&self) -> Value {
        json!({
            "step": "summary",
            "diagnostics": self.diagnostics.as_ref().map(|d| json!({
                "summary": d.summary(),
                "records": d.records(),
            })),
            "metrics": self.ctx.metrics().to_json(),
        })
    }
}

/// Append one line per transition already queued on `changes`
fn drain<V: Serialize>(
    step: &str,
    changes: &mut UnboundedReceiver<SubscriptionResult<V>>,
    lines: &mut Vec<Value>,
) -> CliResult<()> {
    while let Ok(state) = changes.try_recv() {
        lines.push(json!({
            "step": step,
            "state": serde_json::to_value(&state)?,
        }));
    }
    Ok(())
}

/// Watch one document through the fixture's writes
pub fn watch_document(
    fixture_path: &Path,
    path: &str,
    uid: Option<String>,
    config: &LivedocConfig,
) -> CliResult<Vec<Value>> {
    let path = DocumentPath::parse(path)?;
    let session = Session::open(fixture_path, uid, config)?;

    let binding = DocumentBinding::<Value>::new(Arc::clone(&session.ctx));
    let changes = binding.changes();
    binding.watch(Some(path));
    session.run(changes)
}

/// Watch a query through the fixture's writes
pub fn watch_query(
    fixture_path: &Path,
    query: Query,
    uid: Option<String>,
    config: &LivedocConfig,
) -> CliResult<Vec<Value>> {
    let session = Session::open(fixture_path, uid, config)?;

    let binding = CollectionBinding::<Value>::new(Arc::clone(&session.ctx));
    let changes = binding.changes();
    binding.watch(Some(query));
    session.run(changes)
}
