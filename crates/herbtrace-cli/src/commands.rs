use anyhow::{bail, Context};
use colored::Colorize;
use serde_json::{Map, Value};

use herbtrace_ledger::{
    Event, HistoryValidator, LocalChain, ProjectionBuilder, ProvenanceView, ValidationReport,
};
use herbtrace_server::{HerbtraceServer, ServerConfig};
use herbtrace_types::BatchId;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref(), cli.data_dir)?;
    let format = cli.format;
    match cli.command {
        Command::Serve(args) => cmd_serve(config, args),
        Command::Create(args) => {
            let chain = open_chain(&config)?;
            let batch_id = args
                .batch_id
                .unwrap_or_else(|| BatchId::generate().to_string());
            let history = chain.create_batch(&args.event.org, &batch_id, &build_payload(&args.event)?)?;
            print_appended(&format, "Created batch", &batch_id, &history)
        }
        Command::Process(args) => {
            let chain = open_chain(&config)?;
            let history =
                chain.process_batch(&args.event.org, &args.batch_id, &build_payload(&args.event)?)?;
            print_appended(&format, "Processed batch", &args.batch_id, &history)
        }
        Command::LabTest(args) => {
            let chain = open_chain(&config)?;
            let history =
                chain.add_lab_test(&args.event.org, &args.batch_id, &build_payload(&args.event)?)?;
            print_appended(&format, "Recorded lab test for", &args.batch_id, &history)
        }
        Command::History(args) => cmd_history(&open_chain(&config)?, &format, args),
        Command::Batches => cmd_batches(&open_chain(&config)?, &format),
        Command::Pending(args) => cmd_pending(&open_chain(&config)?, &format, args.stage),
        Command::Provenance(args) => {
            let chain = open_chain(&config)?;
            let history = chain.history("", &args.batch_id)?;
            print_provenance(&format, &ProjectionBuilder::provenance(&args.batch_id, &history))
        }
        Command::Verify(args) => cmd_verify(&open_chain(&config)?, &format, args),
    }
}

fn load_config(
    path: Option<&std::path::Path>,
    data_dir: Option<std::path::PathBuf>,
) -> anyhow::Result<ServerConfig> {
    let mut config = match path {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    Ok(config)
}

fn open_chain(config: &ServerConfig) -> anyhow::Result<LocalChain> {
    tracing::debug!(data_dir = %config.data_dir.display(), "opening ledger");
    HerbtraceServer::new(config.clone())
        .open_chain()
        .with_context(|| format!("opening ledger in {}", config.data_dir.display()))
}

/// Event attributes the ledger stores as text.
const TEXT_FIELDS: &[&str] = &[
    "type",
    "batchId",
    "status",
    "collector",
    "farmLocation",
    "species",
    "quality",
    "farmer",
    "facility",
    "facilityLocation",
    "managerName",
    "processType",
    "processor",
    "labName",
    "labLocation",
    "labManagerName",
    "resultStatus",
    "lab",
];

/// Value of one `-f key=value` flag: text attributes stay strings, other
/// values keep their JSON type when they parse.
fn field_value(key: &str, raw: &str) -> Value {
    if TEXT_FIELDS.contains(&key) {
        return Value::String(raw.to_string());
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Merge `--payload` and `-f key=value` flags into one JSON object.
pub(crate) fn build_payload(event: &EventArgs) -> anyhow::Result<String> {
    let mut fields = match &event.payload {
        Some(text) => match serde_json::from_str::<Value>(text).context("--payload is not JSON")? {
            Value::Object(map) => map,
            _ => bail!("--payload must be a JSON object"),
        },
        None => Map::new(),
    };
    for (key, raw) in &event.fields {
        fields.insert(key.clone(), field_value(key, raw));
    }
    Ok(Value::Object(fields).to_string())
}

fn cmd_serve(mut config: ServerConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.bind_addr = bind.parse().with_context(|| format!("invalid bind address {bind}"))?;
    }
    if args.no_anonymous_read {
        config.allow_anonymous_read = false;
    }
    println!(
        "herbtrace server on {} (data: {})",
        config.bind_addr.to_string().bold(),
        config.data_dir.display()
    );
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(HerbtraceServer::new(config).serve())?;
    Ok(())
}

fn print_appended(
    format: &OutputFormat,
    verb: &str,
    batch_id: &str,
    history: &[Event],
) -> anyhow::Result<()> {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(history)?);
        return Ok(());
    }
    println!("{} {} {}", "✓".green().bold(), verb, batch_id.yellow().bold());
    if let Some(last) = history.last() {
        println!("  Event: {} ({})", last.kind().title(), last.status.cyan());
        println!("  Time: {}", last.timestamp);
    }
    println!("  History: {} events", history.len());
    Ok(())
}

fn cmd_history(chain: &LocalChain, format: &OutputFormat, args: HistoryArgs) -> anyhow::Result<()> {
    if args.raw {
        println!("{}", chain.batch_history("", &args.batch_id)?);
        return Ok(());
    }
    let history = chain.history("", &args.batch_id)?;
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }
    println!("Batch {}", args.batch_id.yellow().bold());
    for (i, event) in history.iter().enumerate() {
        println!(
            "  {} {:<10} {}  {}",
            format!("#{}", i + 1).dimmed(),
            event.kind().to_string(),
            event.timestamp,
            event.status.cyan()
        );
    }
    Ok(())
}

fn cmd_batches(chain: &LocalChain, format: &OutputFormat) -> anyhow::Result<()> {
    let records = chain.all_batches("")?;
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        println!("No batches.");
    }
    for record in &records {
        let stage = record
            .record
            .last()
            .map(|e| e.kind().title())
            .unwrap_or("-");
        println!("{}  {} events, last: {}", record.key.yellow(), record.record.len(), stage);
    }
    Ok(())
}

fn cmd_pending(chain: &LocalChain, format: &OutputFormat, stage: PendingStage) -> anyhow::Result<()> {
    let records = chain.all_batches("")?;
    match stage {
        PendingStage::Processing => {
            let rows = ProjectionBuilder::pending_processing(&records);
            if let OutputFormat::Json = format {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }
            println!("{} batches awaiting processing", rows.len().to_string().bold());
            for row in rows {
                println!(
                    "  {}  {}  {}  {}",
                    row.batch_id.yellow(),
                    row.species.as_deref().unwrap_or("-"),
                    row.quality.as_deref().unwrap_or("-"),
                    row.status.cyan()
                );
            }
        }
        PendingStage::Testing => {
            let rows = ProjectionBuilder::pending_testing(&records);
            if let OutputFormat::Json = format {
                println!("{}", serde_json::to_string_pretty(&rows)?);
                return Ok(());
            }
            println!("{} batches awaiting lab tests", rows.len().to_string().bold());
            for row in rows {
                println!(
                    "  {}  {}  {}  {}",
                    row.batch_id.yellow(),
                    row.species.as_deref().unwrap_or("-"),
                    row.processor.as_deref().unwrap_or("-"),
                    row.status.cyan()
                );
            }
        }
    }
    Ok(())
}

fn print_provenance(format: &OutputFormat, view: &ProvenanceView) -> anyhow::Result<()> {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(view)?);
        return Ok(());
    }
    println!("Provenance of {}", view.batch_id.yellow().bold());
    for entry in &view.entries {
        println!("\n{} {}", "●".green(), entry.title.bold());
        println!("  Time: {}", entry.timestamp);
        println!("  Status: {}", entry.status.cyan());
        if let Some(actor) = &entry.actor {
            println!("  By: {actor}");
        }
        for line in &entry.details {
            println!("  {}: {}", line.label, line.value);
        }
        if let Some(link) = &entry.evidence {
            println!("  Evidence: {}", link.blue());
        }
        if let Some(point) = entry.location {
            println!("  Location: {:.5}, {:.5}", point.lat, point.long);
        }
    }
    if !view.route.is_empty() {
        println!("\nRoute:");
        for marker in &view.route {
            println!("  {} ({:.5}, {:.5})", marker.label, marker.lat, marker.lng);
        }
    }
    Ok(())
}

pub(crate) fn audit(chain: &LocalChain, batch_id: Option<&str>) -> anyhow::Result<Vec<ValidationReport>> {
    Ok(match batch_id {
        Some(id) => vec![HistoryValidator::validate(id, &chain.history("", id)?)],
        None => HistoryValidator::validate_all(&chain.all_batches("")?),
    })
}

fn cmd_verify(chain: &LocalChain, format: &OutputFormat, args: VerifyArgs) -> anyhow::Result<()> {
    let reports = audit(chain, args.batch_id.as_deref())?;
    let failed = reports.iter().filter(|r| !r.is_valid()).count();

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        for report in &reports {
            if report.is_valid() {
                println!("{} {} ({} events)", "✓".green(), report.batch_id, report.event_count);
            } else {
                println!("{} {}", "✗".red().bold(), report.batch_id.bold());
                for v in &report.violations {
                    println!("  #{} {:?}: {}", v.index + 1, v.kind, v.description);
                }
            }
        }
        println!("{} batches checked, {} with violations", reports.len(), failed);
    }

    if failed > 0 {
        bail!("{failed} batch histories violate ledger invariants");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use herbtrace_store::KeyedStore;

    fn event(payload: Option<&str>, fields: &[(&str, &str)]) -> EventArgs {
        EventArgs {
            org: "Org1MSP".into(),
            payload: payload.map(str::to_string),
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn payload_merges_json_and_fields() {
        let text = build_payload(&event(
            Some(r#"{"species":"Mint","quality":"B"}"#),
            &[("quality", "A+"), ("lat", "12.5"), ("farmer", "ravi")],
        ))
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"species": "Mint", "quality": "A+", "lat": 12.5, "farmer": "ravi"})
        );
    }

    #[test]
    fn numeric_looking_text_fields_stay_strings() {
        let text = build_payload(&event(
            None,
            &[("quality", "5"), ("species", "true"), ("long", "77"), ("moisture", "12.5")],
        ))
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"quality": "5", "species": "true", "long": 77, "moisture": 12.5})
        );

        let dir = tempfile::tempdir().unwrap();
        let config = load_config(None, Some(dir.path().to_path_buf())).unwrap();
        let chain = open_chain(&config).unwrap();
        chain.create_batch("Org1MSP", "B1", &text).unwrap();
        let history = chain.history("Org1MSP", "B1").unwrap();
        assert_eq!(
            history[0].as_collection().and_then(|c| c.quality.as_deref()),
            Some("5")
        );
    }

    #[test]
    fn payload_must_be_an_object() {
        assert!(build_payload(&event(Some("[1]"), &[])).is_err());
        assert!(build_payload(&event(Some("{oops"), &[])).is_err());
        assert_eq!(build_payload(&event(None, &[])).unwrap(), "{}");
    }

    #[test]
    fn config_data_dir_override() {
        let config = load_config(None, Some("/tmp/elsewhere".into())).unwrap();
        assert_eq!(config.data_dir, std::path::PathBuf::from("/tmp/elsewhere"));
    }

    #[test]
    fn audit_over_persisted_ledger() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(None, Some(dir.path().to_path_buf())).unwrap();
        {
            let chain = open_chain(&config).unwrap();
            chain.create_batch("Org1MSP", "B1", r#"{"species":"Mint"}"#).unwrap();
            chain.process_batch("Org2MSP", "B1", "{}").unwrap();
        }

        let chain = open_chain(&config).unwrap();
        let reports = audit(&chain, None).unwrap();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_valid());

        // A history written around the ledger is caught.
        chain
            .store()
            .put("B2", br#"[{"type":"processing","batchId":"B2","timestamp":"2024-03-01T10:00:00.000Z","status":"processed"}]"#)
            .unwrap();
        let reports = audit(&chain, Some("B2")).unwrap();
        assert!(!reports[0].is_valid());
        assert!(cmd_verify(&chain, &OutputFormat::Json, VerifyArgs { batch_id: None }).is_err());
    }
}
