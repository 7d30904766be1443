use std::fs;

use anyhow::{bail, Context};
use chronofold::config::{ConfigOverrides, ConsolidationConfig, FieldOverrides, PriorityOverrides};
use chronofold::{Consolidator, Direction, Record};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn parse_arg(flag: &str) -> Option<String> {
    let mut args = std::env::args();
    while let Some(arg) = args.next() {
        if arg == flag {
            return args.next();
        }
    }
    None
}

fn has_flag(flag: &str) -> bool {
    std::env::args().any(|arg| arg == flag)
}

fn print_help() {
    eprintln!(
        r#"chronofold - consolidate overlapping interval records

USAGE:
    chronofold --input <FILE> [OPTIONS]

OPTIONS:
    -i, --input <FILE>      JSON array of records to consolidate
    -o, --output <FILE>     Write surviving records here [default: stdout]
        --statuses <FILE>   Write the status report (JSON) here
    -c, --config <FILE>     Path to config file (TOML)
        --start <FIELD>     Start field [default: START_DATE]
        --end <FIELD>       End field [default: END_DATE]
        --entity <FIELD>    Entity field [default: none, single partition]
        --reverse           Fold in descending priority order
        --strict            Reject records the policy cannot order
    -h, --help              Print help

ENVIRONMENT:
    CHRONOFOLD_CONFIG               Path to config file
    CHRONOFOLD_FIELDS__ENTITY       Entity field
    CHRONOFOLD_PRIORITY__POLICY     Priority policy name
    RUST_LOG                        Log filter [default: info]

CONFIG FILE (chronofold.toml):
    [fields]
    start = "START_DATE"
    end = "END_DATE"
    entity = "ENTITY_ID"

    [boundary]
    input_end = "exclusive"
    output_end = "inclusive"
    status_field = "STATUS"
"#
    );
}

fn overrides() -> ConfigOverrides {
    let fields = FieldOverrides {
        start: parse_arg("--start"),
        end: parse_arg("--end"),
        entity: parse_arg("--entity"),
    };
    let priority = PriorityOverrides {
        policy: None,
        direction: has_flag("--reverse").then_some(Direction::Descending),
        strict: has_flag("--strict").then_some(true),
    };
    ConfigOverrides {
        fields: Some(fields),
        priority: Some(priority),
    }
}

fn main() -> anyhow::Result<()> {
    if has_flag("-h") || has_flag("--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let input = parse_arg("--input")
        .or_else(|| parse_arg("-i"))
        .context("missing --input <FILE>")?;
    let config_path = parse_arg("--config")
        .or_else(|| parse_arg("-c"))
        .or_else(|| std::env::var("CHRONOFOLD_CONFIG").ok());

    let config = ConsolidationConfig::load(config_path.as_deref(), overrides())?;
    let consolidator = Consolidator::from_config(&config)?;

    let raw = fs::read_to_string(&input).with_context(|| format!("reading {input}"))?;
    let records: Vec<Record> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {input}"))?;
    info!(records = records.len(), input = %input, "loaded records");

    let report = consolidator.run(records);
    let exported = consolidator.export(&report)?;
    let rendered = serde_json::to_string_pretty(&exported)?;
    match parse_arg("--output").or_else(|| parse_arg("-o")) {
        Some(path) => fs::write(&path, rendered).with_context(|| format!("writing {path}"))?,
        None => println!("{rendered}"),
    }

    if let Some(path) = parse_arg("--statuses") {
        let entries = consolidator.status_entries(&report);
        fs::write(&path, serde_json::to_string_pretty(&entries)?)
            .with_context(|| format!("writing {path}"))?;
    }

    let stats = report.stats;
    info!(
        input = stats.input_records,
        output = stats.output_records,
        partitions = stats.partitions,
        retained = stats.statuses.added_retained,
        trimmed_start = stats.statuses.trimmed_start,
        trimmed_end = stats.statuses.trimmed_end,
        removed = stats.statuses.removed(),
        "consolidation finished"
    );

    if !report.is_complete() {
        bail!(
            "{} of {} partitions failed, {} records unassigned",
            stats.failed_partitions,
            stats.partitions,
            stats.unassigned_records
        );
    }
    Ok(())
}
