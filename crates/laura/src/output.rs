use std::io::IsTerminal;

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use laura_link::{DecodedEvent, StatusValue};
use serde::Serialize;

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One JSON document per line.
pub fn print_json<T: Serialize>(value: &T) {
    println!(
        "{}",
        serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
    );
}

pub fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

/// Key/value rows, for single-record output.
pub fn print_fields(fields: &[(&str, String)], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            let mut out = table(&["FIELD", "VALUE"]);
            for (name, value) in fields {
                out.add_row(vec![name.to_string(), value.clone()]);
            }
            println!("{out}");
        }
        OutputFormat::Pretty | OutputFormat::Json => {
            let line: Vec<String> = fields
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect();
            println!("{}", line.join(" "));
        }
    }
}

/// Short human summary of an event.
pub fn event_summary(event: &DecodedEvent) -> String {
    match event {
        DecodedEvent::CommandResult { name, result, .. }
        | DecodedEvent::SettingResult { name, result, .. } => format!("{name}: {result}"),
        DecodedEvent::StatusSnapshot { statuses } => statuses
            .iter()
            .map(|(name, value)| format!("{name}={}", status_text(value)))
            .collect::<Vec<_>>()
            .join(", "),
    }
}

pub fn status_text(value: &StatusValue) -> String {
    match value {
        StatusValue::Bool(flag) => flag.to_string(),
        StatusValue::Int(number) => number.to_string(),
        StatusValue::Text(text) => format!("{text:?}"),
    }
}
