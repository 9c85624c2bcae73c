//! Instance listing

use super::{selected, Session};
use crate::output::{color_state, print_json, print_rows, OutputFormat};
use anyhow::Result;
use colored::Colorize;
use fleet_lib::InstanceRecord;
use serde::Serialize;
use std::collections::BTreeMap;

/// Optional columns requested on the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct Columns {
    pub public_ip: bool,
    pub private_ip: bool,
    pub tags: bool,
    pub state: bool,
}

#[derive(Debug, Serialize)]
struct InstanceRow<'a> {
    id: &'a str,
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    public_ip: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    private_ip: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tags: Option<&'a BTreeMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    state: Option<&'a str>,
}

impl<'a> InstanceRow<'a> {
    fn new(record: &'a InstanceRecord, columns: Columns) -> Self {
        Self {
            id: &record.id,
            name: record.name(),
            public_ip: columns
                .public_ip
                .then(|| record.public_address.as_deref().unwrap_or("-")),
            private_ip: columns
                .private_ip
                .then(|| record.private_address.as_deref().unwrap_or("-")),
            tags: columns.tags.then_some(&record.tags),
            state: columns.state.then(|| record.lifecycle_state.as_str()),
        }
    }
}

fn header(columns: Columns) -> Vec<String> {
    let mut header = vec!["NAME".to_string(), "INSTANCE".to_string()];
    if columns.public_ip {
        header.push("PUBLIC IP".to_string());
    }
    if columns.private_ip {
        header.push("PRIVATE IP".to_string());
    }
    if columns.state {
        header.push("STATE".to_string());
    }
    if columns.tags {
        header.push("TAGS".to_string());
    }
    header
}

fn table_row(record: &InstanceRecord, columns: Columns) -> Vec<String> {
    let mut row = vec![
        record.name().unwrap_or("-").cyan().to_string(),
        record.id.clone(),
    ];
    if columns.public_ip {
        row.push(record.public_address.clone().unwrap_or_else(|| "-".to_string()));
    }
    if columns.private_ip {
        row.push(record.private_address.clone().unwrap_or_else(|| "-".to_string()));
    }
    if columns.state {
        row.push(color_state(&record.lifecycle_state));
    }
    if columns.tags {
        let tags: Vec<String> = record
            .tags
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        row.push(tags.join("\n"));
    }
    row
}

/// List the selected instances
pub async fn show_instances(session: &Session, columns: Columns) -> Result<()> {
    let snapshot = session.snapshot().await?;
    let records = selected(&snapshot, session);

    match session.format {
        OutputFormat::Json => {
            let rows: Vec<InstanceRow> = records
                .iter()
                .map(|r| InstanceRow::new(r, columns))
                .collect();
            print_json(&rows)?;
        }
        OutputFormat::Table => {
            let mut rows = vec![header(columns)];
            rows.extend(records.iter().map(|r| table_row(r, columns)));
            print_rows(rows);
        }
    }

    Ok(())
}
