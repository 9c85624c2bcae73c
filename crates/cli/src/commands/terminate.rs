//! Termination of the selected instances

use super::{selected, Session};
use crate::output::{print_error, print_json, print_success, print_warning, OutputFormat};
use anyhow::{bail, Result};
use fleet_lib::provider::Terminator;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct TerminationResult {
    instance_id: String,
    submitted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Submit termination for every selected instance, one call per instance
pub async fn terminate_selected(session: &Session) -> Result<()> {
    let snapshot = session.snapshot().await?;
    let targets = selected(&snapshot, session);
    if targets.is_empty() {
        print_warning("No instances selected");
        return Ok(());
    }

    let provider = session.provider();
    let mut results = Vec::with_capacity(targets.len());

    for record in targets {
        let outcome = provider
            .terminate(&session.region, std::slice::from_ref(&record.id))
            .await;
        results.push(TerminationResult {
            instance_id: record.id.clone(),
            submitted: outcome.is_ok(),
            error: outcome.err().map(|e| e.to_string()),
        });
    }

    match session.format {
        OutputFormat::Json => print_json(&results)?,
        OutputFormat::Table => {
            for result in &results {
                match &result.error {
                    None => print_success(&format!("Termination submitted for {}", result.instance_id)),
                    Some(e) => print_error(&format!("{}: {}", result.instance_id, e)),
                }
            }
        }
    }

    let failed = results.iter().filter(|r| !r.submitted).count();
    if failed > 0 {
        bail!("{} of {} terminations failed", failed, results.len());
    }
    Ok(())
}
