//! Interactive SSH sessions into selected instances

use super::{selected, Session};
use crate::output::{print_info, print_warning};
use anyhow::{Context, Result};
use std::path::Path;
use tokio::process::Command;

const SSH_USER: &str = "ubuntu";

fn ssh_args(key_path: &Path, address: &str) -> Vec<String> {
    vec![
        "-i".to_string(),
        key_path.display().to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        format!("{}@{}", SSH_USER, address),
    ]
}

/// Open an SSH session to each selected instance, one after another
pub async fn connect_all(session: &Session, key_path: &Path) -> Result<()> {
    let snapshot = session.snapshot().await?;

    for record in selected(&snapshot, session) {
        let Some(address) = record.public_address.as_deref() else {
            print_warning(&format!("{} has no public address, skipping", record.id));
            continue;
        };

        print_info(&format!(
            "Connecting to {} ({})",
            record.name().unwrap_or(&record.id),
            address
        ));

        let status = Command::new("ssh")
            .args(ssh_args(key_path, address))
            .status()
            .await
            .context("Failed to run ssh")?;

        if !status.success() {
            print_warning(&format!("ssh to {} exited with {}", record.id, status));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_ssh_args() {
        let args = ssh_args(&PathBuf::from("/home/me/.ssh/ops.pem"), "54.1.2.3");
        assert_eq!(
            args,
            vec![
                "-i",
                "/home/me/.ssh/ops.pem",
                "-o",
                "StrictHostKeyChecking=no",
                "ubuntu@54.1.2.3"
            ]
        );
    }
}
