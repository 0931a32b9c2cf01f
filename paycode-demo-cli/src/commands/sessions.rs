//! SSO session commands - list, revoke

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use crate::ui;

pub async fn list(storage_dir: &Path, active_only: bool, verbose: bool) -> Result<()> {
    ui::header("SSO Sessions");
    let coordinator = super::open(storage_dir)?;
    let sessions = if active_only {
        coordinator.sessions().list_active(chrono::Utc::now()).await?
    } else {
        coordinator.sessions().list().await?
    };

    if sessions.is_empty() {
        ui::info("No sessions found");
        return Ok(());
    }

    for session in sessions {
        println!("\n{} ({})", session.service_name.bold(), ui::status(session.status));
        ui::key_value("  ID", &session.id);
        ui::key_value("  Service", &session.service_url);
        ui::key_value(
            "  Signature",
            if session.auth47_enabled {
                "ECDSA + SPHINCS+"
            } else {
                "ECDSA"
            },
        );
        ui::key_value(
            "  Expires",
            &session.expires_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        if verbose {
            ui::key_value("  Nonce", &session.nonce);
            println!("{}", session.signature.dimmed());
        }
    }
    Ok(())
}

pub async fn revoke(storage_dir: &Path, session_id: &str, _verbose: bool) -> Result<()> {
    let coordinator = super::open(storage_dir)?;
    let session = coordinator.sessions().revoke(session_id).await?;
    ui::success(&format!("Session for {} revoked", session.service_name));
    Ok(())
}
