//! Payment code commands - create, import, list, show, delete

use anyhow::Result;
use colored::Colorize;
use std::path::Path;

use crate::ui;

pub async fn create(storage_dir: &Path, label: &str, verbose: bool) -> Result<()> {
    ui::header("Create Payment Code");
    let coordinator = super::open(storage_dir)?;

    let spinner = ui::spinner("Generating ECDSA and SPHINCS+ keys...");
    let created = coordinator.registry().create_code(label).await;
    spinner.finish_and_clear();
    let code = created?;

    ui::success(&format!("Payment code '{}' created", code.label));
    ui::key_value("ID", &code.id);
    ui::key_value("Code", &code.code);
    if verbose {
        ui::key_value("Public key", &code.public_key);
    }
    Ok(())
}

pub async fn import(storage_dir: &Path, text: &str, label: &str, verbose: bool) -> Result<()> {
    ui::header("Import Payment Code");
    let coordinator = super::open(storage_dir)?;

    let code = coordinator.registry().import_code(text, label).await?;
    ui::success(&format!("Payment code '{}' imported", code.label));
    ui::key_value("ID", &code.id);
    if !code.is_compatible_variant {
        ui::warning("Compact legacy code: watch-only, payments to it are refused");
        ui::info(&format!(
            "Run 'paycode-demo show {}' for the canonical form",
            code.id
        ));
    }
    if verbose {
        ui::key_value("Public key", &code.public_key);
        ui::key_value("Chain code", &code.chain_code);
    }
    Ok(())
}

pub async fn list(storage_dir: &Path, _verbose: bool) -> Result<()> {
    ui::header("Payment Codes");
    let coordinator = super::open(storage_dir)?;
    let codes = coordinator.registry().list().await?;

    if codes.is_empty() {
        ui::info("No payment codes found");
        ui::info("Use 'paycode-demo create' or 'paycode-demo import' to add one");
        return Ok(());
    }

    for code in codes {
        let owned = coordinator.registry().is_owned(&code).await?;
        let kind = if owned {
            "owned".green()
        } else {
            "watch-only".dimmed()
        };
        println!("\n{} ({})", code.label.bold(), kind);
        ui::key_value("  ID", &code.id);
        ui::key_value("  Code", &ui::truncate(&code.code, 12));
        ui::key_value(
            "  Added",
            &code.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
    }
    Ok(())
}

pub async fn show(storage_dir: &Path, id: &str, qr: bool, _verbose: bool) -> Result<()> {
    let coordinator = super::open(storage_dir)?;
    let code = coordinator.registry().get(id).await?;
    let export = coordinator.registry().export_format(id).await?;

    ui::header(&code.label);
    ui::key_value("ID", &code.id);
    ui::key_value("Code", &code.code);
    ui::key_value("Canonical form", &export);
    ui::key_value("Public key", &code.public_key);
    ui::key_value("Chain code", &code.chain_code);
    ui::key_value(
        "Owned",
        if coordinator.registry().is_owned(&code).await? {
            "yes"
        } else {
            "no"
        },
    );

    let chains = coordinator.chains().list_for_code(&code.id).await?;
    let sessions = coordinator.sessions().list_for_code(&code.id).await?;
    ui::key_value("Chains", &chains.len().to_string());
    ui::key_value("Sessions", &sessions.len().to_string());

    if qr {
        ui::qr_code(&export)?;
    }
    Ok(())
}

pub async fn delete(storage_dir: &Path, id: &str, yes: bool, verbose: bool) -> Result<()> {
    let coordinator = super::open(storage_dir)?;
    let code = coordinator.registry().get(id).await?;

    if !yes && !ui::confirm(&format!("Delete payment code '{}'?", code.label), false)? {
        ui::info("Cancelled");
        return Ok(());
    }
    if verbose {
        ui::info(&format!("Deleting {}", code.code));
    }

    coordinator.registry().delete(id).await?;
    ui::success(&format!("Payment code '{}' deleted", code.label));
    Ok(())
}
