//! Scan command - classify a QR payload and act on it

use anyhow::{anyhow, Result};
use paycode_lib::{classify_scanned_payload, decode_payment_code, ScannedPayload};
use std::path::Path;

use crate::ui;

pub async fn run(
    storage_dir: &Path,
    payload: &str,
    code_id: Option<&str>,
    import_label: Option<&str>,
    pure: bool,
    verbose: bool,
) -> Result<()> {
    ui::header("Scan");

    match classify_scanned_payload(payload) {
        Some(ScannedPayload::PaymentCode(text)) => {
            let decoded = decode_payment_code(&text)?;
            ui::info("Payment code");
            ui::key_value("Code", &text);
            ui::key_value(
                "Variant",
                if decoded.is_compatible_variant {
                    "canonical"
                } else {
                    "compact legacy"
                },
            );
            match import_label {
                Some(label) => super::codes::import(storage_dir, &text, label, verbose).await?,
                None => ui::info("Pass --import <label> to add it to the registry"),
            }
        }
        Some(ScannedPayload::AuthChallenge(challenge)) => {
            ui::info(&format!("Login request from {}", challenge.service_name));
            ui::key_value("Service", &challenge.service_url);
            if verbose {
                ui::key_value("Nonce", &challenge.nonce);
            }
            let code_id = code_id.ok_or_else(|| {
                anyhow!("A challenge needs --code <id> naming the payment code to sign with")
            })?;

            let coordinator = super::open(storage_dir)?;
            let hybrid = if pure { Some(false) } else { None };
            let spinner = ui::spinner("Signing challenge...");
            let issued = coordinator.authenticate(&challenge, code_id, hybrid).await;
            spinner.finish_and_clear();
            let session = issued?;

            ui::success(&format!("Signed in to {}", session.service_name));
            ui::key_value("Session", &session.id);
            ui::key_value(
                "Expires",
                &session.expires_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            );
            ui::separator();
            println!("{}", session.signature);
        }
        None => return Err(anyhow!("Not a payment code or authentication challenge")),
    }
    Ok(())
}
