//! Paycode Demo CLI
//!
//! Command-line interface for trying out payment codes, address chains and
//! challenge-response sign-in.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;
mod storage;
mod ui;

#[derive(Parser)]
#[command(name = "paycode-demo")]
#[command(about = "Paycode Demo CLI - reusable payment codes and hybrid SSO signatures", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Custom storage directory (can also be set via PAYCODE_DEMO_DIR env var)
    #[arg(long, global = true, env = "PAYCODE_DEMO_DIR")]
    storage_dir: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new owned payment code
    Create {
        /// Label for the new code
        label: String,
    },

    /// Import someone else's payment code
    Import {
        /// Payment code text
        code: String,

        /// Label for the code
        label: String,
    },

    /// List registered payment codes
    List,

    /// Show one payment code with its canonical export form
    Show {
        /// Payment code ID
        id: String,

        /// Also render the canonical form as a QR code
        #[arg(long)]
        qr: bool,
    },

    /// Delete a payment code nothing references
    Delete {
        /// Payment code ID
        id: String,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Derive an address chain from an owned code to a recipient code
    Derive {
        /// ID of the owned sender code
        sender_id: String,

        /// Recipient payment code text
        recipient_code: String,

        /// Label for the recipient
        label: String,

        /// Number of addresses (defaults to the configured chain length)
        #[arg(short, long)]
        count: Option<u32>,
    },

    /// Append addresses to a chain
    Extend {
        /// Payment chain ID
        chain_id: String,

        /// Number of addresses to add
        #[arg(short, long, default_value = "5")]
        count: u32,
    },

    /// List payment chains
    Chains,

    /// Build and record the notification reference of a chain
    Notify {
        /// Payment chain ID
        chain_id: String,
    },

    /// Classify a scanned QR payload and act on it
    Scan {
        /// Decoded QR text
        payload: String,

        /// Payment code ID to sign challenges with
        #[arg(long)]
        code: Option<String>,

        /// Import a scanned payment code under this label
        #[arg(long)]
        import: Option<String>,

        /// Sign with ECDSA only
        #[arg(long)]
        pure: bool,
    },

    /// List SSO sessions
    Sessions {
        /// Only show active sessions
        #[arg(short, long)]
        active: bool,
    },

    /// Revoke an SSO session
    Revoke {
        /// Session ID
        session_id: String,
    },

    /// Verify an armored signature bundle against a challenge payload
    Verify {
        /// File holding the armored bundle
        bundle_file: PathBuf,

        /// BIP47-SSO: challenge payload the bundle must cover
        challenge: String,

        /// Require this SPHINCS+ public key (hex)
        #[arg(long)]
        pinned_key: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_env_filter("paycode_demo_cli=debug,paycode_lib=debug")
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter("paycode_demo_cli=info,paycode_lib=warn")
            .init();
    }

    // Setup storage directory
    let storage_dir = if let Some(dir) = cli.storage_dir {
        PathBuf::from(dir)
    } else {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("paycode-demo")
    };

    let result = match cli.command {
        Commands::Create { label } => commands::codes::create(&storage_dir, &label, cli.verbose).await,
        Commands::Import { code, label } => {
            commands::codes::import(&storage_dir, &code, &label, cli.verbose).await
        }
        Commands::List => commands::codes::list(&storage_dir, cli.verbose).await,
        Commands::Show { id, qr } => commands::codes::show(&storage_dir, &id, qr, cli.verbose).await,
        Commands::Delete { id, yes } => {
            commands::codes::delete(&storage_dir, &id, yes, cli.verbose).await
        }
        Commands::Derive {
            sender_id,
            recipient_code,
            label,
            count,
        } => {
            commands::chains::derive(
                &storage_dir,
                &sender_id,
                &recipient_code,
                &label,
                count,
                cli.verbose,
            )
            .await
        }
        Commands::Extend { chain_id, count } => {
            commands::chains::extend(&storage_dir, &chain_id, count, cli.verbose).await
        }
        Commands::Chains => commands::chains::list(&storage_dir, cli.verbose).await,
        Commands::Notify { chain_id } => {
            commands::chains::notify(&storage_dir, &chain_id, cli.verbose).await
        }
        Commands::Scan {
            payload,
            code,
            import,
            pure,
        } => {
            commands::scan::run(
                &storage_dir,
                &payload,
                code.as_deref(),
                import.as_deref(),
                pure,
                cli.verbose,
            )
            .await
        }
        Commands::Sessions { active } => {
            commands::sessions::list(&storage_dir, active, cli.verbose).await
        }
        Commands::Revoke { session_id } => {
            commands::sessions::revoke(&storage_dir, &session_id, cli.verbose).await
        }
        Commands::Verify {
            bundle_file,
            challenge,
            pinned_key,
        } => {
            commands::verify::run(&bundle_file, &challenge, pinned_key.as_deref(), cli.verbose)
                .await
        }
    };

    if let Err(e) = result {
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}
