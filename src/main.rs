use chrono::Utc;
use clap::Parser;
use portal_fns::adapters::export::write_invoices_csv;
use portal_fns::adapters::{DeliveryAuth, WebhookClient};
use portal_fns::config::cli::{
    AuthMode, ConfigCommand, InvoiceCommand, ProbeCli, ProbeCommand, SignArgs, SimulateWebhookArgs,
};
use portal_fns::config::PortalConfig;
use portal_fns::core::dashboard::DashboardStats;
use portal_fns::core::poll::poll_until;
use portal_fns::core::webhook::sign_payload;
use portal_fns::domain::model::InvoiceStatus;
use portal_fns::utils::error::ErrorSeverity;
use portal_fns::utils::{logger, validation::Validate};
use portal_fns::{FunctionContext, PortalError, Result};
use serde_json::json;
use std::time::Duration;

#[tokio::main]
async fn main() {
    let cli = ProbeCli::parse();

    // 初始化日誌
    logger::init_cli_logger(cli.verbose);
    tracing::debug!("Probe command: {:?}", cli.command);

    if let Err(e) = run(cli).await {
        tracing::error!(
            "❌ Probe failed: {} (Category: {:?}, Severity: {:?})",
            e,
            e.category(),
            e.severity()
        );
        eprintln!("❌ {}", e);
        eprintln!("💡 Suggestion: {}", e.recovery_suggestion());

        // 根據錯誤嚴重程度決定退出碼
        let exit_code = match e.severity() {
            ErrorSeverity::Low => 4,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        };
        std::process::exit(exit_code);
    }
}

async fn run(cli: ProbeCli) -> Result<()> {
    let config_path = cli.config.as_deref();

    match cli.command {
        ProbeCommand::Sign(args) => sign(config_path, args),
        ProbeCommand::SimulateWebhook(args) => simulate_webhook(config_path, args).await,
        ProbeCommand::Invoice(command) => invoice(config_path, command).await,
        ProbeCommand::Dashboard { company } => {
            let ctx = context(config_path)?;
            let stats = DashboardStats::compute(ctx.repo(), company.as_deref()).await?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
            Ok(())
        }
        ProbeCommand::SweepOverdue { dry_run } => sweep_overdue(config_path, dry_run).await,
        ProbeCommand::Config(ConfigCommand::Check) => {
            let config = load_config(config_path)?;
            config.validate()?;
            println!("✅ Configuration is valid");
            println!("   store:   {:?} {}", config.store.kind, config.store.url.as_deref().unwrap_or("-"));
            println!(
                "   webhook: secret {}, headers {} / {}",
                if config.webhook.secret.is_some() { "set" } else { "unset" },
                config.webhook.signature_header,
                config.webhook.secret_header
            );
            println!(
                "   service token: {}",
                if config.functions.service_token.is_some() { "set" } else { "unset" }
            );
            Ok(())
        }
    }
}

fn load_config(path: Option<&str>) -> Result<PortalConfig> {
    match path {
        Some(path) => {
            tracing::info!("📁 Loading configuration from: {}", path);
            PortalConfig::from_file(path)
        }
        None => PortalConfig::from_env(),
    }
}

/// An explicit `--config` must load; without one the environment is best effort.
fn optional_config(path: Option<&str>) -> Result<Option<PortalConfig>> {
    match path {
        Some(_) => load_config(path).map(Some),
        None => Ok(PortalConfig::from_env().ok()),
    }
}

fn context(path: Option<&str>) -> Result<FunctionContext> {
    FunctionContext::from_config(load_config(path)?)
}

fn webhook_secret(explicit: Option<String>, config: Option<&PortalConfig>) -> Result<String> {
    explicit
        .or_else(|| {
            config
                .and_then(|c| c.webhook.secret.as_ref())
                .map(|s| s.expose().to_string())
        })
        .ok_or_else(|| PortalError::MissingConfigError {
            field: "webhook.secret (or --secret)".to_string(),
        })
}

fn sign(config_path: Option<&str>, args: SignArgs) -> Result<()> {
    let config = match &args.secret {
        Some(_) => None,
        None => Some(load_config(config_path)?),
    };
    let secret = webhook_secret(args.secret, config.as_ref())?;

    let body = match (&args.body, &args.file) {
        (Some(body), _) => body.clone().into_bytes(),
        (None, Some(file)) => std::fs::read(file)?,
        (None, None) => return Err(PortalError::validation("pass --body or --file")),
    };
    let timestamp = args.timestamp.unwrap_or_else(|| Utc::now().timestamp());

    println!("{}", sign_payload(&secret, timestamp, &body)?);
    Ok(())
}

async fn simulate_webhook(config_path: Option<&str>, args: SimulateWebhookArgs) -> Result<()> {
    let config = optional_config(config_path)?;
    let defaults = config.clone().unwrap_or_default();

    let auth = match args.mode {
        AuthMode::Signature => DeliveryAuth::Signature {
            header: defaults.webhook.signature_header.clone(),
            secret: webhook_secret(args.secret, config.as_ref())?,
        },
        AuthMode::SharedSecret => DeliveryAuth::SharedSecret {
            header: defaults.webhook.secret_header.clone(),
            secret: webhook_secret(args.secret, config.as_ref())?,
        },
        AuthMode::None => DeliveryAuth::None,
    };

    let now = Utc::now();
    let event_id = args
        .event_id
        .unwrap_or_else(|| format!("evt_probe_{}", now.timestamp_millis()));
    let mut payload = json!({
        "id": event_id,
        "type": format!("invoice.{}", args.status),
        "data": {
            "status": args.status,
            "metadata": { "invoice_id": args.invoice_id },
        },
    });
    if let Some(amount) = args.amount_cents {
        payload["amount_cents"] = json!(amount);
    }

    tracing::info!("Delivering {} for invoice {}", event_id, args.invoice_id);
    let result = WebhookClient::new(args.url.as_str())?
        .deliver(&payload, &auth, now.timestamp())
        .await?;

    println!("HTTP {}", result.status);
    println!("{}", serde_json::to_string_pretty(&result.body)?);

    if (200..300).contains(&result.status) {
        Ok(())
    } else {
        Err(PortalError::Upstream {
            status: result.status,
            message: "webhook delivery was not accepted".to_string(),
        })
    }
}

async fn invoice(config_path: Option<&str>, command: InvoiceCommand) -> Result<()> {
    let ctx = context(config_path)?;
    let repo = ctx.repo();

    match command {
        InvoiceCommand::Show { id } => {
            let invoice = repo.get_invoice(&id).await?;
            println!("{}", serde_json::to_string_pretty(&invoice)?);
        }
        InvoiceCommand::WaitPaid {
            id,
            attempts,
            interval_ms,
        } => {
            let paid = poll_until(attempts, Duration::from_millis(interval_ms), |attempt| {
                let repo = repo.clone();
                let id = id.clone();
                async move {
                    let invoice = repo.get_invoice(&id).await?;
                    tracing::info!("Attempt {}: invoice {} is {}", attempt, id, invoice.status);
                    Ok((invoice.status == InvoiceStatus::Paid).then_some(invoice))
                }
            })
            .await?;

            match paid {
                Some(invoice) => println!("✅ Invoice {} paid at {:?}", invoice.id, invoice.paid_at),
                None => {
                    return Err(PortalError::ValidationError {
                        message: format!("invoice {} not paid after {} attempts", id, attempts),
                    })
                }
            }
        }
        InvoiceCommand::Export { output, company } => {
            let invoices = match &company {
                Some(company) => repo.invoices_for_company(company).await?,
                None => repo.list_invoices().await?,
            };
            let file = std::fs::File::create(&output)?;
            let rows = write_invoices_csv(&invoices, file)?;
            println!("📁 Wrote {} invoices to {}", rows, output);
        }
    }
    Ok(())
}

async fn sweep_overdue(config_path: Option<&str>, dry_run: bool) -> Result<()> {
    let ctx = context(config_path)?;
    let today = Utc::now().date_naive();

    if dry_run {
        let due: Vec<_> = ctx
            .repo()
            .invoices_with_status(InvoiceStatus::Pending)
            .await?
            .into_iter()
            .filter(|i| i.is_past_due(today))
            .collect();
        for invoice in &due {
            println!("would move {} (due {})", invoice.id, invoice.due_on);
        }
        println!("{} invoices past due", due.len());
        return Ok(());
    }

    let moved = ctx.reconciler().sweep_overdue(today).await?;
    for invoice in &moved {
        println!("moved {} to overdue", invoice.id);
    }
    println!("✅ {} invoices marked overdue", moved.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_explicit_config_errors_are_reported() {
        assert!(optional_config(Some("/nonexistent/portal.toml")).is_err());

        let mut broken = NamedTempFile::new().unwrap();
        writeln!(broken, "[webhook\nsecret = 1").unwrap();
        let result = optional_config(broken.path().to_str());
        assert!(matches!(result, Err(PortalError::ConfigValidationError { .. })));
    }

    #[test]
    fn test_explicit_config_is_loaded() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[webhook]\nsecret = \"whsec_cli\"").unwrap();
        let config = optional_config(file.path().to_str()).unwrap().unwrap();
        assert_eq!(
            config.webhook.secret.as_ref().map(|s| s.expose()),
            Some("whsec_cli")
        );
    }
}
