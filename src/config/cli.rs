use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "portal-probe")]
#[command(about = "Poke the portal functions and inspect rows during development")]
pub struct ProbeCli {
    /// TOML configuration file; the environment is used when omitted
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: ProbeCommand,
}

#[derive(Debug, Subcommand)]
pub enum ProbeCommand {
    /// Print a signature header value for a payload
    Sign(SignArgs),

    /// Build a provider-style payload, sign it and POST it to payment-webhook
    SimulateWebhook(SimulateWebhookArgs),

    #[command(subcommand)]
    Invoice(InvoiceCommand),

    /// Print dashboard aggregates
    Dashboard {
        #[arg(long)]
        company: Option<String>,
    },

    /// Move pending invoices past their due date to overdue
    SweepOverdue {
        /// Only list what would move
        #[arg(long)]
        dry_run: bool,
    },

    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Args)]
pub struct SignArgs {
    /// Webhook secret; falls back to webhook.secret
    #[arg(long)]
    pub secret: Option<String>,

    /// Raw JSON body
    #[arg(long, conflicts_with = "file")]
    pub body: Option<String>,

    /// Read the body from a file
    #[arg(long)]
    pub file: Option<String>,

    /// Unix seconds; defaults to now
    #[arg(long)]
    pub timestamp: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AuthMode {
    Signature,
    SharedSecret,
    None,
}

#[derive(Debug, Args)]
pub struct SimulateWebhookArgs {
    /// payment-webhook URL, e.g. http://localhost:8787/functions/v1/payment-webhook
    #[arg(long)]
    pub url: String,

    #[arg(long)]
    pub invoice_id: String,

    #[arg(long, default_value = "paid")]
    pub status: String,

    /// Provider event id; generated when omitted
    #[arg(long)]
    pub event_id: Option<String>,

    #[arg(long)]
    pub amount_cents: Option<i64>,

    /// Webhook secret; falls back to webhook.secret
    #[arg(long)]
    pub secret: Option<String>,

    #[arg(long, value_enum, default_value = "signature")]
    pub mode: AuthMode,
}

#[derive(Debug, Subcommand)]
pub enum InvoiceCommand {
    /// Print one invoice as JSON
    Show { id: String },

    /// Poll until the invoice is paid
    WaitPaid {
        id: String,

        #[arg(long, default_value = "10")]
        attempts: u32,

        #[arg(long, default_value = "2000")]
        interval_ms: u64,
    },

    /// Write invoices to a CSV file
    Export {
        #[arg(short, long, default_value = "invoices.csv")]
        output: String,

        #[arg(long)]
        company: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Load and validate the configuration
    Check,
}
