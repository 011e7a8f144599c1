use std::fs::File;
use std::io::{self, Stdout, Write};
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use crate::application::{
    AccountingEngine, ConfirmRequest, DepositRequest, ListTransactionsRequest, ReserveRequest,
    TransactionPage, TransferRequest,
};
use crate::domain::{OrderId, ServiceId, UserId};
use crate::storage::{DEFAULT_MAX_CONNECTIONS, StoreConfig};

/// escrow-ledger - Account balances with escrow, transfers and revenue reports
#[derive(Parser)]
#[command(name = "escrow-ledger")]
#[command(about = "An account-balance ledger with escrow reservations and monthly revenue reports")]
#[command(version)]
pub struct Cli {
    /// Database file path
    #[arg(short, long, env = "ESCROW_LEDGER_DATABASE", default_value = "escrow-ledger.db")]
    pub database: String,

    /// Maximum pooled store connections
    #[arg(long, env = "ESCROW_LEDGER_MAX_CONNECTIONS", default_value_t = DEFAULT_MAX_CONNECTIONS)]
    pub max_connections: u32,

    /// How long a write waits for the store lock, in milliseconds
    #[arg(long, env = "ESCROW_LEDGER_BUSY_TIMEOUT_MS", default_value_t = 5000)]
    pub busy_timeout_ms: u64,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database
    Init,

    /// Credit a user's account, opening it on first deposit
    Deposit {
        user_id: UserId,

        /// Amount to deposit (e.g., "100.00" or "100")
        amount: String,
    },

    /// Show available and reserved balance for a user
    Balance {
        user_id: UserId,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Hold funds in escrow for a service order
    Reserve {
        user_id: UserId,

        /// Amount to reserve
        amount: String,

        #[arg(long)]
        service: ServiceId,

        #[arg(long)]
        order: OrderId,
    },

    /// Settle a reservation as revenue
    Confirm {
        user_id: UserId,

        /// Amount of the reservation being settled
        amount: String,

        #[arg(long)]
        service: ServiceId,

        #[arg(long)]
        order: OrderId,
    },

    /// Move funds between two accounts
    Transfer {
        /// Amount to transfer
        amount: String,

        /// Sending user id
        #[arg(long)]
        from: UserId,

        /// Receiving user id
        #[arg(long)]
        to: UserId,
    },

    /// List a user's ledger entries
    Transactions {
        user_id: UserId,

        /// Page number, starting at 1
        #[arg(long)]
        page: Option<i64>,

        /// Entries per page (1-100, default 20)
        #[arg(short, long)]
        limit: Option<i64>,

        /// created_at or amount
        #[arg(long)]
        sort_by: Option<String>,

        /// asc or desc
        #[arg(long)]
        sort_order: Option<String>,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Per-service revenue for a calendar month
    Report {
        year: i32,

        month: u32,

        #[arg(short, long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,

        /// Output file (stdout if omitted)
        #[arg(short, long)]
        output: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Csv,
    Json,
}

impl Cli {
    /// Store settings from flags and their environment fallbacks.
    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::for_path(&self.database)
            .with_max_connections(self.max_connections)
            .with_busy_timeout(Duration::from_millis(self.busy_timeout_ms))
    }

    pub async fn run(self) -> Result<()> {
        let engine = AccountingEngine::init(&self.store_config()).await?;
        let result = dispatch(&engine, self.command, &self.database).await;
        engine.database().close().await;
        result
    }
}

async fn dispatch(engine: &AccountingEngine, command: Commands, database: &str) -> Result<()> {
    match command {
        Commands::Init => {
            println!("Database initialized: {}", database);
        }

        Commands::Deposit { user_id, amount } => {
            let outcome = engine.deposit(DepositRequest::new(user_id, amount)).await?;
            println!(
                "{}: user {} balance {} (entry {})",
                outcome.message, outcome.user_id, outcome.balance, outcome.entry_id
            );
        }

        Commands::Balance { user_id, json } => {
            let view = engine.get_balance(user_id).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                println!("User {}", view.user_id);
                println!("  Available: {:>14}", view.balance.to_string());
                println!("  Reserved:  {:>14}", view.reserved.to_string());
                if !view.reservations.is_empty() {
                    println!();
                    println!("{:<10} {:<10} {:>14}  {}", "SERVICE", "ORDER", "AMOUNT", "SINCE");
                    println!("{}", "-".repeat(58));
                    for r in &view.reservations {
                        println!(
                            "{:<10} {:<10} {:>14}  {}",
                            r.service_id,
                            r.order_id,
                            r.amount.to_string(),
                            r.created_at.format("%Y-%m-%d %H:%M:%S")
                        );
                    }
                }
            }
        }

        Commands::Reserve {
            user_id,
            amount,
            service,
            order,
        } => {
            let outcome = engine
                .reserve(ReserveRequest::new(user_id, service, order, amount))
                .await?;
            println!(
                "{}: user {} balance {}, reserved {} (reservation {})",
                outcome.message,
                outcome.user_id,
                outcome.balance,
                outcome.reserved,
                outcome.reservation_id
            );
        }

        Commands::Confirm {
            user_id,
            amount,
            service,
            order,
        } => {
            let outcome = engine
                .confirm(ConfirmRequest::new(user_id, service, order, amount))
                .await?;
            println!(
                "{}: {} for service {} order {} (entry {})",
                outcome.message,
                outcome.amount,
                outcome.service_id,
                outcome.order_id,
                outcome.entry_id
            );
        }

        Commands::Transfer { amount, from, to } => {
            let outcome = engine.transfer(TransferRequest::new(from, to, amount)).await?;
            println!(
                "{}: {} from user {} (balance {}) to user {} (balance {})",
                outcome.message,
                outcome.amount,
                outcome.from_user_id,
                outcome.from_balance,
                outcome.to_user_id,
                outcome.to_balance
            );
        }

        Commands::Transactions {
            user_id,
            page,
            limit,
            sort_by,
            sort_order,
            format,
            output,
        } => {
            let request = ListTransactionsRequest {
                user_id,
                page,
                limit,
                sort_by,
                sort_order,
            };
            run_transactions_command(engine, request, format, output.as_deref()).await?;
        }

        Commands::Report {
            year,
            month,
            format,
            output,
        } => {
            run_report_command(engine, year, month, format, output.as_deref()).await?;
        }
    }

    Ok(())
}

/// Command output target. A file is created on the first write, so a
/// command rejected before producing output leaves nothing behind.
enum Output {
    Stdout(Stdout),
    File { path: String, file: Option<File> },
}

impl Output {
    fn open(output: Option<&str>) -> Self {
        match output {
            Some(path) => Output::File {
                path: path.to_string(),
                file: None,
            },
            None => Output::Stdout(io::stdout()),
        }
    }

    fn target(&mut self) -> io::Result<&mut dyn Write> {
        match self {
            Output::Stdout(stdout) => Ok(stdout),
            Output::File { path, file } => {
                let opened = match file.take() {
                    Some(opened) => opened,
                    None => File::create(path.as_str()).map_err(|err| {
                        io::Error::new(
                            err.kind(),
                            format!("Failed to create output file {}: {}", path, err),
                        )
                    })?,
                };
                Ok(file.insert(opened))
            }
        }
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.target()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout(stdout) => stdout.flush(),
            Output::File { file: Some(file), .. } => file.flush(),
            Output::File { file: None, .. } => Ok(()),
        }
    }
}

async fn run_transactions_command(
    engine: &AccountingEngine,
    request: ListTransactionsRequest,
    format: OutputFormat,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;

    let mut writer = Output::open(output);

    match format {
        OutputFormat::Csv => {
            let count = Exporter::new(engine)
                .export_transactions_csv(request, &mut writer)
                .await?;
            if output.is_some() {
                eprintln!("Exported {} transactions", count);
            }
        }
        OutputFormat::Json => {
            let page = engine.list_transactions(request).await?;
            writeln!(writer, "{}", serde_json::to_string_pretty(&page)?)?;
        }
        OutputFormat::Table => {
            let page = engine.list_transactions(request).await?;
            write!(writer, "{}", transactions_table(&page))?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn transactions_table(page: &TransactionPage) -> String {
    if page.entries.is_empty() {
        return format!("No transactions found for user {}.\n", page.user_id);
    }

    let mut out = format!(
        "{:<6} {:<20} {:<9} {:>14}  {}\n",
        "SEQ", "DATE", "TYPE", "AMOUNT", "DESCRIPTION"
    );
    out.push_str(&format!("{}\n", "-".repeat(72)));
    for entry in &page.entries {
        out.push_str(&format!(
            "{:<6} {:<20} {:<9} {:>14}  {}\n",
            entry.sequence,
            entry.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            entry.entry_type.as_str(),
            entry.amount.to_string(),
            entry.description
        ));
    }
    out.push_str(&format!(
        "\nPage {} of {} ({} entries, sorted by {} {})\n",
        page.page,
        page.total_pages.max(1),
        page.total,
        page.sort_by.as_str(),
        page.sort_order.as_str()
    ));
    out
}

async fn run_report_command(
    engine: &AccountingEngine,
    year: i32,
    month: u32,
    format: OutputFormat,
    output: Option<&str>,
) -> Result<()> {
    use crate::io::Exporter;

    let mut writer = Output::open(output);
    let exporter = Exporter::new(engine);

    match format {
        OutputFormat::Csv => {
            let count = exporter.export_report_csv(year, month, &mut writer).await?;
            if output.is_some() {
                eprintln!("Exported {} service rows", count);
            }
        }
        OutputFormat::Json => {
            exporter.export_report_json(year, month, &mut writer).await?;
        }
        OutputFormat::Table => {
            let report = engine.monthly_report(year, month).await?;
            if report.is_empty() {
                writeln!(writer, "No confirmed revenue in {}.", report.period.label())?;
            } else {
                write!(writer, "{}", report.to_table())?;
            }
        }
    }
    writer.flush()?;
    Ok(())
}
