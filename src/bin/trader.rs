use clap::{Parser, ValueEnum};
use kis_trader::application::bootstrap::Session;
use kis_trader::domain::account::AccountType;
use kis_trader::domain::strategy::StrategyMode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "KIS automated trading engine", long_about = None)]
struct Cli {
    /// Broker environment to trade against.
    #[arg(long, value_enum, default_value_t = AccountArg::Paper)]
    account: AccountArg,

    /// Trading strategy to run this session.
    #[arg(long, value_enum, default_value_t = StrategyArg::Swing)]
    strategy: StrategyArg,

    /// Path to the credentials TOML document. Falls back to the
    /// `KIS_CONFIG_PATH` environment variable (see [`kis_trader::config`])
    /// when omitted.
    #[arg(long)]
    config: Option<String>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum AccountArg {
    Live,
    Paper,
}

impl From<AccountArg> for AccountType {
    fn from(value: AccountArg) -> Self {
        match value {
            AccountArg::Live => AccountType::Live,
            AccountArg::Paper => AccountType::Paper,
        }
    }
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum StrategyArg {
    Swing,
    Intraday,
}

impl From<StrategyArg> for StrategyMode {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::Swing => StrategyMode::Swing,
            StrategyArg::Intraday => StrategyMode::Intraday,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let account_type: AccountType = cli.account.into();
    let strategy_mode: StrategyMode = cli.strategy.into();

    tracing::info!(account = %account_type, strategy = ?strategy_mode, "starting kis-trader");

    let session = Session::open(account_type, strategy_mode, cli.config.as_deref()).await?;
    let summary = session.run().await?;

    tracing::info!(
        cycles_completed = summary.cycles_completed,
        buys = summary.session_stats.buys_submitted,
        sells = summary.session_stats.sells_submitted,
        rejected = summary.session_stats.orders_rejected,
        "kis-trader session complete"
    );

    Ok(())
}
