//! bond-cli: Operator command-line interface for the bonding service.
//!
//! Opens the local store directly, so only one process may use a data
//! directory at a time.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use tracing::debug;

use bond_core::constants::{BPS_PRECISION, COIN, RATIO_PRECISION, WEEK};
use bond_core::types::{AccountId, Epoch, Timestamp};
use bond_node_lib::{BondingService, NodeConfig};

/// Bond command-line interface.
#[derive(Parser)]
#[command(name = "bond-cli")]
#[command(version, about = "Time-decaying bonds, epoch emissions and gated rewards.")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Data directory (overrides the config file and environment).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Path to a TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Unix timestamp to act at instead of the wall clock.
    #[arg(long, global = true)]
    now: Option<Timestamp>,

    /// Log output format ("text" or "json").
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Lock lifecycle subcommands.
    Lock {
        #[command(subcommand)]
        action: LockAction,
    },
    /// Voting power of an account.
    Balance(BalanceArgs),
    /// Total voting power.
    Supply(SupplyArgs),
    /// Show the current epoch and schedule position.
    Epoch,
    /// Emissions for an epoch.
    Emissions(EmissionsArgs),
    /// Utilization feed subcommands.
    Utilization {
        #[command(subcommand)]
        action: UtilizationAction,
    },
    /// Reward subcommands.
    Rewards {
        #[command(subcommand)]
        action: RewardsAction,
    },
}

#[derive(Subcommand)]
enum LockAction {
    /// Lock an amount until an unlock time.
    Create(LockCreateArgs),
    /// Add to an active lock.
    Increase(LockIncreaseArgs),
    /// Move an active lock's end later.
    Extend(LockExtendArgs),
    /// Release an expired lock.
    Withdraw(AccountArgs),
}

#[derive(Subcommand)]
enum UtilizationAction {
    /// Report a signed utilization delta for an account.
    Record(UtilizationRecordArgs),
}

#[derive(Subcommand)]
enum RewardsAction {
    /// Utilization-gated rewards still claimable for an epoch.
    Eligible(EpochAccountArgs),
    /// Claim rewards for an epoch.
    Claim(EpochAccountArgs),
    /// Summary for the previous epoch.
    Info(InfoArgs),
    /// Annualized reward rates.
    Apy(ApyArgs),
}

#[derive(Args)]
struct AccountArgs {
    /// Account id (0x-prefixed, 40 hex digits).
    #[arg(short, long)]
    account: AccountId,
}

/// Unlock time, absolute or relative to now.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct UnlockArgs {
    /// Absolute unlock timestamp (rounded down to the lock time unit).
    #[arg(long)]
    unlock: Option<Timestamp>,

    /// Unlock this many weeks from now.
    #[arg(long)]
    weeks: Option<u64>,
}

impl UnlockArgs {
    fn resolve(&self, now: Timestamp) -> Result<Timestamp> {
        match (self.unlock, self.weeks) {
            (Some(t), _) => Ok(t),
            (None, Some(w)) => w
                .checked_mul(WEEK)
                .and_then(|d| now.checked_add(d))
                .context("unlock time out of range"),
            (None, None) => bail!("either --unlock or --weeks is required"),
        }
    }
}

#[derive(Args)]
struct LockCreateArgs {
    #[command(flatten)]
    account: AccountArgs,

    /// Amount to lock in BOND (e.g., 10.5).
    #[arg(long)]
    amount: String,

    #[command(flatten)]
    unlock: UnlockArgs,
}

#[derive(Args)]
struct LockIncreaseArgs {
    #[command(flatten)]
    account: AccountArgs,

    /// Amount to add in BOND.
    #[arg(long)]
    amount: String,
}

#[derive(Args)]
struct LockExtendArgs {
    #[command(flatten)]
    account: AccountArgs,

    #[command(flatten)]
    unlock: UnlockArgs,
}

#[derive(Args)]
struct BalanceArgs {
    #[command(flatten)]
    account: AccountArgs,

    /// Historical timestamp to query (default: now).
    #[arg(long)]
    at: Option<Timestamp>,
}

#[derive(Args)]
struct SupplyArgs {
    /// Historical timestamp to query (default: now).
    #[arg(long)]
    at: Option<Timestamp>,
}

#[derive(Args)]
struct EmissionsArgs {
    /// Epoch index (default: current epoch).
    #[arg(short, long)]
    epoch: Option<Epoch>,
}

#[derive(Args)]
struct UtilizationRecordArgs {
    #[command(flatten)]
    account: AccountArgs,

    /// Epoch index (default: current epoch).
    #[arg(short, long)]
    epoch: Option<Epoch>,

    /// Signed delta in base units.
    #[arg(long, allow_hyphen_values = true)]
    delta: i128,
}

#[derive(Args)]
struct EpochAccountArgs {
    #[command(flatten)]
    account: AccountArgs,

    /// Epoch index (default: previous epoch).
    #[arg(short, long)]
    epoch: Option<Epoch>,
}

#[derive(Args)]
struct InfoArgs {
    #[command(flatten)]
    account: AccountArgs,

    /// Print as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ApyArgs {
    /// Include per-account rates.
    #[arg(short, long)]
    account: Option<AccountId>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = NodeConfig::load(cli.global.config.as_deref()).context("Failed to load config")?;
    if let Some(dir) = cli.global.data_dir.clone() {
        config.data_dir = dir;
    }
    init_logging(&config.log_level, &cli.global.log_format);

    let now = resolve_now(cli.global.now)?;
    debug!(now, data_dir = %config.data_dir.display(), "starting");

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("Failed to create directory: {}", config.data_dir.display()))?;
    let svc = BondingService::open(&config, now).context("Failed to open bonding store")?;

    let result = match cli.command {
        Commands::Lock { action } => match action {
            LockAction::Create(args) => lock_create(&svc, args, now),
            LockAction::Increase(args) => lock_increase(&svc, args, now),
            LockAction::Extend(args) => lock_extend(&svc, args, now),
            LockAction::Withdraw(args) => lock_withdraw(&svc, args, now),
        },
        Commands::Balance(args) => balance(&svc, args, now),
        Commands::Supply(args) => supply(&svc, args, now),
        Commands::Epoch => epoch(&svc, now),
        Commands::Emissions(args) => emissions(&svc, args, now),
        Commands::Utilization { action } => match action {
            UtilizationAction::Record(args) => utilization_record(&svc, args, now),
        },
        Commands::Rewards { action } => match action {
            RewardsAction::Eligible(args) => rewards_eligible(&svc, args, now),
            RewardsAction::Claim(args) => rewards_claim(&svc, args, now),
            RewardsAction::Info(args) => rewards_info(&svc, args, now),
            RewardsAction::Apy(args) => rewards_apy(&svc, args, now),
        },
    };

    svc.flush().context("Failed to flush store")?;
    result
}

/// Initialize tracing with `level` as the default filter. `RUST_LOG` wins
/// when set.
fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

fn resolve_now(over: Option<Timestamp>) -> Result<Timestamp> {
    match over {
        Some(t) => Ok(t),
        None => Timestamp::try_from(Utc::now().timestamp()).context("System clock is before 1970"),
    }
}

// ----------------------------------------------------------------------------
// Lock lifecycle
// ----------------------------------------------------------------------------

fn lock_create(svc: &BondingService, args: LockCreateArgs, now: Timestamp) -> Result<()> {
    let amount = parse_amount(&args.amount)?;
    let unlock = args.unlock.resolve(now)?;
    let lock = svc
        .create_lock(&args.account.account, amount, unlock, now)
        .context("Failed to create lock")?;

    println!("Locked {} until {}", format_coin(lock.amount), format_time(lock.end));
    println!("Voting power: {}", format_coin(svc.balance_of(&args.account.account, now)?));
    Ok(())
}

fn lock_increase(svc: &BondingService, args: LockIncreaseArgs, now: Timestamp) -> Result<()> {
    let extra = parse_amount(&args.amount)?;
    let lock = svc
        .increase_amount(&args.account.account, extra, now)
        .context("Failed to increase lock")?;

    println!("Lock is now {} until {}", format_coin(lock.amount), format_time(lock.end));
    Ok(())
}

fn lock_extend(svc: &BondingService, args: LockExtendArgs, now: Timestamp) -> Result<()> {
    let unlock = args.unlock.resolve(now)?;
    let lock = svc
        .extend_duration(&args.account.account, unlock, now)
        .context("Failed to extend lock")?;

    println!("Lock of {} now ends {}", format_coin(lock.amount), format_time(lock.end));
    Ok(())
}

fn lock_withdraw(svc: &BondingService, args: AccountArgs, now: Timestamp) -> Result<()> {
    let released = svc
        .withdraw(&args.account, now)
        .context("Failed to withdraw")?;
    println!("Released {}", format_coin(released));
    Ok(())
}

// ----------------------------------------------------------------------------
// Queries
// ----------------------------------------------------------------------------

fn balance(svc: &BondingService, args: BalanceArgs, now: Timestamp) -> Result<()> {
    let account = args.account.account;
    let at = args.at.unwrap_or(now);
    let power = svc.balance_of(&account, at)?;

    println!("Account:      {account}");
    println!("At:           {}", format_time(at));
    println!("Voting power: {}", format_coin(power));
    match svc.lock_of(&account) {
        Some(lock) => {
            let state = if lock.is_expired(now) { "expired" } else { "active" };
            println!(
                "Lock:         {} until {} ({state})",
                format_coin(lock.amount),
                format_time(lock.end)
            );
        }
        None => println!("Lock:         none"),
    }
    Ok(())
}

fn supply(svc: &BondingService, args: SupplyArgs, now: Timestamp) -> Result<()> {
    let at = args.at.unwrap_or(now);
    println!("At:           {}", format_time(at));
    println!("Total power:  {}", format_coin(svc.total_supply_at(at)?));
    println!("Total locked: {}", format_coin(svc.total_locked()));
    Ok(())
}

fn epoch(svc: &BondingService, now: Timestamp) -> Result<()> {
    let sched = svc.scheduler();
    let e = sched.current_epoch(now);

    println!("Schedule start:  {}", format_time(sched.params().start));
    println!("Current epoch:   {e}");
    println!("Epoch window:    {} .. {}", format_time(sched.epoch_start(e)), format_time(sched.epoch_end(e)));
    println!("Emissions:       {}", format_coin(sched.emissions_for_epoch(e)?));
    match sched.epochs_until_cliff(e)? {
        Some(n) => println!("Next reduction:  in {n} epoch(s)"),
        None => println!("Next reduction:  none"),
    }
    println!(
        "Emitted so far:  {}",
        format_coin_wide(sched.cumulative_emissions(e)?)
    );
    Ok(())
}

fn emissions(svc: &BondingService, args: EmissionsArgs, now: Timestamp) -> Result<()> {
    let sched = svc.scheduler();
    let e = args.epoch.unwrap_or_else(|| sched.current_epoch(now));
    println!("Epoch {e}: {}", format_coin(svc.emissions_for_epoch(e)?));
    println!("Cliffs passed: {}", sched.cliffs_passed(e));
    Ok(())
}

// ----------------------------------------------------------------------------
// Utilization and rewards
// ----------------------------------------------------------------------------

fn utilization_record(svc: &BondingService, args: UtilizationRecordArgs, now: Timestamp) -> Result<()> {
    let epoch = args.epoch.unwrap_or_else(|| svc.scheduler().current_epoch(now));
    let (personal, system) = svc
        .record_utilization(&args.account.account, epoch, args.delta)
        .context("Failed to record utilization")?;
    println!("Epoch {epoch}: personal {personal}, system {system}");
    Ok(())
}

/// Defaults to the most recently finalized epoch.
fn claim_epoch(svc: &BondingService, epoch: Option<Epoch>, now: Timestamp) -> Result<Epoch> {
    match epoch {
        Some(e) => Ok(e),
        None => svc
            .scheduler()
            .previous_epoch(now)
            .context("No epoch has finished yet"),
    }
}

fn rewards_eligible(svc: &BondingService, args: EpochAccountArgs, now: Timestamp) -> Result<()> {
    let epoch = claim_epoch(svc, args.epoch, now)?;
    let amount = svc.eligible_rewards(&args.account.account, epoch, now)?;
    println!("Epoch {epoch}: {} claimable", format_coin(amount));
    Ok(())
}

fn rewards_claim(svc: &BondingService, args: EpochAccountArgs, now: Timestamp) -> Result<()> {
    let epoch = claim_epoch(svc, args.epoch, now)?;
    let amount = svc
        .claim(&args.account.account, epoch, now)
        .context("Failed to claim")?;
    if amount == 0 {
        println!("Epoch {epoch} was already claimed");
    } else {
        println!("Claimed {} for epoch {epoch}", format_coin(amount));
    }
    Ok(())
}

fn rewards_info(svc: &BondingService, args: InfoArgs, now: Timestamp) -> Result<()> {
    let info = svc.user_info(&args.account.account, now)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Account:             {}", args.account.account);
    println!("Bonded balance:      {}", format_coin(info.bonded_balance));
    println!("Locked amount:       {}", format_coin(info.locked_amount));
    if info.lock_end != 0 {
        println!("Lock end:            {}", format_time(info.lock_end));
    }
    println!("Personal utilization: {}", format_ratio(info.personal_utilization));
    println!("Eligible rewards:    {}", format_coin(info.eligible_rewards));
    println!("Max rewards:         {}", format_coin(info.max_rewards));
    Ok(())
}

fn rewards_apy(svc: &BondingService, args: ApyArgs, now: Timestamp) -> Result<()> {
    println!("System APY: {}", format_bps(svc.system_apy(now)?));
    if let Some(account) = args.account {
        let (current, max) = svc.user_apy(&account, now)?;
        println!("User APY:   {} (max {})", format_bps(current), format_bps(max));
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// Formatting
// ----------------------------------------------------------------------------

/// Parse a decimal BOND amount (up to 8 fractional digits) into base units.
fn parse_amount(s: &str) -> Result<u64> {
    let (whole, frac) = s.split_once('.').unwrap_or((s, ""));
    if whole.is_empty() && frac.is_empty() {
        bail!("Invalid amount: {s:?}");
    }
    if frac.len() > 8 {
        bail!("Amount has more than 8 decimal places: {s}");
    }
    let whole: u64 = if whole.is_empty() {
        0
    } else {
        whole.parse().with_context(|| format!("Invalid amount: {s:?}"))?
    };
    let frac: u64 = if frac.is_empty() {
        0
    } else {
        let padded = format!("{frac:0<8}");
        padded.parse().with_context(|| format!("Invalid amount: {s:?}"))?
    };
    whole
        .checked_mul(COIN)
        .and_then(|w| w.checked_add(frac))
        .context("Amount out of range")
}

fn format_coin(base_units: u64) -> String {
    format_coin_wide(base_units as u128)
}

fn format_coin_wide(base_units: u128) -> String {
    let coin = COIN as u128;
    format!("{}.{:08} BOND", base_units / coin, base_units % coin)
}

fn format_time(t: Timestamp) -> String {
    match i64::try_from(t).ok().and_then(|s| DateTime::<Utc>::from_timestamp(s, 0)) {
        Some(dt) => format!("{} ({t})", dt.format("%Y-%m-%d %H:%M:%S UTC")),
        None => t.to_string(),
    }
}

fn format_ratio(ratio: u128) -> String {
    let bps = ratio * BPS_PRECISION as u128 / RATIO_PRECISION;
    format_bps(bps as u64)
}

fn format_bps(bps: u64) -> String {
    format!("{}.{:02}%", bps / 100, bps % 100)
}
