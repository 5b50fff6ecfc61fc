use {
    clap::Parser,
    primitive_types::H160,
    std::{fmt, time::Duration},
};

#[derive(Parser, Debug)]
pub struct Arguments {
    #[clap(long, env, default_value = "warn,orderbook=debug,matching=debug,settlement=debug")]
    pub log_filter: String,

    /// Chain id bound into the order signing domain.
    #[clap(long, env, default_value = "137")]
    pub chain_id: u64,

    /// Exchange contract address bound into the order signing domain.
    #[clap(
        long,
        env,
        default_value = "0x0000000000000000000000000000000000000000"
    )]
    pub verifying_contract: H160,

    /// Maximum number of trades per settlement epoch.
    #[clap(long, env, default_value = "100")]
    pub settlement_batch_size: usize,

    /// How often to cut an epoch regardless of batch fill level.
    #[clap(long, env, default_value = "30s", value_parser = humantime::parse_duration)]
    pub settlement_interval: Duration,

    /// Retries for a failing epoch commit.
    #[clap(long, env, default_value = "3")]
    pub commit_max_retries: u32,

    #[clap(long, env, default_value = "1s", value_parser = humantime::parse_duration)]
    pub commit_base_delay: Duration,

    #[clap(long, env, default_value = "30s", value_parser = humantime::parse_duration)]
    pub commit_max_delay: Duration,

    /// Event subscribers without a heartbeat for this long are dropped.
    #[clap(long, env, default_value = "60s", value_parser = humantime::parse_duration)]
    pub heartbeat_timeout: Duration,

    #[clap(long, env, default_value = "30s", value_parser = humantime::parse_duration)]
    pub sweep_interval: Duration,

    /// Must be at least one second.
    #[clap(long, env, default_value = "10s", value_parser = parse_reconciliation_interval)]
    pub reconciliation_interval: Duration,

    /// Balance deviation that counts as a discrepancy, in parts per million.
    #[clap(long, env, default_value = "100", value_parser = clap::value_parser!(u64).range(1..=1_000_000))]
    pub reconciliation_threshold_ppm: u64,
}

fn parse_reconciliation_interval(s: &str) -> Result<Duration, String> {
    let interval = humantime::parse_duration(s).map_err(|err| err.to_string())?;
    if interval < Duration::from_secs(1) {
        return Err("reconciliation interval must be at least one second".to_string());
    }
    Ok(interval)
}

impl fmt::Display for Arguments {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "log_filter: {}", self.log_filter)?;
        writeln!(f, "chain_id: {}", self.chain_id)?;
        writeln!(f, "verifying_contract: {:?}", self.verifying_contract)?;
        writeln!(f, "settlement_batch_size: {}", self.settlement_batch_size)?;
        writeln!(f, "settlement_interval: {:?}", self.settlement_interval)?;
        writeln!(f, "commit_max_retries: {}", self.commit_max_retries)?;
        writeln!(f, "commit_base_delay: {:?}", self.commit_base_delay)?;
        writeln!(f, "commit_max_delay: {:?}", self.commit_max_delay)?;
        writeln!(f, "heartbeat_timeout: {:?}", self.heartbeat_timeout)?;
        writeln!(f, "sweep_interval: {:?}", self.sweep_interval)?;
        writeln!(
            f,
            "reconciliation_interval: {:?}",
            self.reconciliation_interval
        )?;
        writeln!(
            f,
            "reconciliation_threshold_ppm: {}",
            self.reconciliation_threshold_ppm
        )
    }
}
