use serde::Deserialize;
use std::sync::LazyLock;

pub static CONFIG: LazyLock<Config> = LazyLock::new(|| {
    let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".into());
    let config_file = std::fs::read_to_string(path).expect("failed to open config file");
    serde_yaml::from_str(&config_file).expect("failed to parse config file")
});

#[derive(Deserialize)]
pub struct Config {
    pub postgres: Postgres,
    pub cache: Cache,
    pub warmer: Warmer,
    pub catalog: Catalog,
    pub loki: Loki,
    pub api: Api,
}

#[derive(Deserialize)]
pub struct Postgres {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub db_name: String,
}

#[derive(Deserialize)]
pub struct Cache {
    pub ttl_secs: u64,
    pub max_entries: u64,
}

#[derive(Deserialize)]
pub struct Warmer {
    pub concurrency: usize,
    pub submit_batch: usize,
    pub submit_pause_ms: u64,
    pub poll_attempts: usize,
    pub totals_period_secs: u64,
}

#[derive(Deserialize)]
pub struct Catalog {
    pub languages: Vec<String>,
    pub sources: Vec<String>,
    pub request_timeout_ms: u64,
    pub shard_timeout_ms: u64,
}

#[derive(Deserialize)]
pub struct Loki {
    pub url: String,
}

#[derive(Deserialize)]
pub struct Api {
    pub bind: String,
}
