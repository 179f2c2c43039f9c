//! Daemon configuration from command-line flags and the environment.

use lmlab::PlaybackConfig;

use crate::error::DaemonError;

pub const DEFAULT_ADDR: &str = "127.0.0.1:9877";
pub const ADDR_ENV: &str = "LMLAB_ADDR";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub addr: String,
    /// Starting intervals for every new session.
    pub playback: PlaybackConfig,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            playback: PlaybackConfig::default(),
        }
    }
}

impl DaemonConfig {
    pub fn from_env_and_args() -> Result<Self, DaemonError> {
        Self::parse(std::env::var(ADDR_ENV).ok(), std::env::args().skip(1))
    }

    /// Flags win over the environment.
    pub fn parse(
        env_addr: Option<String>,
        args: impl IntoIterator<Item = String>,
    ) -> Result<Self, DaemonError> {
        let mut cfg = Self::default();
        if let Some(addr) = env_addr.filter(|a| !a.trim().is_empty()) {
            cfg.addr = addr;
        }

        let mut args = args.into_iter();
        while let Some(flag) = args.next() {
            let mut value = |name: &str| {
                args.next()
                    .ok_or_else(|| DaemonError::Usage(format!("{name} needs a value")))
            };
            match flag.as_str() {
                "--addr" => cfg.addr = value("--addr")?,
                "--counting-ms" => {
                    let ms = parse_ms("--counting-ms", &value("--counting-ms")?)?;
                    cfg.playback = cfg.playback.with_counting_interval_ms(ms);
                }
                "--optimization-ms" => {
                    let ms = parse_ms("--optimization-ms", &value("--optimization-ms")?)?;
                    cfg.playback = cfg.playback.with_optimization_interval_ms(ms);
                }
                other => return Err(DaemonError::Usage(format!("unknown flag: {other}"))),
            }
        }
        Ok(cfg)
    }
}

fn parse_ms(flag: &str, raw: &str) -> Result<u32, DaemonError> {
    raw.parse()
        .map_err(|_| DaemonError::Usage(format!("{flag} must be a number of milliseconds")))
}
