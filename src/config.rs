use anyhow::{anyhow, Result};
use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Command line flags.  Anything given here overrides files and env.
#[derive(Debug, Parser)]
#[command(name = "seedlist", about = "Serves a signed list of live swarm peers")]
pub struct Args {
    /// Configuration file
    #[arg(short, long, default_value = "seedlist.toml")]
    pub config: PathBuf,
    /// Names of services to expose (repeatable)
    #[arg(long = "service")]
    pub services: Vec<String>,
    /// Name of the overlay network to use
    #[arg(long)]
    pub network: Option<String>,
    /// Refresh interval, e.g. `30s` or `1m`
    #[arg(long = "refresh", value_parser = humantime::parse_duration)]
    pub refresh: Option<Duration>,
    /// Listen address
    #[arg(short, long)]
    pub listen: Option<SocketAddr>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub services: Vec<String>,
    pub network: String,
    #[serde(with = "humantime_serde")]
    pub refresh_interval: Duration,
    pub listen: SocketAddr,
    pub docker_host: String,
    pub rpc_port: u16,
    #[serde(with = "humantime_serde")]
    pub rpc_timeout: Duration,
    pub seed_scheme: String,
    pub seed_port: u16,
    /// Sort peers by address so identical peer sets give identical output.
    pub sort_peers: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            services: vec!["validator".into()],
            network: "devnet".into(),
            refresh_interval: Duration::from_secs(60),
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            docker_host: "unix:///var/run/docker.sock".into(),
            rpc_port: 8648,
            rpc_timeout: Duration::from_secs(3),
            seed_scheme: "ws".into(),
            seed_port: 8443,
            sort_peers: true,
        }
    }
}

impl Config {
    /// Defaults, then `$DOCKER_HOST`, the config file, `SEEDLIST_*`
    /// variables and finally command line flags.
    pub fn figment(args: &Args) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()))
            .merge(
                Env::raw()
                    .only(&["DOCKER_HOST"])
                    .map(|_| "docker_host".into()),
            )
            .merge(Toml::file(&args.config))
            .merge(Env::prefixed("SEEDLIST_"));

        if !args.services.is_empty() {
            figment = figment.merge(Serialized::default("services", &args.services));
        }
        if let Some(ref network) = args.network {
            figment = figment.merge(Serialized::default("network", network));
        }
        if let Some(refresh) = args.refresh {
            figment = figment.merge(Serialized::default(
                "refresh_interval",
                humantime::format_duration(refresh).to_string(),
            ));
        }
        if let Some(listen) = args.listen {
            figment = figment.merge(Serialized::default("listen", listen.to_string()));
        }
        figment
    }

    pub fn load(args: &Args) -> Result<Self> {
        let config: Config = Self::figment(args)
            .extract()
            .map_err(|e| anyhow!("Failed to load configuration: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.services.is_empty() {
            return Err(anyhow!("At least one service name is required"));
        }
        if self.refresh_interval.is_zero() {
            return Err(anyhow!("refresh_interval must be greater than zero"));
        }
        if self.rpc_timeout.is_zero() {
            return Err(anyhow!("rpc_timeout must be greater than zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(argv: &[&str]) -> Args {
        Args::parse_from(std::iter::once("seedlist").chain(argv.iter().copied()))
    }

    #[test]
    fn defaults() {
        Jail::expect_with(|_jail| {
            let cfg: Config = Config::figment(&args(&[])).extract()?;
            assert_eq!(cfg.services, vec!["validator".to_string()]);
            assert_eq!(cfg.network, "devnet");
            assert_eq!(cfg.refresh_interval, Duration::from_secs(60));
            assert_eq!(cfg.listen, "0.0.0.0:8080".parse().unwrap());
            assert_eq!(cfg.rpc_port, 8648);
            assert_eq!(cfg.rpc_timeout, Duration::from_secs(3));
            assert_eq!(cfg.seed_port, 8443);
            assert!(cfg.sort_peers);
            Ok(())
        });
    }

    #[test]
    fn layers_file_env_and_flags() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "seedlist.toml",
                r#"
                network = "from-file"
                refresh_interval = "5m"
                rpc_timeout = "1s"
                "#,
            )?;
            jail.set_env("DOCKER_HOST", "tcp://10.1.1.1:2375");
            jail.set_env("SEEDLIST_NETWORK", "from-env");

            let cfg: Config = Config::figment(&args(&[
                "--service",
                "validator",
                "--service",
                "seed",
                "--refresh",
                "30s",
            ]))
            .extract()?;
            assert_eq!(cfg.services, vec!["validator".to_string(), "seed".to_string()]);
            assert_eq!(cfg.network, "from-env");
            assert_eq!(cfg.refresh_interval, Duration::from_secs(30));
            assert_eq!(cfg.rpc_timeout, Duration::from_secs(1));
            assert_eq!(cfg.docker_host, "tcp://10.1.1.1:2375");

            let cfg: Config = Config::figment(&args(&["--network", "from-flag", "-l", "127.0.0.1:9000"]))
                .extract()?;
            assert_eq!(cfg.network, "from-flag");
            assert_eq!(cfg.listen, "127.0.0.1:9000".parse().unwrap());
            Ok(())
        });
    }

    #[test]
    fn docker_host_defaults_to_local_socket() {
        assert_eq!(Config::default().docker_host, "unix:///var/run/docker.sock");
    }

    #[test]
    fn zero_refresh_is_rejected() {
        let cfg = Config {
            refresh_interval: Duration::ZERO,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }
}
