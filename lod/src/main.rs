//! Command-line entry point: `lod serve`, `lod config-check`, and
//! `lod config-doc`.

use anyhow::Result;
use clap::{Parser, Subcommand};
use clap_verbosity_flag::{ErrorLevel, Verbosity};
use lod::config::{AppConfig, RawConfig, RawProxyConfig, RawServerConfig};
use lod::server::LodServer;
use lod::AppState;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
	author,
	version,
	about,
	long_about = None,
	propagate_version = true,
	disable_help_subcommand = true,
)]
struct Cli {
	#[command(subcommand)]
	command: Commands,

	#[command(flatten)]
	verbose: Verbosity<ErrorLevel>,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Serve cached tiles via HTTP
	#[clap(alias = "server")]
	Serve(ServeArgs),

	/// Load and validate a config file without starting the server
	ConfigCheck(ConfigCheckArgs),

	/// Print a markdown reference for the config file format
	ConfigDoc,
}

#[derive(clap::Args, Debug)]
struct ServeArgs {
	/// Path to the TOML config file
	#[arg(long, short)]
	config: PathBuf,

	/// Enable developer-friendly logging regardless of the DEPLOY
	/// environment variable
	#[arg(long)]
	dev: bool,
}

#[derive(clap::Args, Debug)]
struct ConfigCheckArgs {
	#[arg(long, short)]
	config: PathBuf,
}

fn main() -> Result<()> {
	let cli = Cli::parse();

	let is_dev = matches!(&cli.command, Commands::Serve(args) if args.dev) || std::env::var("DEPLOY").as_deref() == Ok("DEV");
	let mut builder = env_logger::Builder::new();
	builder.filter_level(cli.verbose.log_level_filter()).format_timestamp(if is_dev { None } else { Some(env_logger::TimestampPrecision::Seconds) });
	builder.init();

	run(cli)
}

fn run(cli: Cli) -> Result<()> {
	match cli.command {
		Commands::Serve(args) => serve(args),
		Commands::ConfigCheck(args) => config_check(args),
		Commands::ConfigDoc => {
			println!("{}", RawConfig::md());
			println!("{}", RawServerConfig::md());
			println!("{}", RawProxyConfig::md());
			Ok(())
		}
	}
}

fn serve(args: ServeArgs) -> Result<()> {
	let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
	runtime.block_on(async move {
		let config = AppConfig::from_path(&args.config)?;
		let ip = config.ip.clone();
		let port = config.port;
		let state = AppState::new(config, Some(args.config.clone())).await?;
		lod::server::validate_router(&state)?;

		let mut server = LodServer::new(state, ip, port);
		server.start().await?;
		log::info!("lod listening on port {}", server.get_port());

		tokio::signal::ctrl_c().await?;
		server.stop().await;
		Ok(())
	})
}

fn config_check(args: ConfigCheckArgs) -> Result<()> {
	let config = AppConfig::from_path(&args.config)?;
	println!("config OK: {} prox{} configured", config.proxies.len(), if config.proxies.len() == 1 { "y" } else { "ies" });
	Ok(())
}
