use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use sb_core::{default_data_dir, Env, Node};
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod context;
mod domains;
mod util;

use crate::context::{Context, OutputFormat};
use crate::domains::{auth::AuthCmd, bookmarks::BookmarksCmd};

const DEFAULT_LOG_FILTER: &str = "info,sb_core=debug";

#[derive(Parser, Debug)]
#[command(name = "sb", about = "Smart Bookmarks CLI", version)]
struct Cli {
	/// Where the session is kept between runs
	#[arg(long, env = "SB_DATA_DIR")]
	data_dir: Option<PathBuf>,

	/// Output format
	#[arg(long, value_enum, default_value = "human")]
	format: OutputFormat,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	#[command(flatten)]
	Auth(AuthCmd),
	#[command(flatten)]
	Bookmarks(BookmarksCmd),
}

#[tokio::main]
async fn main() -> Result<()> {
	tracing_subscriber::registry()
		.with(
			EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
		)
		.with(fmt::layer().with_writer(std::io::stderr))
		.init();

	let cli = Cli::parse();

	let env = Env::from_env().context("Smart Bookmarks is not configured")?;
	let data_dir = match cli.data_dir {
		Some(dir) => dir,
		None => default_data_dir()?,
	};

	let ctx = Context::new(Node::new(env, data_dir), cli.format);

	match cli.command {
		Commands::Auth(cmd) => domains::auth::run(&ctx, cmd).await,
		Commands::Bookmarks(cmd) => domains::bookmarks::run(&ctx, cmd).await,
	}
}
