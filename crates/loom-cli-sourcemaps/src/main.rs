// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Loom source map uploader.
//!
//! Uploads JavaScript source maps (and optionally the sources they reference)
//! so minified crash stack traces can be symbolicated.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use loom_sourcemaps::{
	resolve_options_in, DirectorySelection, UploadError, UploadOptionsLayer, Uploader,
};

mod config;

/// Loom source map uploader
#[derive(Parser, Debug)]
#[command(name = "loom-sourcemaps", version, about, long_about = None)]
struct Cli {
	/// Path to a TOML config file (defaults to .loom/sourcemaps.toml)
	#[arg(long, global = true)]
	config: Option<PathBuf>,

	/// Enable debug logging
	#[arg(long, global = true)]
	verbose: bool,

	#[command(subcommand)]
	command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Upload one source map, or every source map in a directory
	Upload(UploadArgs),
}

#[derive(Args, Debug)]
struct UploadArgs {
	/// Your project's API key
	#[arg(short = 'k', long)]
	api_key: Option<String>,

	/// The version of the application the source map applies to
	#[arg(short = 'v', long)]
	app_version: Option<String>,

	/// The code bundle id (replaces the app version)
	#[arg(short = 'c', long)]
	code_bundle_id: Option<String>,

	/// Upload every *.map file in a directory (the project root if no path is given)
	#[arg(short = 'd', long, num_args = 0..=1, value_name = "PATH")]
	directory: Option<Option<PathBuf>>,

	/// The upload API endpoint
	#[arg(short = 'e', long)]
	endpoint: Option<String>,

	/// The URL the minified file is served from
	#[arg(short = 'm', long)]
	minified_url: Option<String>,

	/// Path to the source map
	#[arg(short = 's', long)]
	source_map: Option<PathBuf>,

	/// Path to the minified file
	#[arg(short = 'p', long)]
	minified_file: Option<PathBuf>,

	/// Upload the source files referenced by the map
	#[arg(short = 'u', long)]
	upload_sources: bool,

	/// Also upload sources from node_modules
	#[arg(short = 'n', long)]
	upload_node_modules: bool,

	/// Root used to make source paths relative
	#[arg(short = 'r', long)]
	project_root: Option<PathBuf>,

	/// Prefix source paths with a wildcard so they match any host
	#[arg(short = 'w', long)]
	add_wildcard_prefix: bool,

	/// Replace a source map already uploaded for this version
	#[arg(short = 'o', long)]
	overwrite: bool,
}

fn flag(set: bool) -> Option<bool> {
	set.then_some(true)
}

impl From<UploadArgs> for UploadOptionsLayer {
	fn from(args: UploadArgs) -> Self {
		UploadOptionsLayer {
			api_key: args.api_key,
			app_version: args.app_version,
			code_bundle_id: args.code_bundle_id,
			minified_url: args.minified_url,
			source_map: args.source_map,
			minified_file: args.minified_file,
			directory: args.directory.map(|path| match path {
				Some(path) => DirectorySelection::Path(path),
				None => DirectorySelection::Enabled(true),
			}),
			endpoint: args.endpoint,
			project_root: args.project_root,
			upload_sources: flag(args.upload_sources),
			upload_node_modules: flag(args.upload_node_modules),
			strip_project_root: None,
			add_wildcard_prefix: flag(args.add_wildcard_prefix),
			overwrite: flag(args.overwrite),
			extra_fields: None,
		}
	}
}

fn init_tracing(verbose: bool) {
	let level = if verbose { "debug" } else { "info" };
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
		EnvFilter::new(format!(
			"loom_sourcemaps={level},loom_cli_sourcemaps={level},loom_common_http={level}"
		))
	});

	tracing_subscriber::registry()
		.with(filter)
		.with(fmt::layer().with_target(false).with_writer(std::io::stderr))
		.init();
}

async fn run(cli: Cli) -> Result<()> {
	let Command::Upload(args) = cli.command;

	let cwd = std::env::current_dir().context("could not determine the working directory")?;
	let layer = config::load_layer(&cwd, cli.config, args.into())
		.context("failed to load configuration")?;

	let options = resolve_options_in(layer, &cwd).await?;
	let uploader = Uploader::from_env()?;
	let summary = uploader.upload_options(options).await?;

	info!(count = summary.uploaded.len(), "source map upload complete");
	Ok(())
}

fn report(err: &anyhow::Error) {
	error!("Error uploading source maps: {err:#}");

	let api_errors = err
		.downcast_ref::<UploadError>()
		.map(UploadError::api_errors)
		.unwrap_or_default();
	for message in api_errors {
		error!("  {message}");
	}
}

#[tokio::main]
async fn main() -> ExitCode {
	let cli = Cli::parse();
	init_tracing(cli.verbose);

	match run(cli).await {
		Ok(()) => ExitCode::SUCCESS,
		Err(err) => {
			report(&err);
			ExitCode::FAILURE
		}
	}
}
