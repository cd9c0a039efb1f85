pub mod autosave;
pub mod board;
pub mod calendar;
pub mod calendar_sync;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod diff;
pub mod error;
pub mod filter;
pub mod history;
pub mod inbound;
pub mod label;
pub mod lanes;
pub mod render;
pub mod selection;
pub mod sort;
pub mod store;
pub mod task;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use board::Board;
pub use error::{
  BoardError,
  CalendarError,
  StoreError
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting taskboard CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.boardrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let owner = cfg.owner();
  let store =
    datastore::JsonlTaskStore::open(
      &data_dir, &owner
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;

  let calendar =
    datastore::JsonlCalendar::open(
      &data_dir
    )
    .context(
      "failed to open local calendar"
    )?;
  let session =
    commands::Session::from_config(
      &cfg,
      Arc::new(calendar)
    )?;
  let history_limit =
    cfg.history_limit()?;
  let command = cli.command.unwrap_or(
    cli::Command::List(
      cli::ListArgs::default()
    )
  );

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_time()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  runtime.block_on(async move {
    let mut board =
      Board::with_history_limit(
        Arc::new(store),
        history_limit
      );
    board.load().await?;
    commands::dispatch(
      &mut board, &session, command
    )
    .await
  })?;

  info!("done");
  Ok(())
}
