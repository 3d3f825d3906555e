pub mod backend;
pub mod board;
pub mod category;
pub mod cli;
pub mod commands;
pub mod config;
pub mod due;
pub mod error;
pub mod filter;
pub mod forms;
mod id;
pub mod notify;
pub mod render;
pub mod reorder;
pub mod selection;
pub mod store;
pub mod subtask;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
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
    "starting taskdeck CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.taskdeckrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let store_path =
    config::resolve_store_path(
      &cfg,
      cli.store.as_deref()
    )
    .context(
      "failed to resolve store \
       location"
    )?;

  let backend =
    backend::MemoryBackend::open(
      &store_path
    )
    .with_context(|| {
      format!(
        "failed to open store at {}",
        store_path.display()
      )
    })?;
  let store = store::Store::new(backend)
    .with_timeout(cfg.store_timeout()?);

  let mut renderer =
    render::Renderer::new(&cfg)?;
  let mut board = board::TaskBoard::new(
    store,
    renderer.notifier()
  );
  let confirm =
    commands::TerminalConfirm::new(
      &cfg, cli.yes
    );
  let command =
    cli.command.unwrap_or_else(|| {
      cli::Command::List {
        filter: cli::FilterArgs::default(),
        json:   false
      }
    });

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_time()
      .build()
      .context(
        "failed to start async runtime"
      )?;

  let outcome = runtime.block_on(
    commands::dispatch(
      &mut board,
      &cfg,
      &mut renderer,
      &confirm,
      command
    )
  );

  board
    .store()
    .backend()
    .flush()
    .with_context(|| {
      format!(
        "failed to write store to {}",
        store_path.display()
      )
    })?;

  outcome?;
  info!("done");
  Ok(())
}
