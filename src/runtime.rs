use crate::config::Config;
use anyhow::Error;
use tokio::runtime::{Builder, Runtime};

#[tracing::instrument(level = "debug")]
pub fn build(config: &Config) -> Result<Runtime, Error> {
    let mut builder = Builder::new_multi_thread();
    builder.enable_all();

    let config = &config.threads;
    if let Some(wt) = config.worker_threads {
        builder.worker_threads(wt);
    }
    if let Some(mbt) = config.max_blocking_threads {
        builder.max_blocking_threads(mbt);
    }

    Ok(builder.build()?)
}
