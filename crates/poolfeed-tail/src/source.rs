//! The tail source: a lazy stream of record batches from a set of files.

use futures_util::stream::BoxStream;
use poolfeed_core::config::TailConfig;
use poolfeed_core::types::Batch;
use std::sync::Arc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::{batcher::Batcher, decoder::RecordDecoder, error::TailError, follow::FollowedFile};

/// One item of a tail stream.
#[derive(Debug)]
pub enum TailEvent {
    /// New records, in arrival order.
    Batch(Batch),
    /// The source cannot continue. Always the last item of the stream.
    Fatal(TailError),
}

/// Anything that can produce a tail stream.
///
/// `open` must not do any work up front: reading starts when the stream is
/// first polled and stops when it is dropped. Each call starts a fresh,
/// independent stream.
pub trait TailSource: Send + Sync + 'static {
    fn open(&self) -> BoxStream<'static, TailEvent>;
}

/// Polling implementation over the files named in a [`TailConfig`].
#[derive(Debug, Clone)]
pub struct FileTail {
    config: Arc<TailConfig>,
    decoder: RecordDecoder,
}

impl FileTail {
    pub fn new(config: TailConfig) -> Self {
        let decoder = RecordDecoder::new(config.category_field.clone());
        Self {
            config: Arc::new(config),
            decoder,
        }
    }

    pub fn config(&self) -> &TailConfig {
        &self.config
    }
}

impl TailSource for FileTail {
    fn open(&self) -> BoxStream<'static, TailEvent> {
        let config = Arc::clone(&self.config);
        let decoder = self.decoder.clone();

        Box::pin(async_stream::stream! {
            let specs = config.resolved_files();
            let mut files = Vec::with_capacity(specs.len());
            for spec in specs {
                files.push(FollowedFile::open(spec, config.backscan_bytes).await);
            }
            info!(
                files = files.len(),
                backscan_bytes = config.backscan_bytes,
                "tail source started"
            );

            let quiescence = config.quiescence();
            let mut batcher = Batcher::new(config.batch_size);
            let mut ticker = tokio::time::interval(config.poll_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            if files.is_empty() {
                yield TailEvent::Fatal(TailError::NoFiles);
            }

            while !files.is_empty() {
                ticker.tick().await;

                for file in files.iter_mut() {
                    let lines = match file.poll().await {
                        Ok(lines) => lines,
                        Err(e) => {
                            warn!(error = %e, "log read failed, retrying");
                            continue;
                        }
                    };
                    for line in lines {
                        let Some(record) = decoder.decode(&line, file.default_category()) else {
                            continue;
                        };
                        if let Some(batch) = batcher.push(Arc::new(record)) {
                            yield TailEvent::Batch(batch);
                        }
                    }
                }

                if let Some(batch) = batcher.flush_if_quiet(Instant::now(), quiescence) {
                    yield TailEvent::Batch(batch);
                }

                if files.iter().all(FollowedFile::is_missing) && !any_parent_exists(&files).await {
                    let dirs = files
                        .iter()
                        .filter_map(|f| f.path().parent())
                        .map(|d| d.display().to_string())
                        .collect::<Vec<_>>()
                        .join(", ");
                    error!(%dirs, "log directory removed, tail source giving up");
                    if let Some(batch) = batcher.flush() {
                        yield TailEvent::Batch(batch);
                    }
                    yield TailEvent::Fatal(TailError::SourceGone { dirs });
                    break;
                }
            }
        })
    }
}

async fn any_parent_exists(files: &[FollowedFile]) -> bool {
    for file in files {
        if file.parent_exists().await {
            return true;
        }
    }
    false
}
