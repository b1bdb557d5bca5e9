//! The receive loop.
//!
//! ```text
//! INIT ─► REQUEST ─► POLL ─┬─ timeout ─► RECONNECT ─► REQUEST
//!                          ├─ data ────► DECODE ─► FLUSH ─► SLEEP ─► REQUEST
//!                          ├─ fatal ───► error exit
//!                          └─ interrupt ─► TERMINATED
//! ```
//!
//! The interrupt is checked right after the poll, before a timeout would
//! trigger a reconnect.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::codec::{RecordCodec, SchemaCodec};
use crate::config::ReceiverConfig;
use crate::connection::{ConnectionManager, Endpoint, PollOutcome};
use crate::decoder::FrameDecoder;
use crate::error::Result;
use crate::heartbeat::write_heartbeat;
use crate::output::OutputWriter;
use crate::protocol::Message;
use crate::record::RecordStore;
use crate::state::{CycleState, RequestOptions};

/// Create the output directory if missing, owner-only on unix.
pub async fn prepare_data_dir(path: &Path) -> Result<()> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(0o700);
    builder.create(path).await?;
    Ok(())
}

/// Initialize and run a receiver until interrupted or a fatal error.
pub async fn run(config: &ReceiverConfig, cancel: CancellationToken) -> Result<()> {
    tracing::info!("{config}");

    if let Err(e) = prepare_data_dir(&config.data_path).await {
        tracing::error!(path = %config.data_path.display(), error = %e, "cannot create data directory");
    }

    let endpoint = ConnectionManager::open(config.address.clone())?
        .with_connect_timeout(config.timeout);

    Receiver::new(config, endpoint, SchemaCodec::new(), cancel)
        .run()
        .await
}

/// How a cycle ended.
enum Cycle {
    Continue,
    Interrupted,
}

/// Drives one endpoint through request, poll, decode and flush.
pub struct Receiver<E, C> {
    endpoint: E,
    decoder: FrameDecoder<C>,
    store: RecordStore,
    writer: OutputWriter,
    state: CycleState,
    request: RequestOptions,
    address: String,
    data_dir: PathBuf,
    subsystem: String,
    timeout: Duration,
    sleep: Duration,
    cancel: CancellationToken,
}

impl<E: Endpoint, C: RecordCodec> Receiver<E, C> {
    pub fn new(config: &ReceiverConfig, endpoint: E, codec: C, cancel: CancellationToken) -> Self {
        Self {
            endpoint,
            decoder: FrameDecoder::new(codec),
            store: RecordStore::new(),
            writer: OutputWriter::new(&config.data_path, &config.subsystem, &config.extension)
                .with_placeholder_runs(config.write_placeholder_runs),
            state: CycleState::new(config.request_schema),
            request: config.request.clone(),
            address: config.address.to_string(),
            data_dir: config.data_path.clone(),
            subsystem: config.subsystem.clone(),
            timeout: config.timeout,
            sleep: config.sleep,
            cancel,
        }
    }

    pub fn state(&self) -> &CycleState {
        &self.state
    }

    pub fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Loop until interrupted (`Ok`) or the transport fails for good (`Err`).
    pub async fn run(&mut self) -> Result<()> {
        loop {
            match self.cycle().await {
                Ok(Cycle::Continue) => {}
                Ok(Cycle::Interrupted) => break,
                Err(e) => {
                    tracing::error!(address = %self.address, error = %e, "bailing out");
                    return Err(e);
                }
            }
        }

        tracing::info!("interrupted, closing endpoint");
        self.endpoint.close().await;
        Ok(())
    }

    async fn cycle(&mut self) -> Result<Cycle> {
        if let Err(e) = write_heartbeat(&self.data_dir, &self.subsystem).await {
            tracing::warn!(error = %e, "heartbeat not written");
        }

        let options = self.request.build(&mut self.state);
        self.endpoint.send_request(&options).await?;

        // A signal cuts the poll short, like EINTR on a blocking poll.
        let outcome = tokio::select! {
            outcome = self.endpoint.poll_for_response(self.timeout) => Some(outcome),
            _ = self.cancel.cancelled() => None,
        };

        if self.cancel.is_cancelled() {
            return Ok(Cycle::Interrupted);
        }

        match outcome {
            None => return Ok(Cycle::Interrupted),
            Some(PollOutcome::Fatal(e)) => return Err(e),
            Some(PollOutcome::TimedOut) => {
                tracing::warn!(address = %self.address, "connection timed out, server died?");
                self.endpoint.reconnect().await?;
                return Ok(Cycle::Continue);
            }
            Some(PollOutcome::DataReady(message)) => self.receive(&message).await,
        }

        tokio::select! {
            _ = tokio::time::sleep(self.sleep) => Ok(Cycle::Continue),
            _ = self.cancel.cancelled() => Ok(Cycle::Interrupted),
        }
    }

    /// Decode a message and persist its records.
    async fn receive(&mut self, message: &Message) {
        self.store.clear();

        let (delta, outcomes) = self.decoder.decode(message);
        self.state.apply(delta);
        self.store
            .extend(outcomes.into_iter().filter_map(|outcome| outcome.into_record()));

        tracing::debug!(
            run = self.state.run,
            mode = %self.state.mode,
            records = self.store.size(),
            "received"
        );

        if let Err(e) = self.writer.maybe_flush(&self.state, &self.store).await {
            tracing::error!(dir = %self.writer.data_dir().display(), error = %e, "cannot write records");
        }
        self.store.clear();
    }
}
