//! Persisting a cycle's records.
//!
//! A batch is written to `<name>.part` and renamed into place only after it
//! has been flushed and synced, so a file under its final name is always
//! complete.
//!
//! Container layout:
//!
//! ```text
//! ┌──────────┬─────────┬──────────────────────────────┐
//! │ "ORCV"   │ Version │ Records (MessagePack maps)   │
//! │ 4 bytes  │ 1 byte  │ {name, class, version, data} │
//! └──────────┴─────────┴──────────────────────────────┘
//! ```

use std::io::Cursor;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike};
use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::codec::MsgPackCodec;
use crate::decoder::SENTINEL_RUN;
use crate::error::{ReceiverError, Result};
use crate::record::{Record, RecordStore};
use crate::state::CycleState;

/// Leading bytes of every output container.
pub const CONTAINER_MAGIC: &[u8; 4] = b"ORCV";

/// Current container format version.
pub const CONTAINER_VERSION: u8 = 1;

/// Suffix of a container that is still being written.
pub const PART_SUFFIX: &str = ".part";

/// Build the output file name for a batch.
///
/// Numbers are not zero-padded.
pub fn output_filename<Tz: TimeZone>(
    subsystem: &str,
    run: u32,
    mode: &str,
    time: &DateTime<Tz>,
    extension: &str,
) -> String {
    format!(
        "{subsystem}histos_{run}_{mode}_{}_{}_{}_{}_{}_{}.{extension}",
        time.year(),
        time.month(),
        time.day(),
        time.hour(),
        time.minute(),
        time.second(),
    )
}

/// What [`OutputWriter::maybe_flush`] did with a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Written {
        path: PathBuf,
        written: usize,
        failed: usize,
    },
    SkippedSentinelRun,
    SkippedEmpty,
    SkippedNoMetadata,
}

/// Decides whether to persist a batch and writes it.
#[derive(Debug, Clone)]
pub struct OutputWriter {
    data_dir: PathBuf,
    subsystem: String,
    extension: String,
    write_placeholder_runs: bool,
}

impl OutputWriter {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        subsystem: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            subsystem: subsystem.into(),
            extension: extension.into(),
            write_placeholder_runs: false,
        }
    }

    /// Also write batches that arrive before any metadata frame, under the
    /// placeholder run and mode.
    pub fn with_placeholder_runs(mut self, enabled: bool) -> Self {
        self.write_placeholder_runs = enabled;
        self
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Write `records` to a fresh container unless the batch is skipped.
    ///
    /// An error means the container could not be created or finalized;
    /// no file is left under the final name in that case.
    pub async fn maybe_flush(
        &self,
        state: &CycleState,
        records: &RecordStore,
    ) -> Result<FlushOutcome> {
        if state.run == SENTINEL_RUN {
            tracing::info!(mode = %state.mode, "zero-run message suppressed");
            return Ok(FlushOutcome::SkippedSentinelRun);
        }
        if records.is_empty() {
            tracing::info!(run = state.run, "no records received, nothing written");
            return Ok(FlushOutcome::SkippedEmpty);
        }
        if !state.metadata_seen && !self.write_placeholder_runs {
            tracing::info!(records = records.size(), "no run metadata yet, batch not written");
            return Ok(FlushOutcome::SkippedNoMetadata);
        }

        let name = output_filename(
            &self.subsystem,
            state.run,
            &state.mode,
            &Local::now(),
            &self.extension,
        );
        let path = self.data_dir.join(name);
        let (written, failed) = write_container(&path, records.iter()).await?;

        tracing::info!(path = %path.display(), written, failed, "wrote records");
        Ok(FlushOutcome::Written {
            path,
            written,
            failed,
        })
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut part = path.as_os_str().to_owned();
    part.push(PART_SUFFIX);
    PathBuf::from(part)
}

/// Write a container at `path` holding `records`.
///
/// Returns how many records were written and how many failed. A failed
/// record is logged and skipped; the container is still finalized.
pub async fn write_container<'a>(
    path: &Path,
    records: impl Iterator<Item = &'a Record>,
) -> Result<(usize, usize)> {
    write_container_through(path, records, BufWriter::new).await
}

/// Like [`write_container`], with every write going through `wrap(file)`.
async fn write_container_through<'a, W>(
    path: &Path,
    records: impl Iterator<Item = &'a Record>,
    wrap: impl FnOnce(File) -> W,
) -> Result<(usize, usize)>
where
    W: AsyncWrite + Unpin,
{
    let part = part_path(path);
    let mut out = wrap(File::create(&part).await?);

    let result = async {
        let counts = write_records(&mut out, records).await?;
        out.shutdown().await?;
        drop(out);

        File::open(&part).await?.sync_all().await?;
        tokio::fs::rename(&part, path).await?;
        Ok::<_, ReceiverError>(counts)
    }
    .await;

    if result.is_err() {
        let _ = tokio::fs::remove_file(&part).await;
    }
    result
}

/// Write the container header, then each record, skipping failed ones.
async fn write_records<'a, W>(
    out: &mut W,
    records: impl Iterator<Item = &'a Record>,
) -> Result<(usize, usize)>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(CONTAINER_MAGIC).await?;
    out.write_u8(CONTAINER_VERSION).await?;

    let mut written = 0;
    let mut failed = 0;
    let mut scratch = Vec::new();
    for record in records {
        tracing::debug!(name = %record.name, "Writing object {} to file", record.name);
        scratch.clear();
        let outcome = match MsgPackCodec::encode_into(&mut scratch, record) {
            Ok(()) => out.write_all(&scratch).await.map_err(ReceiverError::from),
            Err(e) => Err(e),
        };
        match outcome {
            Ok(()) => written += 1,
            Err(e) => {
                tracing::warn!(name = %record.name, error = %e, "record not written");
                failed += 1;
            }
        }
    }

    Ok((written, failed))
}

/// Read every record of a finished container.
pub async fn read_container(path: &Path) -> Result<Vec<Record>> {
    let bytes = tokio::fs::read(path).await?;
    let header_len = CONTAINER_MAGIC.len() + 1;

    if bytes.len() < header_len || &bytes[..CONTAINER_MAGIC.len()] != CONTAINER_MAGIC {
        return Err(ReceiverError::Protocol(format!(
            "{}: not a record container",
            path.display()
        )));
    }
    let version = bytes[CONTAINER_MAGIC.len()];
    if version != CONTAINER_VERSION {
        return Err(ReceiverError::Protocol(format!(
            "{}: unsupported container version {version}",
            path.display()
        )));
    }

    let body = &bytes[header_len..];
    let mut cursor = Cursor::new(body);
    let mut records = Vec::new();
    while (cursor.position() as usize) < body.len() {
        records.push(rmp_serde::from_read(&mut cursor)?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use super::*;
    use tempfile::TempDir;

    /// Rejects any write whose buffer contains `poison`.
    struct RejectingWriter {
        inner: File,
        poison: &'static [u8],
    }

    impl AsyncWrite for RejectingWriter {
        fn poll_write(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<std::io::Result<usize>> {
            if buf.windows(self.poison.len()).any(|w| w == self.poison) {
                return Poll::Ready(Err(std::io::Error::other("disk full")));
            }
            Pin::new(&mut self.inner).poll_write(cx, buf)
        }

        fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_flush(cx)
        }

        fn poll_shutdown(
            mut self: Pin<&mut Self>,
            cx: &mut Context<'_>,
        ) -> Poll<std::io::Result<()>> {
            Pin::new(&mut self.inner).poll_shutdown(cx)
        }
    }

    fn state(run: u32) -> CycleState {
        CycleState {
            run,
            mode: "B".to_string(),
            schema_needed: false,
            metadata_seen: true,
        }
    }

    fn store(names: &[&str]) -> RecordStore {
        let mut store = RecordStore::new();
        for name in names {
            store.add(Record::new(*name, "TH1F", 1, name.as_bytes().to_vec()));
        }
        store
    }

    fn files(dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        files.sort();
        files
    }

    #[test]
    fn test_output_filename_unpadded() {
        let time = Local.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        assert_eq!(
            output_filename("EMC", 42, "B", &time, "rec"),
            "EMChistos_42_B_2024_3_7_9_5_2.rec"
        );
    }

    #[tokio::test]
    async fn test_flush_writes_all_records() {
        let dir = TempDir::new().unwrap();
        let writer = OutputWriter::new(dir.path(), "EMC", "rec");
        let records = store(&["A", "B"]);

        let outcome = writer.maybe_flush(&state(42), &records).await.unwrap();

        let (path, written, failed) = match outcome {
            FlushOutcome::Written { path, written, failed } => (path, written, failed),
            other => panic!("expected a file, got {other:?}"),
        };
        assert_eq!((written, failed), (2, 0));
        assert_eq!(files(dir.path()), vec![path.clone()]);

        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("EMChistos_42_B_"), "{name}");
        assert!(name.ends_with(".rec"), "{name}");

        let read: Vec<Record> = read_container(&path).await.unwrap();
        assert_eq!(read, records.iter().cloned().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_sentinel_run_never_written() {
        let dir = TempDir::new().unwrap();
        let writer = OutputWriter::new(dir.path(), "EMC", "rec");

        let outcome = writer.maybe_flush(&state(0), &store(&["A"])).await.unwrap();

        assert_eq!(outcome, FlushOutcome::SkippedSentinelRun);
        assert!(files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_not_written() {
        let dir = TempDir::new().unwrap();
        let writer = OutputWriter::new(dir.path(), "EMC", "rec");

        let outcome = writer.maybe_flush(&state(42), &RecordStore::new()).await.unwrap();

        assert_eq!(outcome, FlushOutcome::SkippedEmpty);
        assert!(files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_placeholder_run_needs_opt_in() {
        let dir = TempDir::new().unwrap();
        let fresh = CycleState::new(false);
        let records = store(&["A"]);

        let writer = OutputWriter::new(dir.path(), "EMC", "rec");
        assert_eq!(
            writer.maybe_flush(&fresh, &records).await.unwrap(),
            FlushOutcome::SkippedNoMetadata
        );

        let writer = writer.with_placeholder_runs(true);
        let outcome = writer.maybe_flush(&fresh, &records).await.unwrap();
        let path = match outcome {
            FlushOutcome::Written { path, .. } => path,
            other => panic!("expected a file, got {other:?}"),
        };
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("EMChistos_123456789_B_"), "{name}");
    }

    #[tokio::test]
    async fn test_missing_directory_is_reported() {
        let dir = TempDir::new().unwrap();
        let writer = OutputWriter::new(dir.path().join("gone"), "EMC", "rec");

        let result = writer.maybe_flush(&state(42), &store(&["A"])).await;

        assert!(matches!(result, Err(ReceiverError::Io(_))));
        assert!(files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn test_no_part_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.rec");

        write_container(&path, store(&["A"]).iter()).await.unwrap();

        assert_eq!(files(dir.path()), vec![path]);
    }

    #[tokio::test]
    async fn test_failed_record_does_not_abort_batch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out.rec");
        let records = [
            Record::new("A", "TH1F", 1, b"A".to_vec()),
            Record::new("B", "TH1F", 1, b"poisoned".to_vec()),
            Record::new("C", "TH1F", 1, b"C".to_vec()),
        ];

        let (written, failed) = write_container_through(&path, records.iter(), |file| {
            RejectingWriter {
                inner: file,
                poison: b"poisoned",
            }
        })
        .await
        .unwrap();

        assert_eq!((written, failed), (2, 1));
        assert_eq!(files(dir.path()), vec![path.clone()]);
        let names: Vec<String> = read_container(&path)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["A", "C"]);
    }

    #[tokio::test]
    async fn test_read_container_rejects_foreign_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("junk.rec");
        std::fs::write(&path, b"not a container").unwrap();

        assert!(matches!(
            read_container(&path).await,
            Err(ReceiverError::Protocol(_))
        ));
    }
}
