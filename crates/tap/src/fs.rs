//! Filesystem-backed record endpoint writing JSON-line part files.

use std::collections::VecDeque;
use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;

use dfl_common::{DflError, PipelineConfig, Result, config::keys};
use dfl_pipeline::context::PipelineContext;
use dfl_pipeline::record::Record;
use dfl_pipeline::tap::{BoxedCollector, RecordCollector, RecordStream, SinkMode, Tap, TapKind};
use tracing::debug;

/// Directory-of-part-files endpoint.
///
/// Each writing slice owns one part file under the endpoint directory, so
/// parallel instances never touch each other's output. Records are encoded
/// as one JSON document per line.
pub struct FsTap {
    path: PathBuf,
    identifier: String,
}

impl FsTap {
    /// Endpoint rooted at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let path = dir.into();
        let identifier = path.to_string_lossy().into_owned();
        Self { path, identifier }
    }

    fn part_file_name(&self, ctx: &PipelineContext) -> String {
        if let Some(template) = ctx.property(keys::TAP_PART_NAME) {
            return template.replace("{seq}", "00000");
        }
        let slice = ctx.current_slice().unwrap_or(0);
        format!("part-{slice:05}")
    }

    fn apply_sink_mode(&self, mode: Option<SinkMode>) -> Result<()> {
        match mode {
            Some(SinkMode::Replace) => {
                if self.path.exists() {
                    fs::remove_dir_all(&self.path)?;
                }
                Ok(())
            }
            Some(SinkMode::Keep) => {
                let occupied = match fs::read_dir(&self.path) {
                    Ok(mut entries) => entries.next().is_some(),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => false,
                    Err(e) => return Err(e.into()),
                };
                if occupied {
                    return Err(DflError::InvalidConfig(format!(
                        "endpoint '{}' already holds data",
                        self.identifier
                    )));
                }
                Ok(())
            }
            Some(SinkMode::Update) | None => Ok(()),
        }
    }

    fn sorted_part_files(&self) -> Result<VecDeque<PathBuf>> {
        let mut parts = Vec::new();
        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            let name = entry.file_name();
            if name.to_string_lossy().starts_with("part-") {
                parts.push(entry.path());
            }
        }
        parts.sort();
        Ok(parts.into())
    }
}

impl Tap for FsTap {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn kind(&self) -> TapKind {
        TapKind::Filesystem
    }

    fn open_for_read(&self, _ctx: &PipelineContext) -> Result<RecordStream> {
        let files = self.sorted_part_files()?;
        Ok(Box::new(FsRecordStream { files, lines: None }))
    }

    fn open_for_write(
        &self,
        ctx: &PipelineContext,
        mode: Option<SinkMode>,
    ) -> Result<BoxedCollector> {
        self.apply_sink_mode(mode)?;
        fs::create_dir_all(&self.path)?;
        let part = self.path.join(self.part_file_name(ctx));
        debug!(
            operator = "FsTap",
            endpoint = %self.identifier,
            part = %part.display(),
            "opening part file for writing"
        );
        let file = File::create(&part)?;
        Ok(Box::new(FsCollector {
            part,
            writer: Some(BufWriter::new(file)),
            rows: 0,
        }))
    }

    fn cleanup_job(&self, conf: &PipelineConfig) -> Result<()> {
        if conf.get_bool(keys::FLOW_EXECUTING)? != Some(false) {
            return Ok(());
        }
        let Some(output_dir) = conf.get(keys::OUTPUT_DIR) else {
            return Ok(());
        };
        let scratch = PathBuf::from(output_dir).join("_temporary");
        if scratch.exists() {
            debug!(
                operator = "FsTap",
                scratch = %scratch.display(),
                "removing scratch directory"
            );
            fs::remove_dir_all(&scratch)?;
        }
        Ok(())
    }
}

struct FsCollector {
    part: PathBuf,
    writer: Option<BufWriter<File>>,
    rows: u64,
}

impl RecordCollector for FsCollector {
    fn add(&mut self, record: Record) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(|| {
            DflError::State(format!(
                "collector for '{}' has already been closed",
                self.part.display()
            ))
        })?;
        let line = serde_json::to_string(&record)
            .map_err(|e| DflError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        self.rows += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            debug!(
                operator = "FsTap",
                part = %self.part.display(),
                rows = self.rows,
                "closed part file"
            );
        }
        Ok(())
    }
}

struct FsRecordStream {
    files: VecDeque<PathBuf>,
    lines: Option<io::Lines<BufReader<File>>>,
}

impl Iterator for FsRecordStream {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(lines) = &mut self.lines {
                match lines.next() {
                    Some(Ok(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        return Some(serde_json::from_str(&line).map_err(|e| {
                            DflError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
                        }));
                    }
                    Some(Err(e)) => return Some(Err(e.into())),
                    None => self.lines = None,
                }
            } else if let Some(path) = self.files.pop_front() {
                match File::open(&path) {
                    Ok(file) => self.lines = Some(BufReader::new(file).lines()),
                    Err(e) => return Some(Err(e.into())),
                }
            } else {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::{SystemTime, UNIX_EPOCH};

    use dfl_common::{CounterRegistry, PipelineConfig, config::keys};
    use dfl_pipeline::context::{PipelineContext, RuntimeHandle};
    use dfl_pipeline::record::{FieldValue, Record};
    use dfl_pipeline::tap::{SinkMode, Tap};

    use super::FsTap;

    fn unique_path(label: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        std::env::temp_dir().join(format!("dfl-tap-{label}-{nanos}"))
    }

    struct SliceRuntime {
        index: u32,
        counters: CounterRegistry,
    }

    impl RuntimeHandle for SliceRuntime {
        fn task_index(&self) -> u32 {
            self.index
        }

        fn task_count(&self) -> u32 {
            4
        }

        fn counters(&self) -> &CounterRegistry {
            &self.counters
        }
    }

    fn context_for_slice(index: u32) -> PipelineContext {
        let runtime = SliceRuntime {
            index,
            counters: CounterRegistry::new(),
        };
        PipelineContext::new(PipelineConfig::new(), Arc::new(runtime), "datasink-ff")
    }

    fn record(n: i64) -> Record {
        Record::from_values(vec![FieldValue::Int(n), FieldValue::Str(format!("r{n}"))])
    }

    #[test]
    fn writes_one_part_file_per_slice() {
        let dir = unique_path("parts");
        let tap = FsTap::new(&dir);
        for slice in [0u32, 2] {
            let ctx = context_for_slice(slice);
            let mut collector = tap.open_for_write(&ctx, None).expect("open");
            collector.add(record(i64::from(slice))).expect("add");
            collector.close().expect("close");
        }
        assert!(dir.join("part-00000").exists());
        assert!(dir.join("part-00002").exists());
        fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[test]
    fn round_trips_records_through_json_lines() {
        let dir = unique_path("roundtrip");
        let tap = FsTap::new(&dir);
        let ctx = context_for_slice(0);
        let mut collector = tap.open_for_write(&ctx, None).expect("open");
        collector.add(record(1)).expect("add");
        collector.add(record(2)).expect("add");
        collector.close().expect("close");

        let read_back: Vec<Record> = tap
            .open_for_read(&ctx)
            .expect("open read")
            .collect::<Result<_, _>>()
            .expect("decode");
        assert_eq!(read_back, vec![record(1), record(2)]);
        fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[test]
    fn plain_write_leaves_other_part_files_alone() {
        let dir = unique_path("siblings");
        let tap = FsTap::new(&dir);
        let first = context_for_slice(0);
        let mut collector = tap.open_for_write(&first, None).expect("open");
        collector.add(record(1)).expect("add");
        collector.close().expect("close");

        let second = context_for_slice(1);
        let mut collector = tap.open_for_write(&second, None).expect("open");
        collector.add(record(2)).expect("add");
        collector.close().expect("close");

        assert!(dir.join("part-00000").exists());
        assert!(dir.join("part-00001").exists());
        fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[test]
    fn replace_mode_clears_previous_content() {
        let dir = unique_path("replace");
        let tap = FsTap::new(&dir);
        let ctx = context_for_slice(1);
        let mut collector = tap.open_for_write(&ctx, None).expect("open");
        collector.add(record(1)).expect("add");
        collector.close().expect("close");

        let ctx = context_for_slice(0);
        let mut collector = tap
            .open_for_write(&ctx, Some(SinkMode::Replace))
            .expect("open replace");
        collector.add(record(9)).expect("add");
        collector.close().expect("close");

        assert!(!dir.join("part-00001").exists());
        assert!(dir.join("part-00000").exists());
        fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[test]
    fn keep_mode_rejects_occupied_directories() {
        let dir = unique_path("keep");
        let tap = FsTap::new(&dir);
        let ctx = context_for_slice(0);
        let mut collector = tap.open_for_write(&ctx, None).expect("open");
        collector.add(record(1)).expect("add");
        collector.close().expect("close");

        let err = tap
            .open_for_write(&ctx, Some(SinkMode::Keep))
            .expect_err("must reject");
        assert!(err.to_string().contains("already holds data"));
        fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[test]
    fn part_name_template_overrides_the_slice_name() {
        let dir = unique_path("template");
        let tap = FsTap::new(&dir);
        let mut conf = PipelineConfig::new();
        conf.set(keys::TAP_PART_NAME, "part-datasink-ff-00003-{seq}");
        let ctx = context_for_slice(3).copy_with(conf);
        let mut collector = tap.open_for_write(&ctx, None).expect("open");
        collector.add(record(1)).expect("add");
        collector.close().expect("close");
        assert!(dir.join("part-datasink-ff-00003-00000").exists());
        fs::remove_dir_all(&dir).expect("cleanup");
    }

    #[test]
    fn cleanup_job_removes_scratch_only_after_execution() {
        let dir = unique_path("scratch");
        fs::create_dir_all(dir.join("_temporary")).expect("mkdir");
        let tap = FsTap::new(&dir);

        let mut executing = PipelineConfig::new();
        executing.set_bool(keys::FLOW_EXECUTING, true);
        executing.set(keys::OUTPUT_DIR, dir.to_string_lossy());
        tap.cleanup_job(&executing).expect("cleanup");
        assert!(dir.join("_temporary").exists());

        let mut finished = PipelineConfig::new();
        finished.set_bool(keys::FLOW_EXECUTING, false);
        finished.set(keys::OUTPUT_DIR, dir.to_string_lossy());
        tap.cleanup_job(&finished).expect("cleanup");
        assert!(!dir.join("_temporary").exists());

        tap.cleanup_job(&finished).expect("missing scratch is fine");
        fs::remove_dir_all(&dir).expect("cleanup");
    }
}
