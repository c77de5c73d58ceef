use crate::client::VoiceService;
use crate::export::{self, ResultRecord};
use crate::fingerprint;
use crate::log_view::LogBuffer;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunCounters {
    pub succeeded: usize,
    pub failed: usize,
}

impl RunCounters {
    pub fn completed(&self) -> usize {
        self.succeeded + self.failed
    }
}

/// Everything one finished job contributes, delivered in a single message.
#[derive(Debug, Clone)]
pub struct JobReport {
    pub path: PathBuf,
    pub started_at: OffsetDateTime,
    pub logs: Vec<String>,
    pub record: ResultRecord,
}

impl JobReport {
    pub fn succeeded(&self) -> bool {
        self.record.status == export::RecordStatus::Success
    }
}

/// Derive the voice id, upload, then clone. Never fails: every outcome is a report.
pub async fn run_job<S: VoiceService>(service: &S, path: PathBuf) -> JobReport {
    let started_at = export::now();
    let mut logs = vec![
        format!("processing {}", display_name(&path)),
        "  -> uploading file...".to_string(),
    ];

    let voice_id = match fingerprint::derive(&path).await {
        Ok(voice_id) => voice_id,
        Err(err) => {
            error!(file = %path.display(), error = %err, "voice id derivation failed");
            logs.push(format!("  ✗ could not derive voice id: {err}"));
            let record =
                ResultRecord::failed(path.clone(), String::new(), String::new(), err.to_string());
            return JobReport {
                path,
                started_at,
                logs,
                record,
            };
        }
    };
    logs.push(format!("  -> voice id {}", voice_id.short()));

    let uploaded = match service.upload(&path).await {
        Ok(uploaded) => uploaded,
        Err(err) => {
            error!(file = %path.display(), error = %err, "upload failed");
            logs.push(format!("  ✗ upload failed: {err}"));
            let record =
                ResultRecord::failed(path.clone(), String::new(), String::new(), err.to_string());
            return JobReport {
                path,
                started_at,
                logs,
                record,
            };
        }
    };
    let file_id = uploaded.file_id.to_string();
    logs.push(format!("  ✓ uploaded, file id {file_id}"));
    logs.push(format!("  -> cloning voice {}...", voice_id.short()));

    let remote_voice_id = voice_id.remote();
    match service.clone_voice(uploaded.file_id, &remote_voice_id).await {
        Ok(accepted) => {
            info!(file = %path.display(), voice_id = %remote_voice_id, "clone succeeded");
            logs.push(format!("  ✓ cloned, voice id {}", voice_id.short()));
            logs.push(format!("    remote status: {}", accepted.status_message));
            let record = ResultRecord::success(path.clone(), file_id, remote_voice_id);
            JobReport {
                path,
                started_at,
                logs,
                record,
            }
        }
        Err(err) => {
            error!(file = %path.display(), error = %err, "clone failed");
            logs.push(format!("  ✗ clone failed: {err}"));
            let record =
                ResultRecord::failed(path.clone(), file_id, remote_voice_id, err.to_string());
            JobReport {
                path,
                started_at,
                logs,
                record,
            }
        }
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStep {
    Next(PathBuf),
    Finished(RunCounters),
}

/// A frozen queue processed strictly one job at a time.
#[derive(Debug, Clone)]
pub struct CloneRun {
    queue: Vec<PathBuf>,
    next: usize,
    in_flight: Option<PathBuf>,
    counters: RunCounters,
    log: LogBuffer,
}

impl CloneRun {
    pub fn new(queue: Vec<PathBuf>) -> Self {
        Self {
            queue,
            next: 0,
            in_flight: None,
            counters: RunCounters::default(),
            log: LogBuffer::new(),
        }
    }

    /// Hands out the first job, or the completion signal for an empty queue.
    pub fn start(&mut self) -> RunStep {
        self.advance()
    }

    fn advance(&mut self) -> RunStep {
        match self.queue.get(self.next) {
            Some(path) => {
                self.next += 1;
                self.in_flight = Some(path.clone());
                RunStep::Next(path.clone())
            }
            None => {
                self.in_flight = None;
                RunStep::Finished(self.counters)
            }
        }
    }

    /// Folds a finished job in and decides what runs next. Returns `None` for a
    /// report that does not belong to the job in flight.
    pub fn absorb(&mut self, report: JobReport) -> Option<(ResultRecord, RunStep)> {
        if self.in_flight.as_ref() != Some(&report.path) {
            warn!(file = %report.path.display(), "ignoring report for a job that is not in flight");
            return None;
        }
        self.in_flight = None;
        self.log
            .extend(report.started_at, report.logs.iter().map(String::as_str));
        if report.succeeded() {
            self.counters.succeeded += 1;
        } else {
            self.counters.failed += 1;
        }
        Some((report.record, self.advance()))
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn total(&self) -> usize {
        self.queue.len()
    }

    pub fn in_flight(&self) -> Option<&Path> {
        self.in_flight.as_deref()
    }

    pub fn log(&self) -> &LogBuffer {
        &self.log
    }

    pub fn into_log(self) -> LogBuffer {
        self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{ClientError, CloneAccepted, UploadedFile};
    use crate::export::RecordStatus;
    use crate::fingerprint::VoiceId;
    use std::collections::HashMap;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Scripted stand-in for the remote service, keyed by file name.
    #[derive(Default)]
    struct FakeService {
        upload_failures: HashMap<String, String>,
        clone_failure: Option<String>,
        calls: Mutex<Vec<String>>,
    }

    fn key(path: &Path) -> String {
        path.file_name().unwrap().to_string_lossy().to_string()
    }

    impl VoiceService for FakeService {
        async fn upload(&self, path: &Path) -> Result<UploadedFile, ClientError> {
            self.calls.lock().unwrap().push(format!("upload {}", key(path)));
            if let Some(message) = self.upload_failures.get(&key(path)) {
                return Err(ClientError::Remote {
                    operation: "upload",
                    code: 1,
                    message: message.clone(),
                });
            }
            Ok(UploadedFile { file_id: 7 })
        }

        async fn clone_voice(&self, file_id: i64, voice_id: &str) -> Result<CloneAccepted, ClientError> {
            self.calls.lock().unwrap().push(format!("clone {file_id} {voice_id}"));
            if let Some(message) = &self.clone_failure {
                return Err(ClientError::Remote {
                    operation: "clone",
                    code: 2,
                    message: message.clone(),
                });
            }
            Ok(CloneAccepted {
                status_message: "ok".to_string(),
            })
        }
    }

    fn audio(dir: &TempDir, name: &str, bytes: &[u8]) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, bytes).unwrap();
        path
    }

    #[tokio::test]
    async fn successful_job_records_both_identifiers() {
        let temp = TempDir::new().unwrap();
        let path = audio(&temp, "a.mp3", b"voice sample");
        let service = FakeService::default();

        let report = run_job(&service, path.clone()).await;
        let record = &report.record;
        assert!(report.succeeded());
        assert_eq!(record.file_path, path);
        assert_eq!(record.file_id, "7");
        assert_eq!(record.voice_id, VoiceId::from_bytes(b"voice sample").remote());
        assert_eq!(record.error_reason, "");
        assert!(record.updated_at.is_some());
        assert!(report.logs.iter().any(|line| line.contains("remote status: ok")));
    }

    #[tokio::test]
    async fn upload_failure_skips_clone() {
        let temp = TempDir::new().unwrap();
        let path = audio(&temp, "bad.mp3", b"x");
        let mut service = FakeService::default();
        service
            .upload_failures
            .insert("bad.mp3".to_string(), "network error".to_string());

        let report = run_job(&service, path.clone()).await;
        assert_eq!(report.record.status, RecordStatus::Failed);
        assert_eq!(report.record.file_id, "");
        assert_eq!(report.record.voice_id, "");
        assert!(report.record.error_reason.contains("network error"));
        assert_eq!(service.calls.lock().unwrap().as_slice(), ["upload bad.mp3"]);
    }

    #[tokio::test]
    async fn clone_failure_keeps_uploaded_file_id() {
        let temp = TempDir::new().unwrap();
        let path = audio(&temp, "c.wav", b"y");
        let mut service = FakeService::default();
        service.clone_failure = Some("voice exists".to_string());

        let report = run_job(&service, path).await;
        assert_eq!(report.record.status, RecordStatus::Failed);
        assert_eq!(report.record.file_id, "7");
        assert!(report.record.voice_id.starts_with("minimax-voice-"));
        assert!(report.record.error_reason.contains("voice exists"));
    }

    #[tokio::test]
    async fn unreadable_file_fails_before_upload() {
        let temp = TempDir::new().unwrap();
        let service = FakeService::default();

        let report = run_job(&service, temp.path().join("missing.mp3")).await;
        assert_eq!(report.record.status, RecordStatus::Failed);
        assert!(service.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn run_counts_every_job_once_in_queue_order() {
        let temp = TempDir::new().unwrap();
        let names = ["1.mp3", "2.mp3", "3.wav", "4.m4a"];
        let queue: Vec<PathBuf> = names
            .iter()
            .map(|name| audio(&temp, name, name.as_bytes()))
            .collect();
        let mut service = FakeService::default();
        service.upload_failures.insert("2.mp3".into(), "boom".into());
        service.upload_failures.insert("4.m4a".into(), "boom".into());

        let mut run = CloneRun::new(queue.clone());
        let mut records = Vec::new();
        let mut step = run.start();
        let counters = loop {
            match step {
                RunStep::Next(path) => {
                    assert_eq!(run.in_flight(), Some(path.as_path()));
                    let report = run_job(&service, path).await;
                    let (record, next) = run.absorb(report).unwrap();
                    records.push(record);
                    step = next;
                }
                RunStep::Finished(counters) => break counters,
            }
        };

        assert_eq!(counters.completed(), queue.len());
        assert_eq!(counters, RunCounters { succeeded: 2, failed: 2 });
        let paths: Vec<PathBuf> = records.iter().map(|r| r.file_path.clone()).collect();
        assert_eq!(paths, queue);
        assert!(!run.log().is_empty());
    }

    #[test]
    fn empty_queue_finishes_immediately() {
        let mut run = CloneRun::new(Vec::new());
        assert_eq!(run.start(), RunStep::Finished(RunCounters::default()));
    }

    #[tokio::test]
    async fn stray_reports_are_ignored() {
        let temp = TempDir::new().unwrap();
        let queued = audio(&temp, "q.mp3", b"q");
        let stray = audio(&temp, "s.mp3", b"s");
        let service = FakeService::default();

        let mut run = CloneRun::new(vec![queued]);
        run.start();
        let report = run_job(&service, stray).await;
        assert!(run.absorb(report).is_none());
        assert_eq!(run.counters(), RunCounters::default());
    }
}
