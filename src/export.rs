use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::OffsetDateTime;

const HEADER: [&str; 6] = [
    "file_path",
    "minimax_file_id",
    "minimax_voice_id",
    "status",
    "error_reason",
    "updated_at",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordStatus {
    Success,
    Failed,
}

impl RecordStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RecordStatus::Success => "success",
            RecordStatus::Failed => "failed",
        }
    }
}

/// Outcome of one clone job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub file_path: PathBuf,
    pub file_id: String,
    pub voice_id: String,
    pub status: RecordStatus,
    pub error_reason: String,
    pub updated_at: Option<OffsetDateTime>,
}

impl ResultRecord {
    pub fn success(file_path: PathBuf, file_id: String, voice_id: String) -> Self {
        Self {
            file_path,
            file_id,
            voice_id,
            status: RecordStatus::Success,
            error_reason: String::new(),
            updated_at: Some(now()),
        }
    }

    pub fn failed(
        file_path: PathBuf,
        file_id: String,
        voice_id: String,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            file_path,
            file_id,
            voice_id,
            status: RecordStatus::Failed,
            error_reason: reason.into(),
            updated_at: Some(now()),
        }
    }

    fn row(&self) -> [String; 6] {
        [
            self.file_path.to_string_lossy().to_string(),
            self.file_id.clone(),
            self.voice_id.clone(),
            self.status.as_str().to_string(),
            self.error_reason.clone(),
            self.updated_at
                .and_then(|at| at.format(&Rfc3339).ok())
                .unwrap_or_default(),
        ]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("no records to export")]
    Empty,
    #[error("failed to prepare {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to format export timestamp: {0}")]
    Timestamp(#[from] time::error::Format),
}

/// Current time in the local offset when it can be determined, UTC otherwise.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

pub fn export_csv(records: &[ResultRecord], dir: &Path) -> Result<PathBuf, ExportError> {
    export_csv_at(records, dir, now())
}

pub fn export_csv_at(
    records: &[ResultRecord],
    dir: &Path,
    at: OffsetDateTime,
) -> Result<PathBuf, ExportError> {
    if records.is_empty() {
        return Err(ExportError::Empty);
    }
    fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let stamp = at.format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))?;
    let (path, file) = create_unique(dir, &format!("minimax_voice_export_{stamp}"))?;

    let mut writer = csv::Writer::from_writer(file);
    writer.write_record(HEADER)?;
    for record in records {
        writer.write_record(record.row())?;
    }
    writer.flush().map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    Ok(path)
}

fn create_unique(dir: &Path, stem: &str) -> Result<(PathBuf, File), ExportError> {
    let mut attempt = 0u32;
    loop {
        let name = if attempt == 0 {
            format!("{stem}.csv")
        } else {
            format!("{stem}_{attempt}.csv")
        };
        let path = dir.join(name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => return Ok((path, file)),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => attempt += 1,
            Err(source) => return Err(ExportError::Io { path, source }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use time::macros::datetime;

    fn sample() -> Vec<ResultRecord> {
        vec![
            ResultRecord::success("/m/a.mp3".into(), "7".into(), "minimax-voice-1".into()),
            ResultRecord::failed("/m/bad, name.mp3".into(), String::new(), String::new(), "network error"),
        ]
    }

    #[test]
    fn writes_header_plus_one_line_per_record() {
        let temp = TempDir::new().unwrap();
        let records = sample();
        let path = export_csv(&records, temp.path()).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), records.len() + 1);
        assert_eq!(
            lines[0],
            "file_path,minimax_file_id,minimax_voice_id,status,error_reason,updated_at"
        );
        assert!(lines[1].starts_with("/m/a.mp3,7,minimax-voice-1,success,,"));
        assert!(lines[2].starts_with("\"/m/bad, name.mp3\",,,failed,network error,"));
    }

    #[test]
    fn empty_export_fails_without_creating_a_file() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("exports");
        assert!(matches!(export_csv(&[], &dir), Err(ExportError::Empty)));
        assert!(!dir.exists());
    }

    #[test]
    fn filename_embeds_the_timestamp() {
        let temp = TempDir::new().unwrap();
        let at = datetime!(2024-03-05 14:07:09 UTC);
        let path = export_csv_at(&sample(), temp.path(), at).unwrap();
        assert_eq!(
            path.file_name().unwrap(),
            "minimax_voice_export_20240305_140709.csv"
        );
    }

    #[test]
    fn same_second_exports_do_not_overwrite() {
        let temp = TempDir::new().unwrap();
        let at = datetime!(2024-03-05 14:07:09 UTC);
        let first = export_csv_at(&sample(), temp.path(), at).unwrap();
        let second = export_csv_at(&sample()[..1], temp.path(), at).unwrap();
        assert_ne!(first, second);
        assert_eq!(fs::read_to_string(&first).unwrap().lines().count(), 3);
        assert_eq!(fs::read_to_string(&second).unwrap().lines().count(), 2);
    }

    #[test]
    fn unset_timestamp_exports_as_empty() {
        let mut record = sample().remove(0);
        record.updated_at = None;
        assert_eq!(record.row()[5], "");
    }
}
