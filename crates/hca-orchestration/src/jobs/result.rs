//! Checks on the result body of a job that reported success
//!
//! A data repository job can finish `succeeded` while individual records
//! inside it were rejected. The result body carries those counts.

use hca_common::{types::JobId, HcaError, Result};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultCheck {
    /// Table ingest: `bad_row_count` must be zero.
    TableIngest,
    /// File-based jobs (bulk file ingest, soft deletion): `failedFiles` must be zero.
    NoFailedFiles,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct TableIngestResult {
    row_count: u64,
    bad_row_count: u64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct FileJobResult {
    succeeded_files: u64,
    failed_files: u64,
}

impl ResultCheck {
    pub fn verify(self, job_id: &JobId, result: &Value) -> Result<()> {
        match self {
            ResultCheck::TableIngest => {
                let summary = TableIngestResult::deserialize(result)?;
                if summary.bad_row_count > 0 {
                    return Err(HcaError::job_failed(
                        job_id.as_str(),
                        format!(
                            "{} of {} rows were rejected",
                            summary.bad_row_count,
                            summary.row_count + summary.bad_row_count
                        ),
                    ));
                }
            },
            ResultCheck::NoFailedFiles => {
                let summary = FileJobResult::deserialize(result)?;
                if summary.failed_files > 0 {
                    return Err(HcaError::job_failed(
                        job_id.as_str(),
                        format!(
                            "{} files failed ({} succeeded)",
                            summary.failed_files, summary.succeeded_files
                        ),
                    ));
                }
            },
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> JobId {
        JobId::new("fake_job_id")
    }

    #[test]
    fn test_failed_files_rejected() {
        let err = ResultCheck::NoFailedFiles
            .verify(&job(), &json!({"failedFiles": 1}))
            .unwrap_err();
        assert!(matches!(err, HcaError::JobFailed { .. }));
    }

    #[test]
    fn test_zero_or_missing_failed_files_accepted() {
        assert!(ResultCheck::NoFailedFiles
            .verify(&job(), &json!({"failedFiles": 0}))
            .is_ok());
        assert!(ResultCheck::NoFailedFiles
            .verify(&job(), &json!({"objectState": "deleted"}))
            .is_ok());
    }

    #[test]
    fn test_bad_rows_rejected() {
        let err = ResultCheck::TableIngest
            .verify(&job(), &json!({"row_count": 10, "bad_row_count": 2}))
            .unwrap_err();
        assert!(err.to_string().contains("2 of 12 rows were rejected"));

        assert!(ResultCheck::TableIngest
            .verify(&job(), &json!({"row_count": 10, "bad_row_count": 0}))
            .is_ok());
    }

    #[test]
    fn test_malformed_result_is_an_error() {
        assert!(ResultCheck::TableIngest
            .verify(&job(), &json!({"bad_row_count": "lots"}))
            .is_err());
    }
}
