//! Verdict classifier
//!
//! Single funnel that maps raw harness output plus the sandbox exec outcome
//! onto the canonical status taxonomy. Rules apply in order; the first match
//! wins.

use crate::codec::ResultDoc;
use crate::sandbox::ExecOutcome;
use crate::types::{Metrics, Verdict, VerdictStatus};

/// Harness exit codes at or above this value are internal failures
const HARNESS_INTERNAL_EXIT: i64 = 3;

/// Map a harness status string onto the canonical taxonomy, normalizing the
/// synonyms older harness versions emitted
fn normalize_status(raw: &str) -> Option<VerdictStatus> {
    match raw {
        "SUCCESS" => Some(VerdictStatus::Success),
        "WRONG_ANSWER" => Some(VerdictStatus::WrongAnswer),
        "COMPILE_ERROR" => Some(VerdictStatus::CompileError),
        "COMPILE_TIMEOUT" => Some(VerdictStatus::CompileTimeout),
        "RUNTIME_ERROR" => Some(VerdictStatus::RuntimeError),
        "TIMEOUT" | "TIMEOUT_ERROR" => Some(VerdictStatus::Timeout),
        "ERROR" | "INTERNAL_ERROR" => Some(VerdictStatus::InternalError),
        _ => None,
    }
}

/// Whether the harness had reached its run phase when the sandbox was
/// killed: a result document exists, no compiler failure was recorded, and
/// compilation took measurable time (or was skipped for a reused runner,
/// which only happens after a successful compile).
fn reached_run_phase(doc: Option<&ResultDoc>) -> bool {
    match doc {
        Some(doc) => {
            (doc.compile_time_ms > 0 || doc.recompiled.is_some())
                && doc.compile_output.is_none()
        }
        None => false,
    }
}

/// Finalize a verdict from the sandbox outcome and the downloaded result
/// document (if any).
pub fn classify(outcome: &ExecOutcome, doc: Option<ResultDoc>) -> Verdict {
    // 1. Outer deadline kills override everything the harness may have
    //    left behind.
    if outcome.killed_by_deadline {
        let status = if reached_run_phase(doc.as_ref()) {
            VerdictStatus::Timeout
        } else {
            VerdictStatus::CompileTimeout
        };
        let mut verdict = from_doc(doc.unwrap_or_default(), status);
        verdict.error_detail = Some("sandbox killed by outer wall deadline".to_string());
        return verdict;
    }

    // 2. Internal harness failure or an unusable result document.
    if outcome.exit_code >= HARNESS_INTERNAL_EXIT {
        return Verdict::internal_error(format!(
            "harness exited with internal code {}: {}",
            outcome.exit_code,
            outcome.stderr.trim()
        ));
    }
    let doc = match doc {
        Some(doc) => doc,
        None => {
            return Verdict::internal_error("harness produced no result document");
        }
    };
    let status = match normalize_status(&doc.status) {
        Some(status) => status,
        None => {
            return Verdict::internal_error(format!(
                "harness reported unknown status {:?}",
                doc.status
            ));
        }
    };

    // 3. Adopt the harness status verbatim.
    from_doc(doc, status)
}

/// Build a verdict from a result document with a settled status, enforcing
/// the match semantics: true only with SUCCESS, false with WRONG_ANSWER,
/// undefined otherwise.
fn from_doc(doc: ResultDoc, status: VerdictStatus) -> Verdict {
    let matched = match status {
        VerdictStatus::Success => Some(true),
        VerdictStatus::WrongAnswer => Some(false),
        _ => None,
    };

    Verdict {
        status,
        matched,
        expected: doc.expected,
        actual: doc.actual,
        stdout: doc.stdout,
        stderr: doc.stderr,
        compile_output: doc.compile_output,
        exit_code: doc.exit_code,
        metrics: Metrics {
            wall_ms: doc.time_ms,
            compile_ms: doc.compile_time_ms,
            user_cpu_s: doc.cpu_utime,
            sys_cpu_s: doc.cpu_stime,
            max_rss_bytes: (doc.maxrss_mb * 1024.0 * 1024.0) as u64,
            recompiled: doc.recompiled,
        },
        error_detail: doc.error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(exit_code: i64) -> ExecOutcome {
        ExecOutcome {
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
            wall_ms: 10,
            killed_by_deadline: false,
        }
    }

    fn success_doc() -> ResultDoc {
        ResultDoc {
            status: "SUCCESS".into(),
            compile_time_ms: 250,
            time_ms: 12,
            matched: Some(true),
            ..Default::default()
        }
    }

    #[test]
    fn test_adopts_harness_status() {
        let verdict = classify(&outcome(0), Some(success_doc()));
        assert_eq!(verdict.status, VerdictStatus::Success);
        assert_eq!(verdict.matched, Some(true));
        assert_eq!(verdict.metrics.compile_ms, 250);
    }

    #[test]
    fn test_normalizes_synonyms() {
        let mut doc = success_doc();
        doc.status = "TIMEOUT_ERROR".into();
        let verdict = classify(&outcome(2), Some(doc));
        assert_eq!(verdict.status, VerdictStatus::Timeout);
        assert_eq!(verdict.matched, None);

        let mut doc = success_doc();
        doc.status = "ERROR".into();
        let verdict = classify(&outcome(0), Some(doc));
        assert_eq!(verdict.status, VerdictStatus::InternalError);
    }

    #[test]
    fn test_missing_document_is_internal_error() {
        let verdict = classify(&outcome(0), None);
        assert_eq!(verdict.status, VerdictStatus::InternalError);
        assert!(verdict.error_detail.is_some());
    }

    #[test]
    fn test_internal_exit_code_wins_over_document() {
        let verdict = classify(&outcome(3), Some(success_doc()));
        assert_eq!(verdict.status, VerdictStatus::InternalError);
    }

    #[test]
    fn test_deadline_kill_after_compile_is_timeout() {
        let killed = ExecOutcome {
            killed_by_deadline: true,
            exit_code: -1,
            ..outcome(-1)
        };
        let verdict = classify(&killed, Some(success_doc()));
        assert_eq!(verdict.status, VerdictStatus::Timeout);
        assert_eq!(verdict.matched, None);
    }

    #[test]
    fn test_deadline_kill_before_compile_is_compile_timeout() {
        let killed = ExecOutcome {
            killed_by_deadline: true,
            exit_code: -1,
            ..outcome(-1)
        };
        let verdict = classify(&killed, None);
        assert_eq!(verdict.status, VerdictStatus::CompileTimeout);
    }

    #[test]
    fn test_deadline_kill_with_failed_compile_output_is_compile_timeout() {
        let killed = ExecOutcome {
            killed_by_deadline: true,
            exit_code: -1,
            ..outcome(-1)
        };
        let mut doc = success_doc();
        doc.compile_output = Some("error: expected ';'".into());
        let verdict = classify(&killed, Some(doc));
        assert_eq!(verdict.status, VerdictStatus::CompileTimeout);
    }

    #[test]
    fn test_wrong_answer_match_is_false() {
        let mut doc = success_doc();
        doc.status = "WRONG_ANSWER".into();
        doc.matched = Some(false);
        let verdict = classify(&outcome(0), Some(doc));
        assert_eq!(verdict.status, VerdictStatus::WrongAnswer);
        assert_eq!(verdict.matched, Some(false));
    }

    #[test]
    fn test_unknown_status_is_internal_error() {
        let mut doc = success_doc();
        doc.status = "BANANA".into();
        let verdict = classify(&outcome(0), Some(doc));
        assert_eq!(verdict.status, VerdictStatus::InternalError);
    }
}
