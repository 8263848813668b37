//! Pure log-parsing helpers: pulling the structured success payload off the
//! tail of a container's log, and reverse-scanning for the last raised error
//! and its stacktrace when a container exits non-zero.
//!
//! Grounded in `job_watcher.py`'s `process_job_success` and
//! `_find_latest_raised_error_and_stacktrace_from_reversed_logs`.

use jobcontroller_core::model::{JobState, ScriptSuccessPayload};

/// Extracts the JSON success payload from a successful container's full log:
/// the last non-empty line. A trailing `\n` leaves an empty split artefact at
/// the end of `lines`, which is dropped before the last element is taken.
pub fn extract_success_payload(log: &str) -> ScriptSuccessPayload {
    let mut lines: Vec<&str> = log.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    let candidate = lines.last().copied().unwrap_or("");

    match serde_json::from_str::<ScriptSuccessPayload>(candidate) {
        Ok(payload) => payload,
        Err(error) => ScriptSuccessPayload {
            status: "UNSUCCESSFUL".to_string(),
            status_message: error.to_string(),
            output_files: Vec::new(),
            stacktrace: String::new(),
        },
    }
}

/// Maps a parsed success payload's free-form `status` to a [`JobState`].
pub fn success_state(payload: &ScriptSuccessPayload) -> JobState {
    JobState::from_script_status(&payload.status)
}

/// Finds the most recently raised `Error:` line and the stacktrace around it
/// from a failed container's last 50 log lines. `raw_logs` is in natural
/// (oldest-first) order; this reverses it internally to scan from the most
/// recent line backwards, exactly as the source's pre-reversed-list scan.
pub fn find_latest_error_and_stacktrace(raw_logs: &str) -> (String, String) {
    let mut reversed: Vec<&str> = raw_logs.split('\n').collect();
    reversed.reverse();
    find_latest_error_and_stacktrace_from_reversed(&reversed)
}

fn find_latest_error_and_stacktrace_from_reversed(reversed_logs: &[&str]) -> (String, String) {
    if reversed_logs.is_empty() {
        return (String::new(), String::new());
    }

    let mut line_to_record = reversed_logs[0].to_string();
    let mut stacktrace_lines: Vec<&str> = Vec::new();

    for line in reversed_logs {
        if stacktrace_lines.is_empty() {
            if line.contains("Error:") {
                line_to_record = line.to_string();
                stacktrace_lines.push(line);
            }
        } else if !line.contains("Traceback (most recent call last):") {
            stacktrace_lines.push(line);
        } else {
            stacktrace_lines.push(line);
            break;
        }
    }

    stacktrace_lines.reverse();
    let stacktrace = stacktrace_lines.iter().map(|line| format!("{line}\n")).collect();
    (line_to_record, stacktrace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_payload_takes_second_to_last_line_when_trailing_newline() {
        let log = "starting up\n{\"status\": \"successful\", \"output_files\": [\"a.nxs\"]}\n";
        let payload = extract_success_payload(log);
        assert_eq!(payload.status, "successful");
        assert_eq!(payload.output_files, vec!["a.nxs".to_string()]);
    }

    #[test]
    fn success_payload_takes_only_line_when_no_trailing_newline() {
        let log = "{\"status\": \"successful\"}";
        let payload = extract_success_payload(log);
        assert_eq!(payload.status, "successful");
    }

    #[test]
    fn success_payload_takes_last_line_of_multi_line_log_without_trailing_newline() {
        let log = "starting up\n{\"status\":\"successful\",\"output_files\":[\"a.nxs\"]}";
        let payload = extract_success_payload(log);
        assert_eq!(payload.status, "successful");
        assert_eq!(payload.output_files, vec!["a.nxs".to_string()]);
    }

    #[test]
    fn malformed_success_payload_falls_back_to_unsuccessful() {
        let log = "not json\n";
        let payload = extract_success_payload(log);
        assert_eq!(payload.status, "UNSUCCESSFUL");
        assert!(payload.output_files.is_empty());
    }

    #[test]
    fn finds_error_line_and_stacktrace() {
        let log = "line one\n\
                    Traceback (most recent call last):\n\
                    \x20 File \"script.py\", line 3\n\
                    ValueError: Error: something broke\n\
                    trailing log line";
        let (error_line, stacktrace) = find_latest_error_and_stacktrace(log);
        assert_eq!(error_line, "ValueError: Error: something broke");
        assert!(stacktrace.starts_with("Traceback (most recent call last):\n"));
        assert!(stacktrace.contains("ValueError: Error: something broke"));
    }

    #[test]
    fn no_error_line_records_last_log_line() {
        let log = "all good\nnothing here";
        let (error_line, stacktrace) = find_latest_error_and_stacktrace(log);
        assert_eq!(error_line, "nothing here");
        assert_eq!(stacktrace, "");
    }
}
