//! Integration tests for ProcessOrchestrator against a scripted fake tool
//!
//! These tests verify:
//! - Exit-code classification and artifact discovery
//! - Signal exits, the working directory, and pipes held past exit
//! - Live relay of stdout/stderr chunks, in order, before `Completed`
//! - Cancellation and timeout kill the child
//! - Concurrent runs keep their output apart
//!
//! The fake tool is a shell script, so these only run on Unix.

#![cfg(unix)]

use calcrelay::metrics::Metrics;
use calcrelay::models::{ErrorKind, ProcessingOptions, ProcessingRequest, ProcessingResult};
use calcrelay::services::{
    ExecutableLocator, ProcessOrchestrator, RunControl, RunEvent, RunHandle, RuntimeMode,
};
use camino::{Utf8Path, Utf8PathBuf};
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::time::{Duration, timeout};

const TOOL_NAME: &str = "calc-engine";

struct Fixture {
    _temp_dir: TempDir,
    dir: Utf8PathBuf,
    bin_dir: Utf8PathBuf,
}

impl Fixture {
    /// Temp dir with `bin/calc-engine` running `body` under /bin/sh
    fn with_tool(body: &str) -> Self {
        let fixture = Self::without_tool();
        let tool = fixture.bin_dir.join(TOOL_NAME);

        let mut file = std::fs::File::create(&tool).unwrap();
        writeln!(file, "#!/bin/sh").unwrap();
        file.write_all(body.as_bytes()).unwrap();
        file.sync_all().unwrap();
        drop(file);

        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        fixture
    }

    fn without_tool() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let dir = Utf8PathBuf::try_from(temp_dir.path().to_path_buf()).unwrap();
        let bin_dir = dir.join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();

        Self {
            _temp_dir: temp_dir,
            dir,
            bin_dir,
        }
    }

    fn input(&self, name: &str) -> Utf8PathBuf {
        let path = self.dir.join(name);
        std::fs::write(&path, "id,value\n1,2.5\n").unwrap();
        path
    }

    fn orchestrator(&self, metrics: Arc<Metrics>) -> ProcessOrchestrator {
        let locator = ExecutableLocator::new(
            RuntimeMode::Packaged,
            self.bin_dir.clone(),
            self.bin_dir.clone(),
            TOOL_NAME,
        );
        ProcessOrchestrator::new(locator, metrics)
    }
}

fn request(input: &Utf8Path) -> ProcessingRequest {
    ProcessingRequest::new(input, ProcessingOptions::default())
}

/// Drain a handle, returning the relayed events and the terminal result
async fn collect(mut handle: RunHandle) -> (Vec<RunEvent>, ProcessingResult) {
    let mut events = Vec::new();

    while let Some(event) = timeout(Duration::from_secs(20), handle.recv())
        .await
        .expect("Timeout waiting for run event")
    {
        if let RunEvent::Completed(result) = event {
            assert!(
                handle.recv().await.is_none(),
                "Completed must be the last event"
            );
            return (events, result);
        }
        events.push(event);
    }

    panic!("Run ended without a Completed event");
}

fn joined(events: &[RunEvent], stderr: bool) -> String {
    events
        .iter()
        .filter_map(|event| match event {
            RunEvent::Progress(text) if !stderr => Some(text.as_str()),
            RunEvent::Error(text) if stderr => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_successful_run_discovers_artifacts() {
    let fixture = Fixture::with_tool(
        r#"base="${2%.*}"
echo "loaded $2"
printf 'total\n' > "${base}-summary.tsv"
printf 'row\n' > "${base}-cal.tsv"
echo "done"
"#,
    );
    let input = fixture.input("survey.csv");
    let metrics = Arc::new(Metrics::new());

    let handle = fixture
        .orchestrator(Arc::clone(&metrics))
        .submit(request(&input), RunControl::new());
    let (events, result) = collect(handle).await;

    assert!(result.success, "run failed: {:?}", result);
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.error_kind, None);
    assert_eq!(result.stdout, format!("loaded {}\ndone\n", input));
    assert_eq!(joined(&events, false), result.stdout);

    assert_eq!(
        result.output_files.summary.as_deref(),
        Some(fixture.dir.join("survey-summary.tsv").as_path())
    );
    assert_eq!(
        result.output_files.calculation.as_deref(),
        Some(fixture.dir.join("survey-cal.tsv").as_path())
    );

    assert_eq!(metrics.runs_started.load(Ordering::Relaxed), 1);
    assert_eq!(metrics.runs_succeeded.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_success_without_artifacts_is_still_success() {
    let fixture = Fixture::with_tool("echo nothing to write\n");
    let input = fixture.input("empty.tsv");

    let result = fixture
        .orchestrator(Arc::new(Metrics::new()))
        .run(request(&input), RunControl::new())
        .await;

    assert!(result.success);
    assert!(result.output_files.is_empty());
}

#[tokio::test]
async fn test_only_present_artifact_is_reported() {
    let fixture = Fixture::with_tool(
        r#"base="${2%.*}"
printf 'total\n' > "${base}-summary.tsv"
"#,
    );
    let input = fixture.input("partial.csv");

    let result = fixture
        .orchestrator(Arc::new(Metrics::new()))
        .run(request(&input), RunControl::new())
        .await;

    assert!(result.success);
    assert!(result.output_files.summary.is_some());
    assert!(result.output_files.calculation.is_none());
}

#[tokio::test]
async fn test_non_zero_exit_keeps_both_buffers() {
    let fixture = Fixture::with_tool(
        r#"echo "parsing"
echo "bad header" >&2
exit 2
"#,
    );
    let input = fixture.input("broken.csv");
    let metrics = Arc::new(Metrics::new());

    let handle = fixture
        .orchestrator(Arc::clone(&metrics))
        .submit(request(&input), RunControl::new());
    let (events, result) = collect(handle).await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::NonZeroExit));
    assert_eq!(result.exit_code, Some(2));
    assert_eq!(result.stdout, "parsing\n");
    assert_eq!(result.stderr, "bad header\n");
    assert_eq!(joined(&events, true), "bad header\n");
    assert!(result.output_files.is_empty());
    assert_eq!(metrics.runs_failed.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_output_kept_when_grandchild_holds_pipes() {
    let fixture = Fixture::with_tool(
        r#"echo hello
echo oops >&2
sleep 30 &
echo $! > "$(dirname "$2")/sleeper.pid"
exit 2
"#,
    );
    let input = fixture.input("detached.csv");
    let started = std::time::Instant::now();

    let handle = fixture
        .orchestrator(Arc::new(Metrics::new()))
        .submit(request(&input), RunControl::new());
    let (events, result) = collect(handle).await;
    let elapsed = started.elapsed();

    if let Ok(pid) = std::fs::read_to_string(fixture.dir.join("sleeper.pid")) {
        let _ = std::process::Command::new("kill").arg(pid.trim()).status();
    }

    assert_eq!(result.error_kind, Some(ErrorKind::NonZeroExit));
    assert_eq!(result.exit_code, Some(2));
    assert_eq!(result.stdout, "hello\n");
    assert_eq!(result.stderr, "oops\n");
    assert_eq!(joined(&events, false), result.stdout);
    assert_eq!(joined(&events, true), result.stderr);
    // Both pipes share one grace period
    assert!(elapsed < Duration::from_secs(9), "finalizing took {:?}", elapsed);
}

#[tokio::test]
async fn test_signal_exit_is_process_error() {
    let fixture = Fixture::with_tool(
        r#"echo "starting"
kill -9 $$
"#,
    );
    let input = fixture.input("crash.csv");

    let handle = fixture
        .orchestrator(Arc::new(Metrics::new()))
        .submit(request(&input), RunControl::new());
    let (_, result) = collect(handle).await;

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::ProcessError));
    assert_eq!(result.exit_code, None);
    assert_eq!(result.stdout, "starting\n");
    assert!(
        result
            .error_message
            .as_deref()
            .is_some_and(|m| m.contains("terminated abnormally")),
        "unexpected message: {:?}",
        result.error_message
    );
}

#[tokio::test]
async fn test_tool_runs_in_input_directory() {
    // Artifacts are written relative to the working directory
    let fixture = Fixture::with_tool(
        r#"pwd
stem="$(basename "${2%.*}")"
printf 'total\n' > "${stem}-summary.tsv"
"#,
    );
    let input = fixture.input("relative.csv");

    let result = fixture
        .orchestrator(Arc::new(Metrics::new()))
        .run(request(&input), RunControl::new())
        .await;

    assert!(result.success, "run failed: {:?}", result);
    let reported = std::fs::canonicalize(result.stdout.trim()).unwrap();
    assert_eq!(reported, std::fs::canonicalize(&fixture.dir).unwrap());
    assert_eq!(
        result.output_files.summary,
        Some(fixture.dir.join("relative-summary.tsv"))
    );
    assert_eq!(result.output_files.calculation, None);
}

#[tokio::test]
async fn test_arguments_follow_options() {
    let fixture = Fixture::with_tool(r#"echo "$@""#);
    let input = fixture.input("args.csv");
    let options = ProcessingOptions {
        use_area: true,
        std_name: "GB50010".to_string(),
        use_gbk: true,
        dev_mode: true,
    };

    let result = fixture
        .orchestrator(Arc::new(Metrics::new()))
        .run(ProcessingRequest::new(input.clone(), options), RunControl::new())
        .await;

    assert_eq!(
        result.stdout,
        format!("-i {} -Area -STD GB50010 -GBK -dev\n", input)
    );
}

#[tokio::test]
async fn test_chunks_arrive_in_order_while_running() {
    let fixture = Fixture::with_tool(
        r#"echo "step 1"
sleep 0.2
echo "step 2"
sleep 0.2
echo "step 3"
"#,
    );
    let input = fixture.input("slow.csv");

    let mut handle = fixture
        .orchestrator(Arc::new(Metrics::new()))
        .submit(request(&input), RunControl::new());

    // The first chunk is relayed before the tool has finished
    let first = timeout(Duration::from_secs(5), handle.recv())
        .await
        .expect("Timeout waiting for first chunk")
        .unwrap();
    assert_eq!(first, RunEvent::Progress("step 1\n".to_string()));

    let (mut events, result) = collect(handle).await;
    events.insert(0, first);

    assert_eq!(joined(&events, false), "step 1\nstep 2\nstep 3\n");
    assert_eq!(result.stdout, "step 1\nstep 2\nstep 3\n");
}

#[tokio::test]
async fn test_missing_executable() {
    let fixture = Fixture::without_tool();
    let input = fixture.input("data.csv");

    let handle = fixture
        .orchestrator(Arc::new(Metrics::new()))
        .submit(request(&input), RunControl::new());
    let (events, result) = collect(handle).await;

    assert!(events.is_empty());
    assert_eq!(result.error_kind, Some(ErrorKind::ExecutableNotFound));
    assert!(
        result
            .error_message
            .as_deref()
            .unwrap()
            .contains(fixture.bin_dir.join(TOOL_NAME).as_str())
    );
}

#[tokio::test]
async fn test_non_executable_file_fails_to_launch() {
    let fixture = Fixture::without_tool();
    std::fs::write(fixture.bin_dir.join(TOOL_NAME), "not a program").unwrap();
    let input = fixture.input("data.csv");

    let result = fixture
        .orchestrator(Arc::new(Metrics::new()))
        .run(request(&input), RunControl::new())
        .await;

    assert_eq!(result.error_kind, Some(ErrorKind::LaunchFailed));
    assert!(result.exit_code.is_none());
}

#[tokio::test]
async fn test_cancel_kills_tool() {
    let fixture = Fixture::with_tool(
        r#"echo "started"
exec sleep 30
"#,
    );
    let input = fixture.input("long.csv");
    let metrics = Arc::new(Metrics::new());
    let (cancel_tx, cancel_rx) = watch::channel(false);

    let mut handle = fixture
        .orchestrator(Arc::clone(&metrics))
        .submit(request(&input), RunControl::new().with_cancel(cancel_rx));

    let first = timeout(Duration::from_secs(5), handle.recv())
        .await
        .expect("Timeout waiting for tool to start")
        .unwrap();
    assert_eq!(first, RunEvent::Progress("started\n".to_string()));

    cancel_tx.send_replace(true);

    let result = timeout(Duration::from_secs(10), handle.wait())
        .await
        .expect("Cancelled run did not finish");

    assert!(!result.success);
    assert_eq!(result.error_kind, Some(ErrorKind::Cancelled));
    assert_eq!(result.stdout, "started\n");
    assert_eq!(metrics.runs_cancelled.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn test_timeout_kills_tool() {
    let fixture = Fixture::with_tool("exec sleep 30\n");
    let input = fixture.input("stuck.csv");

    let result = timeout(
        Duration::from_secs(10),
        fixture.orchestrator(Arc::new(Metrics::new())).run(
            request(&input),
            RunControl::new().with_timeout(Some(Duration::from_millis(300))),
        ),
    )
    .await
    .expect("Timed-out run did not finish");

    assert_eq!(result.error_kind, Some(ErrorKind::TimedOut));
    assert!(result.duration >= Duration::from_millis(300));
}

#[tokio::test]
async fn test_concurrent_runs_are_isolated() {
    let fixture = Fixture::with_tool(
        r#"name=$(basename "$2")
for i in 1 2 3; do
    echo "$name $i"
    sleep 0.05
done
"#,
    );
    let first_input = fixture.input("first.csv");
    let second_input = fixture.input("second.csv");
    let orchestrator = fixture.orchestrator(Arc::new(Metrics::new()));

    let first = orchestrator.submit(request(&first_input), RunControl::new());
    let second = orchestrator.submit(request(&second_input), RunControl::new());
    assert_ne!(first.run_id(), second.run_id());

    let ((first_events, first_result), (second_events, second_result)) =
        tokio::join!(collect(first), collect(second));

    assert_eq!(joined(&first_events, false), "first.csv 1\nfirst.csv 2\nfirst.csv 3\n");
    assert_eq!(joined(&second_events, false), "second.csv 1\nsecond.csv 2\nsecond.csv 3\n");
    assert_eq!(first_result.stdout, joined(&first_events, false));
    assert_eq!(second_result.stdout, joined(&second_events, false));
}

#[tokio::test]
async fn test_late_observer_gets_no_backlog() {
    let fixture = Fixture::with_tool(
        r#"echo "early"
sleep 0.3
echo "late"
"#,
    );
    let input = fixture.input("observed.csv");

    let mut handle = fixture
        .orchestrator(Arc::new(Metrics::new()))
        .submit(request(&input), RunControl::new());

    let first = handle.recv().await.unwrap();
    assert_eq!(first, RunEvent::Progress("early\n".to_string()));

    let mut late = handle.subscribe();
    let event = timeout(Duration::from_secs(5), late.recv())
        .await
        .expect("Timeout on late observer")
        .unwrap();
    assert_eq!(event, RunEvent::Progress("late\n".to_string()));

    let result = handle.wait().await;
    assert!(result.success);
}
