//! Integration tests for the workflow engine
//!
//! These run real child processes through `sh -c`.

use jobflow::{
    Captured, Interrupt, Job, JobError, OutputParser, OutputSink, RefinementParser, Settings, Workflow,
    WorkflowState,
};
use tempfile::TempDir;

fn workflow(temp: &TempDir) -> Workflow {
    Workflow::new(temp.path().join("out"))
        .expect("Failed to create workflow")
        .with_sink(OutputSink::null())
        .with_interrupt(Interrupt::Never)
}

fn sh(script: &str) -> Job {
    Job::new("sh").args(["-c", script])
}

// =============================================================================
// Run outcomes
// =============================================================================

#[tokio::test]
async fn test_refinement_parser_final_summary() {
    let temp = TempDir::new().unwrap();
    let mut wf = workflow(&temp);

    let job = sh("printf 'Free R factor        =  0.2345\\nOverall R factor      =  0.1987\\n'")
        .with_parser(OutputParser::Refinement(RefinementParser::new(10)));
    let job = wf.run_job(job).await.expect("job should succeed");

    assert_eq!(
        job.summarize().unwrap(),
        "cycle  0/10   R-free / R = 0.2345 / 0.1987"
    );
    assert_eq!(job.exit_code, Some(0));
    assert_eq!(
        job.out,
        Captured::Lines(vec![
            "Free R factor        =  0.2345\n".to_string(),
            "Overall R factor      =  0.1987\n".to_string(),
        ])
    );
}

#[tokio::test]
async fn test_missing_program_is_launch_error() {
    let temp = TempDir::new().unwrap();
    let mut wf = workflow(&temp);

    let err = wf.run_job(Job::new("/nonexistent/prog")).await.unwrap_err();

    assert!(matches!(err, JobError::Launch { ref program } if program == "/nonexistent/prog"));
    assert_eq!(wf.jobs().len(), 1);
    let attempt = wf.job(1).unwrap();
    assert!(attempt.elapsed_secs.is_none());
    assert!(attempt.out.is_empty());
}

#[tokio::test]
async fn test_non_zero_exit_carries_command_and_stderr() {
    let temp = TempDir::new().unwrap();
    let mut wf = workflow(&temp);

    let err = wf.run_job(sh("echo boom >&2; exit 1")).await.unwrap_err();

    match &err {
        JobError::NonZeroExit { code, note, .. } => {
            assert_eq!(*code, Some(1));
            assert!(note.contains("\"sh\" \"-c\" \"echo boom >&2; exit 1\""));
            assert!(note.contains("boom"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
    let job = wf.job(1).unwrap();
    assert!(job.elapsed_secs.is_some());
    assert_eq!(job.exit_code, Some(1));
    assert!(wf.output_dir().join("01-sh.err").exists());
}

#[tokio::test]
async fn test_large_stdout_noted_on_failure() {
    let temp = TempDir::new().unwrap();
    let mut wf = workflow(&temp);

    let err = wf.run_job(sh("seq 1 100; exit 3")).await.unwrap_err();

    let note = err.note().unwrap();
    assert!(note.contains("stdout -> "));
    assert!(note.contains("01-sh.log"));
}

#[tokio::test]
async fn test_elapsed_set_only_after_exit() {
    let temp = TempDir::new().unwrap();
    let mut wf = workflow(&temp);

    let job = wf.run_job(sh("sleep 0.1")).await.unwrap();
    let started = job.started_at.unwrap();
    let elapsed = job.elapsed_secs.unwrap();
    assert!(elapsed >= 0.1);
    assert!(started <= chrono::Utc::now());
}

#[tokio::test]
async fn test_large_output_is_not_deadlocked() {
    let temp = TempDir::new().unwrap();
    let mut wf = workflow(&temp);

    // more than a pipe buffer on both streams
    let job = wf
        .run_job(sh("seq 1 50000; seq 1 50000 >&2"))
        .await
        .unwrap();

    assert!(matches!(job.out, Captured::Logged { .. }));
    let log = std::fs::read_to_string(wf.output_dir().join("01-sh.log")).unwrap();
    assert_eq!(log.lines().count(), 50000);
    let err = std::fs::read_to_string(wf.output_dir().join("01-sh.err")).unwrap();
    assert_eq!(err.lines().last(), Some("50000"));
}

// =============================================================================
// Materialization
// =============================================================================

#[tokio::test]
async fn test_inline_threshold() {
    let temp = TempDir::new().unwrap();
    let mut wf = workflow(&temp);

    let short = wf.run_job(sh("echo short")).await.unwrap();
    assert_eq!(short.out, Captured::Text("short\n".to_string()));

    let long = wf.run_job(sh("printf '%060d\\n' 0")).await.unwrap();
    assert_eq!(
        long.out,
        Captured::Logged {
            file: "02-sh.log".to_string(),
            size: "0.1kB".to_string()
        }
    );

    let parsed = wf
        .run_job(sh("seq 1 5").with_parser(OutputParser::Refinement(RefinementParser::new(1))))
        .await
        .unwrap();
    assert!(matches!(parsed.out, Captured::Lines(ref l) if l.len() == 5));

    let parsed_long = wf
        .run_job(sh("seq 1 6").with_parser(OutputParser::Refinement(RefinementParser::new(1))))
        .await
        .unwrap();
    assert!(matches!(parsed_long.out, Captured::Logged { .. }));
}

#[tokio::test]
async fn test_custom_limits() {
    let temp = TempDir::new().unwrap();
    let settings = Settings {
        max_inline_chars: 1000,
        ..Settings::default()
    };
    let mut wf = workflow(&temp).with_settings(settings);

    let job = wf.run_job(sh("printf '%060d\\n' 0")).await.unwrap();
    assert!(matches!(job.out, Captured::Text(_)));
}

// =============================================================================
// Persistence
// =============================================================================

#[tokio::test]
async fn test_state_round_trip() {
    let temp = TempDir::new().unwrap();
    let mut wf = workflow(&temp);

    wf.run_job(sh("echo one")).await.unwrap();
    wf.run_job(
        sh("echo 'Free R factor = 0.3'; seq 1 10")
            .with_parser(OutputParser::Refinement(RefinementParser::new(4))),
    )
    .await
    .unwrap();
    let _ = wf.run_job(sh("echo bad >&2; false")).await;
    let path = wf.save_state().unwrap();
    assert_eq!(path, wf.output_dir().join("workflow.json"));

    let restored = Workflow::open(wf.output_dir(), Settings::default()).unwrap();
    assert_eq!(restored.output_dir(), wf.output_dir());
    assert_eq!(restored.jobs().len(), 3);
    for (a, b) in wf.jobs().iter().zip(restored.jobs()) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.args, b.args);
        assert_eq!(a.out, b.out);
        assert_eq!(a.err, b.err);
        assert_eq!(a.started_at, b.started_at);
        assert_eq!(a.elapsed_secs, b.elapsed_secs);
        assert_eq!(a.parser, b.parser);
        assert_eq!(a.summarize(), b.summarize());
    }

    let from_file = Workflow::open(&path, Settings::default()).unwrap();
    assert_eq!(from_file.jobs().len(), 3);
}

#[test]
fn test_state_floats_are_exact() {
    let temp = TempDir::new().unwrap();
    let output_dir = temp.path().to_path_buf();
    let jobs: Vec<Job> = [985.6906946328695, 0.1 + 0.2, 1e-7, 12345.678901234567]
        .into_iter()
        .map(|secs| {
            let mut job = Job::new("true").with_parser(OutputParser::Refinement(RefinementParser::new(3)));
            job.elapsed_secs = Some(secs);
            if let Some(OutputParser::Refinement(p)) = job.parser.as_mut() {
                p.free_r = secs / 3.0;
                p.overall_r = secs / 7.0;
            }
            job
        })
        .collect();
    let path = output_dir.join("workflow.json");
    WorkflowState::new(output_dir, jobs.clone()).save(&path).unwrap();

    let back = WorkflowState::load(&path).unwrap();
    for (a, b) in jobs.iter().zip(&back.jobs) {
        assert_eq!(a.elapsed_secs, b.elapsed_secs);
        assert_eq!(a.parser, b.parser);
    }
}

#[tokio::test]
async fn test_slash_in_name_does_not_break_logging() {
    let temp = TempDir::new().unwrap();
    let mut wf = workflow(&temp);

    let job = wf.run_job(sh("echo hi").named("stage 1/2")).await.unwrap();
    assert_eq!(job.exit_code, Some(0));
    assert!(wf.output_dir().join("01-stage_1_2.log").exists());

    let err = wf
        .run_job(sh("echo boom >&2; exit 1").named("stage 2/2"))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::NonZeroExit { .. }));
    assert!(wf.output_dir().join("02-stage_2_2.err").exists());
}

#[tokio::test]
async fn test_empty_workflow_round_trip() {
    let temp = TempDir::new().unwrap();
    let wf = workflow(&temp);
    wf.save_state().unwrap();

    let restored = Workflow::open(wf.output_dir(), Settings::default()).unwrap();
    assert!(restored.jobs().is_empty());
    assert_eq!(restored.to_string(), wf.to_string());
}

#[tokio::test]
async fn test_job_run_delegates_to_workflow() {
    let temp = TempDir::new().unwrap();
    let mut wf = workflow(&temp);

    let job = Job::new("echo").arg("via job").run(&mut wf).await.unwrap();
    assert_eq!(job.out, Captured::Text("via job\n".to_string()));
    assert_eq!(wf.jobs().len(), 1);
}
