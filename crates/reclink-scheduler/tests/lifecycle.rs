//! End-to-end scheduler scenarios driving `/bin/sh` as the capture binary.
#![cfg(unix)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use reclink_capture::CaptureSettings;
use reclink_core::{Recording, RecordingId, RecordingStatus, RetentionPolicy, StreamInfo, Target};
use reclink_platforms::{PlatformProvider, PlatformRegistry};
use reclink_scheduler::{CheckOutcome, SchedulerSettings, SchedulerSupervisor};
use reclink_store::{LifecycleRepository, SqliteRepository};

/// `sh -c <script> capture --output <path> <url> <quality>`: the script sees
/// the output path as `$2`.
struct ShellPlatform {
    script: &'static str,
    live: AtomicBool,
    checks: AtomicUsize,
}

#[async_trait]
impl PlatformProvider for ShellPlatform {
    fn name(&self) -> &str {
        "shell"
    }

    fn stream_url(&self, id: &str) -> String {
        format!("shell://{id}")
    }

    async fn get_stream_info(&self, id: &str) -> reclink_platforms::Result<Option<StreamInfo>> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        if !self.live.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let mut info = StreamInfo::live(id, "Shell Streamer");
        info.title = Some("integration run".into());
        Ok(Some(info))
    }

    fn build_capture_args(&self, _id: &str, _quality: &str) -> Vec<String> {
        vec!["-c".into(), self.script.into(), "capture".into()]
    }

    fn capture_program(&self) -> Option<&str> {
        Some("sh")
    }
}

struct Harness {
    repo: Arc<SqliteRepository>,
    platform: Arc<ShellPlatform>,
    scheduler: SchedulerSupervisor,
    dir: tempfile::TempDir,
}

fn harness(script: &'static str) -> Harness {
    harness_polling(script, Duration::from_secs(3600))
}

fn harness_polling(script: &'static str, poll_interval: Duration) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let repo = Arc::new(SqliteRepository::open_in_memory().unwrap());
    let platform = Arc::new(ShellPlatform {
        script,
        live: AtomicBool::new(true),
        checks: AtomicUsize::new(0),
    });
    let mut platforms = PlatformRegistry::new();
    platforms.register(platform.clone());

    let settings = SchedulerSettings {
        recordings_dir: dir.path().join("recordings"),
        poll_interval,
        rotation_interval: Duration::from_secs(3600),
        size_refresh: Duration::from_secs(3600),
        capture: CaptureSettings {
            binary: "unused".into(),
            stop_grace: Duration::from_secs(2),
            tail_lines: 10,
            extra_args: Vec::new(),
        },
    };
    let scheduler = SchedulerSupervisor::new(repo.clone(), Arc::new(platforms), settings);
    Harness {
        repo,
        platform,
        scheduler,
        dir,
    }
}

impl Harness {
    /// Liveness lookups so far, after letting in-flight monitors settle.
    async fn checks_after(&self, settle: Duration) -> usize {
        tokio::time::sleep(settle).await;
        self.platform.checks.load(Ordering::SeqCst)
    }

    async fn add_target(&self) -> Target {
        self.scheduler
            .upsert_target(Target::new("shell", "chan", "Chan"))
            .await
            .unwrap()
    }

    async fn wait_for(&self, id: &RecordingId, done: impl Fn(&Recording) -> bool) -> Recording {
        for _ in 0..200 {
            if let Some(rec) = self.repo.get_recording(id).unwrap() {
                if done(&rec) && !self.scheduler.capture().is_watching(id).await {
                    return rec;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("recording {id} did not settle");
    }

    async fn wait_for_active(&self, target: &Target) -> Recording {
        for _ in 0..200 {
            if let Some(rec) = self.repo.active_recording(&target.id).unwrap() {
                if rec.status == RecordingStatus::Recording {
                    return rec;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("no recording started for {}", target.id);
    }
}

fn started(outcome: CheckOutcome) -> RecordingId {
    match outcome {
        CheckOutcome::Started(id) => id,
        other => panic!("expected a started capture, got {other:?}"),
    }
}

#[tokio::test]
async fn live_target_records_to_completion() {
    let h = harness(r#"printf 'media-bytes' > "$2"; sleep 1; exit 0"#);
    let target = h.add_target().await;

    let id = started(h.scheduler.trigger_check_now(&target.id).await.unwrap());
    let running = h.repo.get_recording(&id).unwrap().unwrap();
    assert_eq!(running.status, RecordingStatus::Recording);
    assert!(running.start_time.is_some());

    let done = h
        .wait_for(&id, |r| r.status == RecordingStatus::Completed)
        .await;
    let (start, end) = (done.start_time.unwrap(), done.end_time.unwrap());
    assert_eq!(done.duration, Some((end - start).num_seconds()));
    assert_eq!(done.file_size, 11);
    assert!(done.file_path.starts_with(h.dir.path().join("recordings").join("shell")));
    assert_eq!(done.streamer_name, "Shell Streamer");
    assert_eq!(done.target_id.as_ref(), Some(&target.id));
}

#[tokio::test]
async fn failing_capture_keeps_diagnostics() {
    let h = harness("echo 'stream ended' >&2; exit 1");
    let target = h.add_target().await;

    let id = started(h.scheduler.trigger_check_now(&target.id).await.unwrap());
    let failed = h.wait_for(&id, |r| r.status == RecordingStatus::Failed).await;
    let message = failed.error_message.unwrap();
    assert!(message.contains("stream ended"), "{message}");
    assert!(message.contains('1'), "{message}");

    // A failed capture does not block the next attempt.
    h.platform.live.store(false, Ordering::SeqCst);
    assert_eq!(
        h.scheduler.trigger_check_now(&target.id).await.unwrap(),
        CheckOutcome::Offline
    );
}

#[tokio::test]
async fn one_active_recording_per_target() {
    let h = harness("trap 'exit 130' INT; while true; do sleep 0.1; done");
    let target = h.add_target().await;

    let id = started(h.scheduler.trigger_check_now(&target.id).await.unwrap());
    assert_eq!(
        h.scheduler.trigger_check_now(&target.id).await.unwrap(),
        CheckOutcome::AlreadyRecording
    );
    assert_eq!(h.scheduler.active_recordings().unwrap().len(), 1);

    assert_eq!(h.scheduler.stop_all_recordings().await.unwrap(), 1);
    let stopped = h.repo.get_recording(&id).unwrap().unwrap();
    assert_eq!(stopped.status, RecordingStatus::Completed);
    assert!(stopped.end_time.is_some());
}

#[tokio::test]
async fn disabling_a_target_stops_its_capture() {
    let h = harness(r#"trap 'exit 130' INT; printf 'x' > "$2"; while true; do sleep 0.1; done"#);
    let target = h.add_target().await;
    h.scheduler.start().await.unwrap();

    let rec = h.wait_for_active(&target).await;
    assert!(h.scheduler.info().await.active_monitor_count >= 1);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let mut disabled = target.clone();
    disabled.enabled = false;
    h.scheduler.upsert_target(disabled).await.unwrap();

    let done = h
        .wait_for(&rec.id, |r| r.status == RecordingStatus::Completed)
        .await;
    assert_eq!(done.file_size, 1);
    assert_eq!(h.scheduler.info().await.active_monitor_count, 0);
    h.scheduler.stop().await;
}

#[tokio::test]
async fn editing_a_target_hands_over_the_capture() {
    let h = harness("trap 'exit 130' INT; while true; do sleep 0.1; done");
    let target = h.add_target().await;
    h.scheduler.start().await.unwrap();
    let rec = h.wait_for_active(&target).await;

    let mut edited = target.clone();
    edited.display_name = "Renamed".into();
    h.scheduler.upsert_target(edited).await.unwrap();
    assert!(h.scheduler.capture().is_watching(&rec.id).await);

    h.scheduler.stop().await;
    let done = h.repo.get_recording(&rec.id).unwrap().unwrap();
    assert_eq!(done.status, RecordingStatus::Completed);
}

#[tokio::test]
async fn removing_a_target_orphans_its_recordings() {
    let h = harness("trap 'exit 130' INT; while true; do sleep 0.1; done");
    let target = h.add_target().await;
    let id = started(h.scheduler.trigger_check_now(&target.id).await.unwrap());

    h.scheduler.remove_target(&target.id).await.unwrap();
    let orphan = h.repo.get_recording(&id).unwrap().unwrap();
    assert_eq!(orphan.status, RecordingStatus::Completed);
    assert!(orphan.target_id.is_none());
    assert!(h.scheduler.targets().unwrap().is_empty());
}

#[tokio::test]
async fn startup_recovers_interrupted_recordings() {
    let h = harness("exit 0");
    h.platform.live.store(false, Ordering::SeqCst);
    let target = h.add_target().await;

    let dir = h.dir.path().join("recordings").join("shell");
    std::fs::create_dir_all(&dir).unwrap();
    let file = dir.join("left-over.mp4");
    std::fs::write(&file, vec![7u8; 2048]).unwrap();
    let mut interrupted = Recording::pending(&target, "Chan", file);
    interrupted.mark_recording(Utc::now()).unwrap();
    h.repo.create_recording(&interrupted).unwrap();

    h.scheduler.start().await.unwrap();
    let recovered = h.repo.get_recording(&interrupted.id).unwrap().unwrap();
    assert_eq!(recovered.status, RecordingStatus::Completed);
    assert_eq!(recovered.file_size, 2048);
    assert!(recovered.end_time.is_some());
    h.scheduler.stop().await;
}

#[tokio::test]
async fn rotation_cleanup_honours_favorites() {
    let h = harness("exit 0");
    let mut target = Target::new("shell", "chan", "Chan");
    target.policy = RetentionPolicy::by_count(3);
    let target = h.scheduler.upsert_target(target).await.unwrap();

    let dir = h.dir.path();
    let mut recs = Vec::new();
    for i in 0..5 {
        let file = dir.join(format!("{i}.mp4"));
        std::fs::write(&file, b"data").unwrap();
        let mut rec = Recording::pending(&target, "Chan", file);
        rec.created_at = Utc::now() - chrono::Duration::minutes(i);
        rec.complete(Utc::now()).unwrap();
        rec.file_size = 4;
        h.repo.create_recording(&rec).unwrap();
        recs.push(rec);
    }
    h.scheduler.set_favorite(&recs[3].id, true).unwrap();
    h.scheduler.set_favorite(&recs[4].id, true).unwrap();

    let report = h.scheduler.run_rotation_cleanup().await;
    assert_eq!(report.deleted, 0);

    h.scheduler.set_favorite(&recs[4].id, false).unwrap();
    let report = h.scheduler.run_rotation_cleanup().await;
    assert_eq!(report.deleted, 1);
    assert!(!Path::new(&recs[4].file_path).exists());
    assert!(recs[3].file_path.exists());

    let again = h.scheduler.run_rotation_cleanup().await;
    assert_eq!(again.deleted, 0);
}

#[tokio::test]
async fn concurrent_edits_leave_one_monitor() {
    let h = harness_polling("exit 0", Duration::from_millis(20));
    h.platform.live.store(false, Ordering::SeqCst);
    let target = h.add_target().await;
    h.scheduler.start().await.unwrap();

    let (a, b) = tokio::join!(
        h.scheduler.upsert_target(target.clone()),
        h.scheduler.upsert_target(target.clone())
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(h.scheduler.info().await.active_monitor_count, 1);

    h.scheduler.stop().await;
    let at_stop = h.checks_after(Duration::ZERO).await;
    let later = h.checks_after(Duration::from_millis(300)).await;
    assert_eq!(at_stop, later, "a monitor kept polling after stop");
}

#[tokio::test]
async fn edit_racing_stop_leaves_nothing_polling() {
    let h = harness_polling("exit 0", Duration::from_millis(20));
    h.platform.live.store(false, Ordering::SeqCst);
    let target = h.add_target().await;
    h.scheduler.start().await.unwrap();

    let (_, edited) = tokio::join!(h.scheduler.stop(), h.scheduler.upsert_target(target.clone()));
    edited.unwrap();
    assert!(!h.scheduler.is_running());
    assert_eq!(h.scheduler.info().await.active_monitor_count, 0);

    let at_stop = h.checks_after(Duration::ZERO).await;
    let later = h.checks_after(Duration::from_millis(300)).await;
    assert_eq!(at_stop, later, "a monitor kept polling after stop");
}

#[tokio::test]
async fn stop_completes_every_capture() {
    let h = harness(r#"trap 'exit 130' INT; printf 'x' > "$2"; while true; do sleep 0.1; done"#);
    let first = h.add_target().await;
    let second = h
        .scheduler
        .upsert_target(Target::new("shell", "other", "Other"))
        .await
        .unwrap();
    h.scheduler.start().await.unwrap();
    let recs = [h.wait_for_active(&first).await, h.wait_for_active(&second).await];
    tokio::time::sleep(Duration::from_millis(300)).await;

    h.scheduler.stop().await;
    assert_eq!(h.scheduler.capture().active_count().await, 0);
    assert!(h.scheduler.active_recordings().unwrap().is_empty());
    for rec in &recs {
        let done = h.repo.get_recording(&rec.id).unwrap().unwrap();
        assert_eq!(done.status, RecordingStatus::Completed);
        assert!(done.end_time.is_some());
        assert_eq!(done.file_size, 1);
    }
}
