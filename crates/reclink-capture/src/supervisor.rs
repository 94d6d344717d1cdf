use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::future::join_all;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use reclink_core::config::CaptureConfig;
use reclink_core::{Recording, RecordingId, Target, TargetId};
use reclink_platforms::PlatformRegistry;
use reclink_store::LifecycleRepository;

use crate::error::{CaptureError, Result};
use crate::exit::{classify, ExitClass};
use crate::tail::{drain, OutputTail, StreamKind};

/// How long the watcher waits for drain tasks once the process is gone.
const DRAIN_JOIN_TIMEOUT: Duration = Duration::from_secs(2);
/// Extra time `stop` allows on top of the grace period before abandoning the
/// watcher.
const STOP_SLACK: Duration = Duration::from_secs(5);

/// Invocation parameters shared by every capture.
#[derive(Debug, Clone)]
pub struct CaptureSettings {
    pub binary: String,
    pub stop_grace: Duration,
    pub tail_lines: usize,
    pub extra_args: Vec<String>,
}

impl CaptureSettings {
    pub fn from_config(config: &CaptureConfig) -> Self {
        Self {
            binary: resolve_binary(&config.binary),
            stop_grace: Duration::from_secs(config.stop_grace_secs),
            tail_lines: config.tail_lines,
            extra_args: config.extra_args.clone(),
        }
    }
}

/// Resolve a bare program name on `PATH`; explicit paths are kept as-is.
/// Falls back to the name itself so a later spawn reports the real error.
pub fn resolve_binary(binary: &str) -> String {
    if Path::new(binary).components().count() > 1 {
        return binary.to_string();
    }
    match which::which(binary) {
        Ok(path) => path.display().to_string(),
        Err(e) => {
            warn!(%binary, "capture binary not found on PATH: {e}");
            binary.to_string()
        }
    }
}

struct ActiveCapture {
    target_id: Option<TargetId>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
    pid: Option<u32>,
}

struct Inner {
    repo: Arc<dyn LifecycleRepository>,
    platforms: Arc<PlatformRegistry>,
    settings: CaptureSettings,
    active: Mutex<HashMap<RecordingId, ActiveCapture>>,
}

enum Outcome {
    Exited(io::Result<ExitStatus>),
    Stopped(io::Result<ExitStatus>),
}

/// Starts, watches and stops capture processes. Cheap to clone.
#[derive(Clone)]
pub struct CaptureSupervisor {
    inner: Arc<Inner>,
}

impl CaptureSupervisor {
    pub fn new(
        repo: Arc<dyn LifecycleRepository>,
        platforms: Arc<PlatformRegistry>,
        settings: CaptureSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                repo,
                platforms,
                settings,
                active: Mutex::new(HashMap::new()),
            }),
        }
    }

    // -----------------------------------------------------------------------
    // Start
    // -----------------------------------------------------------------------

    /// Launch the capture process for a persisted `pending` recording.
    ///
    /// Returns `Ok(true)` once the process is running and the recording is
    /// `recording`. Returns `Ok(false)` if it could not be launched; the
    /// recording is then `failed` with the cause as its error message.
    ///
    /// # Errors
    ///
    /// Persistence or state-machine errors. A process launched before such an
    /// error is killed.
    pub async fn start(&self, mut recording: Recording, target: &Target) -> Result<bool> {
        let Some(provider) = self.inner.platforms.get(&target.platform) else {
            self.fail_unlaunched(
                recording,
                format!("no provider registered for platform {}", target.platform),
            )?;
            return Ok(false);
        };

        if let Some(dir) = recording.file_path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(dir).await {
                let message = format!("cannot create output directory {}: {e}", dir.display());
                self.fail_unlaunched(recording, message)?;
                return Ok(false);
            }
        }

        let settings = &self.inner.settings;
        let program = provider
            .capture_program()
            .map(String::from)
            .unwrap_or_else(|| settings.binary.clone());
        let mut args = provider.build_capture_args(&target.broadcaster_id, &target.quality);
        args.extend(target.custom_arg_list());
        args.extend(settings.extra_args.iter().cloned());
        args.push("--output".to_string());
        args.push(recording.file_path.display().to_string());
        args.push(provider.stream_url(&target.broadcaster_id));
        args.push(target.quality.clone());

        // Held across spawn and insert so the watcher cannot deregister
        // before it is registered.
        let mut active = self.inner.active.lock().await;
        if active.contains_key(&recording.id) {
            return Ok(true);
        }

        let mut child = match spawn(&program, &args) {
            Ok(child) => child,
            Err(e) => {
                drop(active);
                self.fail_unlaunched(recording, format!("failed to launch {program}: {e}"))?;
                return Ok(false);
            }
        };
        let pid = child.id();

        if let Err(e) = self.persist_started(&mut recording) {
            drop(active);
            error!(recording_id = %recording.id, "could not persist recording state, killing capture: {e}");
            let _ = child.kill().await;
            self.discard_unpersisted(recording, &e);
            return Err(e);
        }

        let tail = OutputTail::new(settings.tail_lines);
        let label = recording.id.to_string();
        let mut drains = Vec::with_capacity(2);
        if let Some(stdout) = child.stdout.take() {
            drains.push(tokio::spawn(drain(stdout, StreamKind::Stdout, tail.clone(), label.clone())));
        }
        if let Some(stderr) = child.stderr.take() {
            drains.push(tokio::spawn(drain(stderr, StreamKind::Stderr, tail.clone(), label)));
        }

        let cancel = CancellationToken::new();
        let id = recording.id.clone();
        let target_id = recording.target_id.clone();
        info!(
            recording_id = %id,
            target_id = ?target_id.as_ref().map(TargetId::as_str),
            pid = ?pid,
            file = %recording.file_path.display(),
            "capture started"
        );

        let handle = tokio::spawn(watch(
            self.inner.clone(),
            child,
            recording,
            cancel.clone(),
            drains,
            tail,
        ));
        active.insert(
            id,
            ActiveCapture {
                target_id,
                cancel,
                handle,
                pid,
            },
        );
        Ok(true)
    }

    fn persist_started(&self, recording: &mut Recording) -> Result<()> {
        recording.mark_recording(Utc::now())?;
        self.inner.repo.update_recording(recording)?;
        Ok(())
    }

    /// Release the target after a failed `persist_started`: mark the row
    /// `failed`, or delete it when even that write fails. A row left `pending`
    /// would block every later check cycle for the target.
    fn discard_unpersisted(&self, recording: Recording, cause: &CaptureError) {
        let id = recording.id.clone();
        let message = format!("capture killed, recording state could not be saved: {cause}");
        if let Err(e) = self.fail_unlaunched(recording, message) {
            warn!(recording_id = %id, "could not mark recording failed, deleting row: {e}");
            if let Err(e) = self.inner.repo.delete_recording(&id) {
                error!(recording_id = %id, "could not delete unlaunched recording: {e}");
            }
        }
    }

    fn fail_unlaunched(&self, mut recording: Recording, message: String) -> Result<()> {
        warn!(recording_id = %recording.id, "{message}");
        recording.fail(message, Utc::now())?;
        self.inner.repo.update_recording(&recording)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Stop a recording: SIGINT, forced kill after the grace period, then
    /// `completed` with final size and duration.
    ///
    /// A recording with no live watcher (left over from an earlier process)
    /// is finalized directly if still active. Returns `false` only when the
    /// recording does not exist.
    pub async fn stop(&self, id: &RecordingId) -> Result<bool> {
        let entry = self.inner.active.lock().await.remove(id);
        if let Some(mut entry) = entry {
            debug!(recording_id = %id, pid = ?entry.pid, "stopping capture");
            entry.cancel.cancel();
            let bound = self.inner.settings.stop_grace + STOP_SLACK;
            match timeout(bound, &mut entry.handle).await {
                Ok(Ok(())) => return Ok(true),
                Ok(Err(e)) => error!(recording_id = %id, "capture watcher panicked: {e}"),
                Err(_) => {
                    warn!(recording_id = %id, "capture watcher did not finish in {bound:?}, aborting");
                    entry.handle.abort();
                }
            }
        }

        let Some(mut recording) = self.inner.repo.get_recording(id)? else {
            return Ok(false);
        };
        if recording.status.is_active() {
            finalize_completed(&mut recording)?;
            self.inner.repo.update_recording(&recording)?;
            info!(recording_id = %id, "unwatched recording marked completed");
        }
        Ok(true)
    }

    /// Stop every recording belonging to `target_id`. Returns how many were
    /// stopped.
    pub async fn stop_target(&self, target_id: &TargetId) -> Result<usize> {
        let ids: Vec<RecordingId> = {
            let active = self.inner.active.lock().await;
            active
                .iter()
                .filter(|(_, a)| a.target_id.as_ref() == Some(target_id))
                .map(|(id, _)| id.clone())
                .collect()
        };
        let mut stopped = 0;
        for id in &ids {
            if self.stop(id).await? {
                stopped += 1;
            }
        }
        // A pending row created by a check cycle that never got to launch.
        if let Some(orphan) = self.inner.repo.active_recording(target_id)? {
            if !self.is_watching(&orphan.id).await && self.stop(&orphan.id).await? {
                stopped += 1;
            }
        }
        Ok(stopped)
    }

    /// Stop every watched recording concurrently. Errors are logged.
    pub async fn stop_all(&self) -> usize {
        let ids = self.watched_ids().await;
        let results = join_all(ids.iter().map(|id| self.stop(id))).await;
        let mut stopped = 0;
        for (id, res) in ids.iter().zip(results) {
            match res {
                Ok(true) => stopped += 1,
                Ok(false) => {}
                Err(e) => error!(recording_id = %id, "failed to stop capture: {e}"),
            }
        }
        if stopped > 0 {
            info!(count = stopped, "all captures stopped");
        }
        stopped
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub async fn is_watching(&self, id: &RecordingId) -> bool {
        self.inner.active.lock().await.contains_key(id)
    }

    pub async fn watched_ids(&self) -> Vec<RecordingId> {
        self.inner.active.lock().await.keys().cloned().collect()
    }

    pub async fn active_count(&self) -> usize {
        self.inner.active.lock().await.len()
    }
}

/// The child gets its own process group so a terminal Ctrl-C aimed at the
/// daemon does not reach it before the supervisor decides to stop it.
fn spawn(program: &str, args: &[String]) -> io::Result<Child> {
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);
    cmd.spawn()
}

/// SIGINT, wait up to `grace`, then SIGKILL.
async fn terminate(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    let Some(pid) = child.id() else {
        // Already reaped.
        return child.wait().await;
    };

    #[cfg(unix)]
    {
        // Safety: `pid` is our direct child and has not been reaped yet.
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGINT);
        }
        match timeout(grace, child.wait()).await {
            Ok(status) => return status,
            Err(_) => warn!(pid, "capture ignored SIGINT for {grace:?}, killing"),
        }
    }
    #[cfg(not(unix))]
    let _ = (pid, grace);

    child.kill().await?;
    child.wait().await
}

async fn watch(
    inner: Arc<Inner>,
    mut child: Child,
    recording: Recording,
    cancel: CancellationToken,
    mut drains: Vec<JoinHandle<()>>,
    tail: OutputTail,
) {
    let exited = tokio::select! {
        status = child.wait() => Some(status),
        _ = cancel.cancelled() => None,
    };
    let outcome = match exited {
        Some(status) => Outcome::Exited(status),
        None => Outcome::Stopped(terminate(&mut child, inner.settings.stop_grace).await),
    };

    let joined = timeout(DRAIN_JOIN_TIMEOUT, async {
        for handle in drains.iter_mut() {
            let _ = handle.await;
        }
    })
    .await;
    if joined.is_err() {
        // Pipes held open by a grandchild.
        drains.iter().for_each(JoinHandle::abort);
    }

    if let Err(e) = finalize(&*inner.repo, &recording, outcome, &tail) {
        error!(recording_id = %recording.id, "failed to finalize recording: {e}");
    }
    inner.active.lock().await.remove(&recording.id);
}

fn finalize(
    repo: &dyn LifecycleRepository,
    started: &Recording,
    outcome: Outcome,
    tail: &OutputTail,
) -> Result<()> {
    // Re-read so concurrent edits (favorite flag) are not clobbered.
    let Some(mut recording) = repo.get_recording(&started.id)? else {
        warn!(recording_id = %started.id, "recording deleted while capturing");
        return Ok(());
    };
    if !recording.status.is_active() {
        debug!(recording_id = %recording.id, status = %recording.status, "already finalized");
        return Ok(());
    }

    let class = match outcome {
        Outcome::Stopped(Ok(_)) => ExitClass::Completed,
        Outcome::Stopped(Err(e)) => {
            warn!(recording_id = %recording.id, "error while stopping capture: {e}");
            ExitClass::Completed
        }
        Outcome::Exited(Ok(status)) => classify(status),
        Outcome::Exited(Err(e)) => ExitClass::Failed(format!("wait failed: {e}")),
    };

    match class {
        ExitClass::Completed => {
            finalize_completed(&mut recording)?;
            info!(
                recording_id = %recording.id,
                bytes = recording.file_size,
                duration_secs = ?recording.duration,
                "capture completed"
            );
        }
        ExitClass::Failed(cause) => {
            refresh_size(&mut recording);
            let message = tail.failure_message(&cause);
            warn!(recording_id = %recording.id, %cause, "capture failed");
            recording.fail(message, Utc::now())?;
        }
    }
    repo.update_recording(&recording)?;
    Ok(())
}

fn finalize_completed(recording: &mut Recording) -> Result<()> {
    refresh_size(recording);
    recording.complete(Utc::now())?;
    Ok(())
}

fn refresh_size(recording: &mut Recording) {
    if let Some(size) = size_of(&recording.file_path) {
        recording.file_size = size;
    }
}

fn size_of(path: &Path) -> Option<u64> {
    reclink_core::types::file_size_on_disk(path)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reclink_core::{RecordingStatus, StreamInfo};
    use reclink_platforms::PlatformProvider;
    use reclink_store::SqliteRepository;

    /// Runs `sh -c <script> capture --output <path> <url> <quality>`, so the
    /// script sees the output path as `$2`.
    struct ShellPlatform {
        script: &'static str,
    }

    #[async_trait]
    impl PlatformProvider for ShellPlatform {
        fn name(&self) -> &str {
            "shell"
        }
        fn stream_url(&self, id: &str) -> String {
            format!("shell://{id}")
        }
        async fn get_stream_info(
            &self,
            id: &str,
        ) -> reclink_platforms::Result<Option<StreamInfo>> {
            Ok(Some(StreamInfo::live(id, id)))
        }
        fn build_capture_args(&self, _id: &str, _quality: &str) -> Vec<String> {
            vec!["-c".into(), self.script.into(), "capture".into()]
        }
        fn capture_program(&self) -> Option<&str> {
            Some("sh")
        }
    }

    struct Fixture {
        repo: Arc<SqliteRepository>,
        supervisor: CaptureSupervisor,
        target: Target,
        dir: tempfile::TempDir,
    }

    fn fixture(script: &'static str) -> Fixture {
        let repo = Arc::new(SqliteRepository::open_in_memory().unwrap());
        let mut platforms = PlatformRegistry::new();
        platforms.register(Arc::new(ShellPlatform { script }));
        let supervisor = CaptureSupervisor::new(
            repo.clone(),
            Arc::new(platforms),
            CaptureSettings {
                binary: "unused".into(),
                stop_grace: Duration::from_secs(2),
                tail_lines: 10,
                extra_args: Vec::new(),
            },
        );
        let target = Target::new("shell", "chan", "Chan");
        repo.create_target(&target).unwrap();
        Fixture {
            repo,
            supervisor,
            target,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    impl Fixture {
        fn pending(&self) -> Recording {
            let path = self.dir.path().join("shell").join("cap.ts");
            let rec = Recording::pending(&self.target, "Chan", path);
            self.repo.create_recording(&rec).unwrap();
            rec
        }

        async fn wait_terminal(&self, id: &RecordingId) -> Recording {
            for _ in 0..100 {
                let rec = self.repo.get_recording(id).unwrap().unwrap();
                if rec.status.is_terminal() && !self.supervisor.is_watching(id).await {
                    return rec;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            panic!("recording {id} never reached a terminal state");
        }
    }

    #[tokio::test]
    async fn clean_exit_completes_with_size() {
        let f = fixture(r#"printf 'abcdef' > "$2"; exit 0"#);
        let rec = f.pending();
        assert!(f.supervisor.start(rec.clone(), &f.target).await.unwrap());

        let done = f.wait_terminal(&rec.id).await;
        assert_eq!(done.status, RecordingStatus::Completed);
        assert_eq!(done.file_size, 6);
        assert!(done.start_time.is_some() && done.end_time.is_some());
        assert!(done.error_message.is_none());
    }

    #[tokio::test]
    async fn nonzero_exit_fails_with_tail() {
        let f = fixture("echo 'stream ended' >&2; exit 1");
        let rec = f.pending();
        assert!(f.supervisor.start(rec.clone(), &f.target).await.unwrap());

        let done = f.wait_terminal(&rec.id).await;
        assert_eq!(done.status, RecordingStatus::Failed);
        let msg = done.error_message.unwrap();
        assert!(msg.contains("stream ended"), "{msg}");
        assert!(msg.contains("exit code 1"), "{msg}");
    }

    #[tokio::test]
    async fn exit_130_counts_as_completed() {
        let f = fixture("exit 130");
        let rec = f.pending();
        f.supervisor.start(rec.clone(), &f.target).await.unwrap();
        let done = f.wait_terminal(&rec.id).await;
        assert_eq!(done.status, RecordingStatus::Completed);
    }

    #[tokio::test]
    async fn stop_interrupts_and_completes() {
        let f = fixture(r#"trap 'exit 130' INT; printf 'x' > "$2"; while true; do sleep 0.1; done"#);
        let rec = f.pending();
        f.supervisor.start(rec.clone(), &f.target).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(f.supervisor.is_watching(&rec.id).await);

        assert!(f.supervisor.stop(&rec.id).await.unwrap());
        let done = f.repo.get_recording(&rec.id).unwrap().unwrap();
        assert_eq!(done.status, RecordingStatus::Completed);
        assert_eq!(done.file_size, 1);
        assert!(!f.supervisor.is_watching(&rec.id).await);
    }

    #[tokio::test]
    async fn stop_escalates_to_kill() {
        let f = fixture("trap '' INT; while true; do sleep 0.1; done");
        let rec = f.pending();
        f.supervisor.start(rec.clone(), &f.target).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;

        let started = std::time::Instant::now();
        assert!(f.supervisor.stop(&rec.id).await.unwrap());
        assert!(started.elapsed() >= Duration::from_secs(2));
        let done = f.repo.get_recording(&rec.id).unwrap().unwrap();
        assert_eq!(done.status, RecordingStatus::Completed);
    }

    #[tokio::test]
    async fn spawn_failure_marks_failed() {
        let f = fixture("exit 0");
        let mut target = f.target.clone();
        target.platform = "missing".into();
        let rec = f.pending();
        assert!(!f.supervisor.start(rec.clone(), &target).await.unwrap());
        let failed = f.repo.get_recording(&rec.id).unwrap().unwrap();
        assert_eq!(failed.status, RecordingStatus::Failed);
        assert!(failed.error_message.unwrap().contains("missing"));
    }

    #[tokio::test]
    async fn stop_without_watcher_finalizes_row() {
        let f = fixture("exit 0");
        let mut rec = f.pending();
        rec.mark_recording(Utc::now()).unwrap();
        f.repo.update_recording(&rec).unwrap();

        assert!(f.supervisor.stop(&rec.id).await.unwrap());
        let done = f.repo.get_recording(&rec.id).unwrap().unwrap();
        assert_eq!(done.status, RecordingStatus::Completed);
        assert!(!f.supervisor.stop(&RecordingId::from("nope")).await.unwrap());
    }

    #[tokio::test]
    async fn stop_target_and_stop_all() {
        let f = fixture("while true; do sleep 0.1; done");
        let rec = f.pending();
        f.supervisor.start(rec.clone(), &f.target).await.unwrap();
        assert_eq!(f.supervisor.active_count().await, 1);

        assert_eq!(f.supervisor.stop_target(&f.target.id).await.unwrap(), 1);
        assert_eq!(f.supervisor.active_count().await, 0);
        assert_eq!(f.supervisor.stop_all().await, 0);
    }

    /// Refuses to persist the `recording` transition; everything else passes.
    struct RefusesRecordingState(SqliteRepository);

    impl LifecycleRepository for RefusesRecordingState {
        fn create_target(&self, t: &Target) -> reclink_store::Result<()> {
            self.0.create_target(t)
        }
        fn get_target(&self, id: &TargetId) -> reclink_store::Result<Option<Target>> {
            self.0.get_target(id)
        }
        fn update_target(&self, t: &Target) -> reclink_store::Result<()> {
            self.0.update_target(t)
        }
        fn delete_target(&self, id: &TargetId) -> reclink_store::Result<bool> {
            self.0.delete_target(id)
        }
        fn list_targets(&self) -> reclink_store::Result<Vec<Target>> {
            self.0.list_targets()
        }
        fn list_enabled_targets(&self) -> reclink_store::Result<Vec<Target>> {
            self.0.list_enabled_targets()
        }
        fn list_rotation_enabled_targets(&self) -> reclink_store::Result<Vec<Target>> {
            self.0.list_rotation_enabled_targets()
        }
        fn create_recording(&self, r: &Recording) -> reclink_store::Result<()> {
            self.0.create_recording(r)
        }
        fn get_recording(&self, id: &RecordingId) -> reclink_store::Result<Option<Recording>> {
            self.0.get_recording(id)
        }
        fn update_recording(&self, r: &Recording) -> reclink_store::Result<()> {
            if r.status == RecordingStatus::Recording {
                return Err(reclink_store::StoreError::LockPoisoned);
            }
            self.0.update_recording(r)
        }
        fn update_recordings(&self, rs: &[Recording]) -> reclink_store::Result<()> {
            self.0.update_recordings(rs)
        }
        fn delete_recording(&self, id: &RecordingId) -> reclink_store::Result<bool> {
            self.0.delete_recording(id)
        }
        fn list_recordings(&self, id: &TargetId) -> reclink_store::Result<Vec<Recording>> {
            self.0.list_recordings(id)
        }
        fn list_recordings_by_status(
            &self,
            statuses: &[RecordingStatus],
        ) -> reclink_store::Result<Vec<Recording>> {
            self.0.list_recordings_by_status(statuses)
        }
        fn list_recent_recordings(&self, limit: usize) -> reclink_store::Result<Vec<Recording>> {
            self.0.list_recent_recordings(limit)
        }
        fn active_recording(&self, id: &TargetId) -> reclink_store::Result<Option<Recording>> {
            self.0.active_recording(id)
        }
        fn count_active_recordings(&self, id: &TargetId) -> reclink_store::Result<u32> {
            self.0.count_active_recordings(id)
        }
        fn set_favorite(&self, id: &RecordingId, favorite: bool) -> reclink_store::Result<()> {
            self.0.set_favorite(id, favorite)
        }
        fn update_progress(
            &self,
            id: &RecordingId,
            size: u64,
            duration: i64,
        ) -> reclink_store::Result<bool> {
            self.0.update_progress(id, size, duration)
        }
    }

    #[tokio::test]
    async fn unsaved_start_releases_the_target() {
        let repo = Arc::new(RefusesRecordingState(SqliteRepository::open_in_memory().unwrap()));
        let mut platforms = PlatformRegistry::new();
        platforms.register(Arc::new(ShellPlatform {
            script: "while true; do sleep 0.1; done",
        }));
        let supervisor = CaptureSupervisor::new(
            repo.clone(),
            Arc::new(platforms),
            CaptureSettings {
                binary: "unused".into(),
                stop_grace: Duration::from_secs(2),
                tail_lines: 10,
                extra_args: Vec::new(),
            },
        );
        let target = Target::new("shell", "chan", "Chan");
        repo.create_target(&target).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let rec = Recording::pending(&target, "Chan", dir.path().join("cap.ts"));
        repo.create_recording(&rec).unwrap();

        assert!(supervisor.start(rec.clone(), &target).await.is_err());
        assert!(!supervisor.is_watching(&rec.id).await);
        assert_eq!(repo.count_active_recordings(&target.id).unwrap(), 0);
        let failed = repo.get_recording(&rec.id).unwrap().unwrap();
        assert_eq!(failed.status, RecordingStatus::Failed);
        assert!(failed.error_message.unwrap().contains("could not be saved"));
    }

    #[test]
    fn explicit_paths_are_not_resolved() {
        assert_eq!(resolve_binary("/opt/streamlink"), "/opt/streamlink");
        assert_eq!(resolve_binary("./bin/streamlink"), "./bin/streamlink");
        assert!(resolve_binary("sh").ends_with("sh"));
    }
}
