//! EnvBootstrapService - single-flight detect/install/verify lifecycle.

use std::sync::{Arc, Mutex, MutexGuard};

use futures::future::{BoxFuture, FutureExt, Shared};

use super::classifier::HostOs;
use super::sink::{deliver, EventSink};
use super::types::{BootstrapEvent, BootstrapState, FailureDetail, LogEntry, LogLevel, LogSource, Stage, Tool};
use crate::config::{AppConfig, ToolSpec};
use crate::error::{BootstrapError, Result};
use crate::i18n::{Catalog, Translate};
use crate::probe::{BinaryProbe, PathProbe};
use crate::runner::{ScriptRunner, StreamingProcessRunner};

/// Shared handle to the in-flight run
type Flight = Shared<BoxFuture<'static, BootstrapState>>;

/// State plus everything that must change atomically with it.
pub(super) struct Core {
    pub(super) state: BootstrapState,
    observers: Vec<Arc<dyn EventSink>>,
    flight: Option<Flight>,
}

impl Core {
    /// Fan out to every observer, detaching the ones that can no longer receive
    fn emit(&mut self, event: &BootstrapEvent) {
        self.observers.retain(|observer| deliver(observer.as_ref(), event));
    }

    fn snapshot_event(&self) -> BootstrapEvent {
        BootstrapEvent::StateSnapshot(Box::new(self.state.clone()))
    }

    pub(super) fn emit_snapshot(&mut self) {
        if self.observers.is_empty() {
            return;
        }
        let snapshot = self.snapshot_event();
        self.emit(&snapshot);
    }

    /// Move to `stage`, then emit `StageChanged` immediately followed by a snapshot
    pub(super) fn set_stage(&mut self, stage: Stage) {
        self.state.stage = stage;
        self.state.touch();
        tracing::info!("Bootstrap stage: {}", stage);

        self.emit(&BootstrapEvent::StageChanged {
            stage,
            at: self.state.updated_at,
        });
        self.emit_snapshot();
    }

    pub(super) fn update(&mut self, f: impl FnOnce(&mut BootstrapState)) {
        f(&mut self.state);
        self.state.touch();
        self.emit_snapshot();
    }

    pub(super) fn log(&mut self, level: LogLevel, message: impl Into<String>, source: LogSource) {
        let entry = LogEntry::new(level, message, Some(source));

        // installer output is only mirrored at debug level
        match (source, level) {
            (LogSource::System, LogLevel::Error) => tracing::error!("{}", entry.message),
            (LogSource::System, LogLevel::Warn) => tracing::warn!("{}", entry.message),
            (LogSource::System, LogLevel::Info) => tracing::info!("{}", entry.message),
            (_, level) => tracing::debug!(source = ?source, level = ?level, "{}", entry.message),
        }

        self.state.logs.push(entry.clone());
        self.state.touch();
        self.emit(&BootstrapEvent::LogAppended(entry));
        self.emit_snapshot();
    }
}

/// Collaborators and configuration shared by the service and its run task.
pub(super) struct Inner {
    core: Mutex<Core>,
    tools: [ToolSpec; 2],
    pub(super) probe: Arc<dyn BinaryProbe>,
    pub(super) runner: Arc<dyn StreamingProcessRunner>,
    pub(super) translator: Arc<dyn Translate>,
    pub(super) os: HostOs,
}

impl Inner {
    /// Lock the core. A panic in a previous holder does not invalidate the state.
    pub(super) fn lock(&self) -> MutexGuard<'_, Core> {
        self.core.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(super) fn tool(&self, tool: Tool) -> &ToolSpec {
        match tool {
            Tool::A => &self.tools[0],
            Tool::B => &self.tools[1],
        }
    }

    pub(super) fn t(&self, key: &str, params: &[(&str, &str)]) -> String {
        self.translator.translate(key, params)
    }

    fn tool_names(&self, tools: &[Tool]) -> String {
        tools
            .iter()
            .map(|tool| self.tool(*tool).name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    async fn is_present(&self, tool: Tool) -> bool {
        self.probe.any_exists(&self.tool(tool).aliases).await
    }

    /// Probe one tool and record the result
    async fn check(&self, tool: Tool) {
        let present = self.is_present(tool).await;
        let key = if present {
            "log.check.present"
        } else {
            "log.check.missing"
        };
        let message = self.t(key, &[("tool", self.tool(tool).name.as_str())]);

        let mut core = self.lock();
        core.update(|state| state.set_installed(tool, present));
        core.log(LogLevel::Info, message, tool.source());
    }

    /// Record a terminal failure.
    ///
    /// Emits a snapshot, an error log with the cause, and a warn log with the
    /// suggestion when there is one.
    pub(super) fn fail(&self, core: &mut Core, detail: FailureDetail) {
        let message = self.t("log.failed", &[("message", detail.message.as_str())]);
        let suggestion = detail
            .suggestion
            .as_ref()
            .map(|s| self.t("log.suggestion", &[("suggestion", s.as_str())]));

        core.state.failed = true;
        core.state.done = true;
        core.state.installing = false;
        core.state.error = Some(detail);
        core.set_stage(Stage::Failed);

        core.log(LogLevel::Error, message, LogSource::System);
        if let Some(suggestion) = suggestion {
            core.log(LogLevel::Warn, suggestion, LogSource::System);
        }
    }

    fn mark_ready(&self, core: &mut Core) {
        core.state.done = true;
        core.state.failed = false;
        core.state.installing = false;
        core.state.error = None;
        core.set_stage(Stage::EnvReady);
        core.log(LogLevel::Info, self.t("log.ready", &[]), LogSource::System);
    }

    /// Detection, conditional install, re-verification.
    async fn run(&self) -> Result<()> {
        for tool in Tool::ALL {
            self.lock().set_stage(tool.check_stage());
            self.check(tool).await;
        }

        let missing = self.lock().state.missing_tools();
        if missing.is_empty() {
            let mut core = self.lock();
            core.set_stage(Stage::NoNeedInstall);
            core.log(LogLevel::Info, self.t("log.check.allPresent", &[]), LogSource::System);
            self.mark_ready(&mut core);
            return Ok(());
        }

        let names = self.tool_names(&missing);
        {
            let mut core = self.lock();
            core.set_stage(Stage::NeedInstall);
            core.log(
                LogLevel::Warn,
                self.t("log.install.needed", &[("tools", names.as_str())]),
                LogSource::System,
            );
            core.update(|state| state.installing = true);
        }

        // one at a time: installers share host package state
        for tool in missing {
            self.install_tool(tool).await?;
        }

        {
            let mut core = self.lock();
            core.state.installing = false;
            core.set_stage(Stage::StartCheck);
            core.log(LogLevel::Info, self.t("log.recheck.start", &[]), LogSource::System);
        }
        for tool in Tool::ALL {
            self.check(tool).await;
        }

        let still_missing = self.lock().state.missing_tools();
        if !still_missing.is_empty() {
            let names = self.tool_names(&still_missing);
            let detail = FailureDetail {
                message: self.t("error.recheck", &[("tools", names.as_str())]),
                suggestion: Some(self.t("suggestion.recheck", &[])),
                ..Default::default()
            };
            self.fail(&mut self.lock(), detail);
            return Err(BootstrapError::Recheck(names));
        }

        self.mark_ready(&mut self.lock());
        Ok(())
    }

    /// Convert an error that escaped the run into a failed state, unless the
    /// run already recorded its own failure.
    fn recover(&self, error: &str) {
        let mut core = self.lock();
        if core.state.failed {
            return;
        }
        let detail = FailureDetail::new(self.t("error.unexpected", &[("error", error)]));
        self.fail(&mut core, detail);
    }

    /// Clear the in-flight handle and return the settled state
    fn finish(&self) -> BootstrapState {
        let mut core = self.lock();
        core.flight = None;
        core.observers.clear();
        core.state.clone()
    }

    fn launch(self: &Arc<Self>) -> Flight {
        let task = {
            let inner = self.clone();
            tokio::spawn(async move {
                if let Err(e) = inner.run().await {
                    tracing::error!("Bootstrap run failed: {}", e);
                    inner.recover(&e.to_string());
                }
                inner.finish()
            })
        };

        let inner = self.clone();
        async move {
            match task.await {
                Ok(state) => state,
                Err(e) => {
                    tracing::error!("Bootstrap task aborted: {}", e);
                    inner.recover(&e.to_string());
                    inner.finish()
                }
            }
        }
        .boxed()
        .shared()
    }
}

/// Builder for [`EnvBootstrapService`].
pub struct ServiceBuilder {
    tool_a: ToolSpec,
    tool_b: ToolSpec,
    probe: Option<Arc<dyn BinaryProbe>>,
    runner: Option<Arc<dyn StreamingProcessRunner>>,
    translator: Option<Arc<dyn Translate>>,
    os: Option<HostOs>,
}

impl ServiceBuilder {
    pub fn probe(mut self, probe: Arc<dyn BinaryProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    pub fn runner(mut self, runner: Arc<dyn StreamingProcessRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    pub fn translator(mut self, translator: Arc<dyn Translate>) -> Self {
        self.translator = Some(translator);
        self
    }

    pub fn os(mut self, os: HostOs) -> Self {
        self.os = Some(os);
        self
    }

    pub fn build(self) -> EnvBootstrapService {
        let os = self.os.unwrap_or_else(HostOs::current);
        let probe: Arc<dyn BinaryProbe> = match self.probe {
            Some(probe) => probe,
            None => Arc::new(PathProbe),
        };
        let runner: Arc<dyn StreamingProcessRunner> = match self.runner {
            Some(runner) => runner,
            None => Arc::new(ScriptRunner::for_host(os)),
        };
        let translator: Arc<dyn Translate> = match self.translator {
            Some(translator) => translator,
            None => Arc::new(Catalog::english()),
        };

        let inner = Inner {
            core: Mutex::new(Core {
                state: BootstrapState::default(),
                observers: Vec::new(),
                flight: None,
            }),
            tools: [self.tool_a, self.tool_b],
            probe,
            runner,
            translator,
            os,
        };

        EnvBootstrapService {
            inner: Arc::new(inner),
        }
    }
}

/// Detects, installs and re-verifies the two managed tools.
///
/// Cloning is cheap and every clone drives the same state machine, so one
/// instance can be handed to every surface that may trigger a bootstrap.
#[derive(Clone)]
pub struct EnvBootstrapService {
    inner: Arc<Inner>,
}

impl EnvBootstrapService {
    pub fn builder(tool_a: ToolSpec, tool_b: ToolSpec) -> ServiceBuilder {
        ServiceBuilder {
            tool_a,
            tool_b,
            probe: None,
            runner: None,
            translator: None,
            os: None,
        }
    }

    /// Service with the default `PATH` probe and script runner
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let catalog = match config.locale_path() {
            Some(path) => Catalog::load_with_overrides(&path)?,
            None => Catalog::english(),
        };

        let mut builder = Self::builder(config.tool_a.clone(), config.tool_b.clone())
            .translator(Arc::new(catalog));
        if let Some(ref interpreter) = config.interpreter {
            builder = builder.runner(Arc::new(ScriptRunner::with_interpreter(interpreter)));
        }
        Ok(builder.build())
    }

    /// Latest snapshot. Never triggers a run.
    pub fn get_state(&self) -> BootstrapState {
        self.inner.lock().state.clone()
    }

    /// Whether a run is currently in flight
    pub fn is_running(&self) -> bool {
        self.inner.lock().flight.is_some()
    }

    /// Bring the environment to a terminal state.
    ///
    /// - Already ready: returns the cached state after one snapshot to `observer`.
    /// - Run in flight: `observer` gets a snapshot, joins the run's observers,
    ///   and receives the same result as the caller that launched it.
    /// - Otherwise: clears failure flags (keeping logs) and launches a new run.
    ///
    /// Never returns an error: failures settle into a `failed` state.
    pub async fn start(&self, observer: Arc<dyn EventSink>) -> BootstrapState {
        let flight = {
            let mut core = self.inner.lock();

            if core.state.is_ready() {
                deliver(observer.as_ref(), &core.snapshot_event());
                return core.state.clone();
            }

            match core.flight.clone() {
                Some(flight) => {
                    if deliver(observer.as_ref(), &core.snapshot_event()) {
                        core.observers.push(observer);
                    }
                    flight
                }
                None => {
                    core.observers = vec![observer];
                    core.state.failed = false;
                    core.state.done = false;
                    core.state.installing = false;
                    core.state.error = None;
                    core.set_stage(Stage::StartCheck);
                    core.log(
                        LogLevel::Info,
                        self.inner.t("log.check.start", &[]),
                        LogSource::System,
                    );

                    let flight = self.inner.launch();
                    core.flight = Some(flight.clone());
                    flight
                }
            }
        };

        flight.await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::bootstrap::sink::{ChannelSink, FnSink, NullSink};
    use crate::error::{RunnerError, SinkError};
    use crate::runner::{OutputHandlers, ProcessOutput};

    const INSTALL_A: &str = "/scripts/install-a.sh";
    const INSTALL_B: &str = "/scripts/install-b.sh";

    #[derive(Default)]
    struct FakeProbe {
        present: Mutex<HashSet<String>>,
        calls: AtomicUsize,
        /// Panic on the next lookup
        crash_next: AtomicBool,
    }

    impl FakeProbe {
        fn with(names: &[&str]) -> Arc<Self> {
            let probe = Self::default();
            for name in names {
                probe.install(name);
            }
            Arc::new(probe)
        }

        fn install(&self, name: &str) {
            self.present.lock().unwrap().insert(name.to_string());
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn crash_next(&self) {
            self.crash_next.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl BinaryProbe for FakeProbe {
        async fn exists(&self, name: &str) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.crash_next.swap(false, Ordering::SeqCst) {
                panic!("lookup of {} blew up", name);
            }
            tokio::task::yield_now().await;
            self.present.lock().unwrap().contains(name)
        }
    }

    #[derive(Clone, Default)]
    struct Script {
        exit_code: i32,
        stdout: Vec<String>,
        stderr: Vec<String>,
        /// Binary that becomes resolvable after a successful run
        installs: Option<&'static str>,
        spawn_error: bool,
        delay: Duration,
    }

    impl Script {
        fn installing(name: &'static str) -> Self {
            Self {
                installs: Some(name),
                ..Default::default()
            }
        }
    }

    struct FakeRunner {
        probe: Arc<FakeProbe>,
        scripts: HashMap<PathBuf, Script>,
        journal: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        fn new(probe: Arc<FakeProbe>, scripts: &[(&str, Script)]) -> Arc<Self> {
            Arc::new(Self {
                probe,
                scripts: scripts
                    .iter()
                    .map(|(path, script)| (PathBuf::from(path), script.clone()))
                    .collect(),
                journal: Mutex::new(Vec::new()),
            })
        }

        fn journal(&self) -> Vec<String> {
            self.journal.lock().unwrap().clone()
        }

        fn runs_of(&self, script: &str) -> usize {
            self.journal()
                .iter()
                .filter(|entry| *entry == &format!("start {}", script))
                .count()
        }
    }

    #[async_trait]
    impl StreamingProcessRunner for FakeRunner {
        fn command_line(&self, script: &Path) -> String {
            format!("bash {}", script.display())
        }

        async fn run(
            &self,
            script: &Path,
            handlers: &mut OutputHandlers<'_>,
        ) -> std::result::Result<ProcessOutput, RunnerError> {
            let name = script.display().to_string();
            self.journal.lock().unwrap().push(format!("start {}", name));
            let behavior = self.scripts.get(script).cloned().unwrap_or_default();

            if behavior.spawn_error {
                self.journal.lock().unwrap().push(format!("end {}", name));
                return Err(RunnerError::ScriptNotFound(name));
            }

            tokio::time::sleep(behavior.delay).await;
            for chunk in &behavior.stdout {
                (handlers.on_stdout)(chunk.as_str());
            }
            for chunk in &behavior.stderr {
                (handlers.on_stderr)(chunk.as_str());
            }
            if behavior.exit_code == 0 {
                if let Some(binary) = behavior.installs {
                    self.probe.install(binary);
                }
            }

            self.journal.lock().unwrap().push(format!("end {}", name));
            Ok(ProcessOutput {
                exit_code: behavior.exit_code,
                stdout: behavior.stdout.concat(),
                stderr: behavior.stderr.concat(),
            })
        }
    }

    fn spec(name: &str, aliases: &[&str], installer: &str) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            installer: installer.to_string(),
        }
    }

    fn service(probe: &Arc<FakeProbe>, runner: &Arc<FakeRunner>) -> EnvBootstrapService {
        EnvBootstrapService::builder(
            spec("Alpha", &["alpha", "alpha-cli"], INSTALL_A),
            spec("Beta", &["beta"], INSTALL_B),
        )
        .probe(probe.clone())
        .runner(runner.clone())
        .os(HostOs::Linux)
        .build()
    }

    fn recorder() -> (Arc<dyn EventSink>, Arc<Mutex<Vec<BootstrapEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let observer: Arc<dyn EventSink> = Arc::new(FnSink(move |event: &BootstrapEvent| {
            sink.lock().unwrap().push(event.clone());
        }));
        (observer, events)
    }

    fn log_messages(state: &BootstrapState) -> Vec<String> {
        state.logs.iter().map(|entry| entry.message.clone()).collect()
    }

    fn assert_invariants(state: &BootstrapState) {
        if state.done {
            assert!(state.failed ^ (state.tool_a_installed && state.tool_b_installed));
        }
        if state.installing {
            assert!(!state.done);
        }
        assert_eq!(state.failed, state.error.is_some());
    }

    #[tokio::test]
    async fn test_ready_state_is_cached() {
        let probe = FakeProbe::with(&["alpha-cli", "beta"]);
        let runner = FakeRunner::new(probe.clone(), &[]);
        let service = service(&probe, &runner);

        let first = service.start(Arc::new(NullSink)).await;
        assert_eq!(first.stage, Stage::EnvReady);
        assert!(first.is_ready());
        let probes_after_first = probe.calls();

        let (observer, events) = recorder();
        let second = service.start(observer).await;

        assert_eq!(first, second);
        assert_eq!(probe.calls(), probes_after_first);
        assert!(runner.journal().is_empty());
        let events = events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], BootstrapEvent::StateSnapshot(_)));
    }

    #[tokio::test]
    async fn test_fast_path_skips_install() {
        let probe = FakeProbe::with(&["alpha", "beta"]);
        let runner = FakeRunner::new(probe.clone(), &[]);
        let service = service(&probe, &runner);

        let (observer, events) = recorder();
        let state = service.start(observer).await;

        assert!(state.done && !state.failed && !state.installing);
        let stages: Vec<Stage> = events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|event| match event {
                BootstrapEvent::StageChanged { stage, .. } => Some(*stage),
                _ => None,
            })
            .collect();
        assert_eq!(
            stages,
            vec![
                Stage::StartCheck,
                Stage::CheckToolA,
                Stage::CheckToolB,
                Stage::NoNeedInstall,
                Stage::EnvReady
            ]
        );
        // first alias matched, second never probed
        assert_eq!(probe.calls(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_starts_share_one_run() {
        let probe = FakeProbe::with(&[]);
        let runner = FakeRunner::new(
            probe.clone(),
            &[
                (
                    INSTALL_A,
                    Script {
                        delay: Duration::from_millis(20),
                        ..Script::installing("alpha")
                    },
                ),
                (INSTALL_B, Script::installing("beta")),
            ],
        );
        let service = service(&probe, &runner);

        let (first, second) = tokio::join!(
            service.start(Arc::new(NullSink)),
            service.start(Arc::new(NullSink))
        );

        assert_eq!(first, second);
        assert!(first.is_ready());
        assert_eq!(runner.runs_of(INSTALL_A), 1);
        assert_eq!(runner.runs_of(INSTALL_B), 1);
        // alpha + alpha-cli + beta, then alpha + beta on recheck
        assert_eq!(probe.calls(), 5);
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn test_installers_run_sequentially() {
        let probe = FakeProbe::with(&[]);
        let runner = FakeRunner::new(
            probe.clone(),
            &[
                (
                    INSTALL_A,
                    Script {
                        delay: Duration::from_millis(30),
                        ..Script::installing("alpha")
                    },
                ),
                (INSTALL_B, Script::installing("beta")),
            ],
        );
        let service = service(&probe, &runner);

        let state = service.start(Arc::new(NullSink)).await;

        assert!(state.is_ready());
        assert_eq!(
            runner.journal(),
            vec![
                format!("start {}", INSTALL_A),
                format!("end {}", INSTALL_A),
                format!("start {}", INSTALL_B),
                format!("end {}", INSTALL_B),
            ]
        );
    }

    #[tokio::test]
    async fn test_only_missing_tool_is_installed() {
        let probe = FakeProbe::with(&["alpha"]);
        let runner = FakeRunner::new(probe.clone(), &[(INSTALL_B, Script::installing("beta"))]);
        let service = service(&probe, &runner);

        let state = service.start(Arc::new(NullSink)).await;

        assert!(state.is_ready());
        assert_eq!(runner.runs_of(INSTALL_A), 0);
        assert_eq!(runner.runs_of(INSTALL_B), 1);
        assert!(log_messages(&state).contains(&"Missing tools: Beta".to_string()));
    }

    #[tokio::test]
    async fn test_missing_tools_are_named_in_order() {
        let probe = FakeProbe::with(&[]);
        let runner = FakeRunner::new(
            probe.clone(),
            &[
                (INSTALL_A, Script::installing("alpha")),
                (INSTALL_B, Script::installing("beta")),
            ],
        );
        let service = service(&probe, &runner);

        let state = service.start(Arc::new(NullSink)).await;

        let warning = state
            .logs
            .iter()
            .find(|entry| entry.message.starts_with("Missing tools"))
            .unwrap();
        assert_eq!(warning.message, "Missing tools: Alpha, Beta");
        assert_eq!(warning.level, LogLevel::Warn);
    }

    #[tokio::test]
    async fn test_bad_exit_code_fails_and_aborts() {
        let long_stderr = format!("{}permission denied", "x".repeat(5000));
        let probe = FakeProbe::with(&[]);
        let runner = FakeRunner::new(
            probe.clone(),
            &[
                (
                    INSTALL_A,
                    Script {
                        exit_code: 1,
                        stderr: vec![long_stderr.clone()],
                        ..Script::installing("alpha")
                    },
                ),
                (INSTALL_B, Script::installing("beta")),
            ],
        );
        let service = service(&probe, &runner);

        let state = service.start(Arc::new(NullSink)).await;
        assert_invariants(&state);

        assert!(state.failed);
        assert!(state.done);
        assert!(!state.installing);
        assert_eq!(state.stage, Stage::Failed);
        let error = state.error.as_ref().unwrap();
        assert_eq!(error.exit_code, Some(1));
        assert_eq!(error.command.as_deref(), Some("bash /scripts/install-a.sh"));
        let expected_tail: String = long_stderr
            .chars()
            .skip(long_stderr.chars().count() - 4000)
            .collect();
        assert_eq!(error.stderr_tail.as_deref(), Some(expected_tail.as_str()));
        assert!(error.stdout_tail.is_none());
        assert_eq!(
            error.suggestion,
            Some(Catalog::english().translate("suggestion.permission.unix", &[]))
        );
        assert_eq!(error.message, "Alpha installer exited with code 1");

        // tool B never attempted
        assert_eq!(runner.runs_of(INSTALL_B), 0);

        let last_two: Vec<&LogEntry> = state.logs.iter().rev().take(2).collect();
        assert_eq!(last_two[1].level, LogLevel::Error);
        assert!(last_two[1].message.contains("Alpha installer exited with code 1"));
        assert_eq!(last_two[0].level, LogLevel::Warn);
        assert!(last_two[0].message.starts_with("Suggestion:"));
    }

    #[tokio::test]
    async fn test_recheck_failure_has_distinct_message() {
        let probe = FakeProbe::with(&["beta"]);
        // exits 0 but never places the binary
        let runner = FakeRunner::new(probe.clone(), &[(INSTALL_A, Script::default())]);
        let service = service(&probe, &runner);

        let state = service.start(Arc::new(NullSink)).await;
        assert_invariants(&state);

        assert!(state.failed);
        assert!(!state.tool_a_installed);
        let error = state.error.unwrap();
        let catalog = Catalog::english();
        assert_eq!(
            error.message,
            catalog.translate("error.recheck", &[("tools", "Alpha")])
        );
        assert_ne!(
            error.message,
            catalog.translate("error.installerExit", &[("tool", "Alpha"), ("code", "0")])
        );
        assert_eq!(
            error.suggestion,
            Some(catalog.translate("suggestion.recheck", &[]))
        );
        assert!(error.exit_code.is_none());
    }

    #[tokio::test]
    async fn test_spawn_failure_uses_platform_suggestion() {
        let probe = FakeProbe::with(&["alpha"]);
        let runner = FakeRunner::new(
            probe.clone(),
            &[(
                INSTALL_B,
                Script {
                    spawn_error: true,
                    ..Default::default()
                },
            )],
        );
        let service = service(&probe, &runner);

        let state = service.start(Arc::new(NullSink)).await;
        assert_invariants(&state);

        let error = state.error.unwrap();
        assert!(error.message.starts_with("Failed to start Beta installer"));
        assert!(error.message.contains("/scripts/install-b.sh"));
        assert_eq!(error.command.as_deref(), Some("bash /scripts/install-b.sh"));
        assert_eq!(
            error.suggestion,
            Some(Catalog::english().translate("suggestion.spawn.unix", &[]))
        );
        // one error log and one suggestion log, not two rounds
        let errors = state
            .logs
            .iter()
            .filter(|entry| entry.level == LogLevel::Error)
            .count();
        assert_eq!(errors, 1);
    }

    #[tokio::test]
    async fn test_output_lines_become_logs() {
        let probe = FakeProbe::with(&["beta"]);
        let runner = FakeRunner::new(
            probe.clone(),
            &[(
                INSTALL_A,
                Script {
                    stdout: vec!["down".into(), "loading\n\n   \nunpa".into(), "cking".into()],
                    stderr: vec!["deprecated flag\r\n".into()],
                    ..Script::installing("alpha")
                },
            )],
        );
        let service = service(&probe, &runner);

        let state = service.start(Arc::new(NullSink)).await;
        assert!(state.is_ready());

        let tool_logs: Vec<(LogLevel, String)> = state
            .logs
            .iter()
            .filter(|entry| entry.source == Some(LogSource::ToolA))
            .filter(|entry| !entry.message.starts_with("Alpha is"))
            .map(|entry| (entry.level, entry.message.clone()))
            .collect();

        assert_eq!(
            tool_logs,
            vec![
                (LogLevel::Warn, "Installing Alpha, this may take a few minutes...".to_string()),
                (LogLevel::Info, "downloading".to_string()),
                (LogLevel::Warn, "deprecated flag".to_string()),
                (LogLevel::Info, "unpacking".to_string()),
                (LogLevel::Info, "Alpha installer finished".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_log_buffer_bounded_during_run() {
        let lines: Vec<String> = (0..600).map(|i| format!("step {}\n", i)).collect();
        let probe = FakeProbe::with(&["beta"]);
        let runner = FakeRunner::new(
            probe.clone(),
            &[(
                INSTALL_A,
                Script {
                    stdout: lines,
                    ..Script::installing("alpha")
                },
            )],
        );
        let service = service(&probe, &runner);

        let state = service.start(Arc::new(NullSink)).await;

        assert_eq!(state.logs.len(), 500);
        let steps: Vec<usize> = state
            .logs
            .iter()
            .filter_map(|entry| entry.message.strip_prefix("step "))
            .map(|n| n.parse().unwrap())
            .collect();
        assert!(steps.windows(2).all(|w| w[0] + 1 == w[1]));
        assert_eq!(steps.last(), Some(&599));
        assert_eq!(log_messages(&state).last().unwrap(), "Environment is ready");
    }

    #[tokio::test]
    async fn test_stage_change_followed_by_matching_snapshot() {
        let probe = FakeProbe::with(&[]);
        let runner = FakeRunner::new(
            probe.clone(),
            &[
                (INSTALL_A, Script::installing("alpha")),
                (INSTALL_B, Script::default()),
            ],
        );
        let service = service(&probe, &runner);

        let (observer, events) = recorder();
        service.start(observer).await;

        let events = events.lock().unwrap();
        let mut transitions = 0;
        for (i, event) in events.iter().enumerate() {
            if let BootstrapEvent::StageChanged { stage, .. } = event {
                transitions += 1;
                match events.get(i + 1) {
                    Some(BootstrapEvent::StateSnapshot(state)) => assert_eq!(state.stage, *stage),
                    other => panic!("expected snapshot after {:?}, got {:?}", stage, other),
                }
            }
            if let BootstrapEvent::StateSnapshot(state) = event {
                assert_invariants(state);
            }
        }
        assert!(transitions >= 8);
        assert!(matches!(
            events.last(),
            Some(BootstrapEvent::StateSnapshot(state)) if state.failed
        ));
    }

    #[tokio::test]
    async fn test_every_log_is_followed_by_snapshot() {
        let probe = FakeProbe::with(&["alpha", "beta"]);
        let runner = FakeRunner::new(probe.clone(), &[]);
        let service = service(&probe, &runner);

        let (observer, events) = recorder();
        let state = service.start(observer).await;

        let events = events.lock().unwrap();
        let logged: Vec<&LogEntry> = events
            .iter()
            .enumerate()
            .filter_map(|(i, event)| match event {
                BootstrapEvent::LogAppended(entry) => {
                    assert!(matches!(events[i + 1], BootstrapEvent::StateSnapshot(_)));
                    Some(entry)
                }
                _ => None,
            })
            .collect();
        assert_eq!(logged.len(), state.logs.len());
    }

    #[tokio::test]
    async fn test_restart_after_failure_keeps_logs() {
        let probe = FakeProbe::with(&["beta"]);
        let runner = FakeRunner::new(probe.clone(), &[(INSTALL_A, Script::default())]);
        let service = service(&probe, &runner);

        let failed = service.start(Arc::new(NullSink)).await;
        assert!(failed.failed);
        let earlier_logs = failed.logs.len();

        // the user fixes the problem by hand, then retries
        probe.install("alpha-cli");
        let retried = service.start(Arc::new(NullSink)).await;

        assert!(retried.is_ready());
        assert!(retried.error.is_none());
        assert!(retried.logs.len() > earlier_logs);
        let retried_messages = log_messages(&retried);
        assert_eq!(
            &retried_messages[..earlier_logs],
            &log_messages(&failed)[..]
        );
        assert_eq!(runner.runs_of(INSTALL_A), 1);
    }

    #[tokio::test]
    async fn test_attached_observer_receives_run_events() {
        let probe = FakeProbe::with(&[]);
        let runner = FakeRunner::new(
            probe.clone(),
            &[
                (
                    INSTALL_A,
                    Script {
                        delay: Duration::from_millis(20),
                        ..Script::installing("alpha")
                    },
                ),
                (INSTALL_B, Script::installing("beta")),
            ],
        );
        let service = service(&probe, &runner);

        let launcher = {
            let service = service.clone();
            tokio::spawn(async move { service.start(Arc::new(NullSink)).await })
        };
        while !service.is_running() {
            tokio::task::yield_now().await;
        }

        let (observer, events) = recorder();
        let attached = service.start(observer).await;
        let launched = launcher.await.unwrap();

        assert_eq!(attached, launched);
        let events = events.lock().unwrap();
        assert!(matches!(events.first(), Some(BootstrapEvent::StateSnapshot(_))));
        assert!(events.iter().any(|event| matches!(
            event,
            BootstrapEvent::StageChanged {
                stage: Stage::EnvReady,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_closed_observer_does_not_break_run() {
        let probe = FakeProbe::with(&["alpha", "beta"]);
        let runner = FakeRunner::new(probe.clone(), &[]);
        let service = service(&probe, &runner);

        let (sink, rx) = ChannelSink::channel();
        drop(rx);
        let state = service.start(Arc::new(sink)).await;

        assert!(state.is_ready());
    }

    #[tokio::test]
    async fn test_panic_in_run_settles_as_failure() {
        let probe = FakeProbe::with(&["alpha", "beta"]);
        probe.crash_next();
        let runner = FakeRunner::new(probe.clone(), &[]);
        let service = service(&probe, &runner);

        let state = service.start(Arc::new(NullSink)).await;

        assert!(state.failed && state.done);
        assert_eq!(state.stage, Stage::Failed);
        let prefix = Catalog::english().translate("error.unexpected", &[("error", "")]);
        let message = &state.error.as_ref().unwrap().message;
        assert!(message.starts_with(&prefix), "unexpected message: {}", message);
        assert!(!service.is_running());
        assert_invariants(&state);

        let retried = service.start(Arc::new(NullSink)).await;
        assert_eq!(retried.stage, Stage::EnvReady);
        assert!(retried.is_ready());
    }

    #[tokio::test]
    async fn test_panicking_observer_is_detached() {
        let probe = FakeProbe::with(&["alpha", "beta"]);
        let runner = FakeRunner::new(probe.clone(), &[]);
        let service = service(&probe, &runner);

        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let observer = FnSink(move |_: &BootstrapEvent| {
            counter.fetch_add(1, Ordering::SeqCst);
            panic!("renderer crashed");
        });
        let state = service.start(Arc::new(observer)).await;

        assert!(state.is_ready());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!service.is_running());
    }

    struct ClosedSink {
        attempts: AtomicUsize,
    }

    impl EventSink for ClosedSink {
        fn emit(&self, _event: &BootstrapEvent) -> std::result::Result<(), SinkError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(SinkError::Closed)
        }
    }

    #[tokio::test]
    async fn test_closed_observer_is_tried_once() {
        let probe = FakeProbe::with(&[]);
        let runner = FakeRunner::new(
            probe.clone(),
            &[
                (
                    INSTALL_A,
                    Script {
                        stdout: (0..50).map(|i| format!("step {}\n", i)).collect(),
                        ..Script::installing("alpha")
                    },
                ),
                (INSTALL_B, Script::installing("beta")),
            ],
        );
        let service = service(&probe, &runner);

        let sink = Arc::new(ClosedSink {
            attempts: AtomicUsize::new(0),
        });
        let state = service.start(sink.clone()).await;

        assert!(state.is_ready());
        assert!(state.logs.len() > 50);
        assert_eq!(sink.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_state_does_not_trigger_run() {
        let probe = FakeProbe::with(&["alpha", "beta"]);
        let runner = FakeRunner::new(probe.clone(), &[]);
        let service = service(&probe, &runner);

        let state = service.get_state();
        assert_eq!(state.stage, Stage::Idle);
        assert!(state.logs.is_empty());
        assert_eq!(probe.calls(), 0);
        assert!(!service.is_running());
    }
}
