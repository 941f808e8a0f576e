//! Create orchestration integration tests: full runs against recording fakes.
//!
//! Tests verify:
//! - Upstream resolution picks the single upstream driver, rejects ambiguity
//! - Missing upstream is fatal unless `--infra-upstream none`
//! - Push happens iff the infra repository has an upstream
//! - A conflicting infra driver triggers exactly one restore
//! - Every driver is stopped exactly once, whatever fails
//! - The workspace record is saved on every exit path

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use orchestration::{
    AppSpec, Driver, DriverRegistry, ForgeError, ForgeResult, InfraRepo, Orchestrator,
    PluginData, PluginRepo, PluginResult, PluginService, ResolvedUpstream, Session, Workspace,
};

const UPSTREAM_URL: &str = "git@example.com:acme/acme-infra.git";

/// Call log shared by the fakes of one run.
#[derive(Clone, Default)]
struct Log(Arc<Mutex<Vec<String>>>);

impl Log {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.entries().iter().filter(|e| *e == entry).count()
    }
}

struct FakePlugin {
    name: String,
    log: Log,
    results: HashMap<String, PluginResult>,
}

impl FakePlugin {
    fn new(name: &str, log: &Log) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            results: HashMap::new(),
        }
    }

    fn on(mut self, action: &str, result: PluginResult) -> Self {
        self.results.insert(action.to_string(), result);
        self
    }
}

#[async_trait]
impl PluginService for FakePlugin {
    fn init(&mut self, _workspace: &Path) -> ForgeResult<()> {
        Ok(())
    }

    fn set_source_path(&mut self, _path: PathBuf) {}

    fn set_workspace_path(&mut self, _path: PathBuf) {}

    fn set_socket_path(&mut self, _path: PathBuf) {}

    async fn start_service(&mut self) -> ForgeResult<()> {
        Ok(())
    }

    async fn run_action(
        &mut self,
        action: &str,
        _args: &BTreeMap<String, String>,
    ) -> ForgeResult<PluginResult> {
        self.log.push(format!("{}:{action}", self.name));
        Ok(self.results.get(action).cloned().unwrap_or_else(|| {
            PluginResult::ok(PluginData {
                status: format!("{} {action} done", self.name),
                ..PluginData::default()
            })
        }))
    }

    async fn stop_service(&mut self) -> ForgeResult<()> {
        self.log.push(format!("{}:stop", self.name));
        Ok(())
    }
}

struct FakeRepo {
    log: Log,
}

impl InfraRepo for FakeRepo {
    fn ensure_initialized(&self) -> ForgeResult<()> {
        self.log.push("git:init");
        Ok(())
    }

    fn ensure_synced(&self, upstream: Option<&str>, _readme: &str) -> ForgeResult<()> {
        self.log
            .push(format!("git:sync {}", upstream.unwrap_or("local")));
        Ok(())
    }

    fn stage(&self, _paths: &[PathBuf]) -> ForgeResult<()> {
        Ok(())
    }

    fn commit(&self, message: &str) -> ForgeResult<String> {
        let subject = message.lines().next().unwrap_or_default();
        self.log.push(format!("git:commit {subject}"));
        Ok("abc1234".into())
    }

    fn push(&self) -> ForgeResult<()> {
        self.log.push("git:push");
        Ok(())
    }
}

fn infra_repos(exist: bool) -> BTreeMap<String, PluginRepo> {
    BTreeMap::from([(
        "acme-infra".to_string(),
        PluginRepo {
            name: "acme-infra".into(),
            exist,
            upstream: UPSTREAM_URL.into(),
        },
    )])
}

fn github_created() -> PluginResult {
    PluginResult::ok(PluginData {
        status: "repository acme-infra created".into(),
        repos: infra_repos(true),
        ..PluginData::default()
    })
}

fn failure(message: &str) -> PluginResult {
    PluginResult {
        state_code: 500,
        data: PluginData {
            error_message: message.into(),
            ..PluginData::default()
        },
    }
}

fn workspace(dir: &Path) -> Workspace {
    let mut ws = Workspace::new(dir.join("acme"));
    ws.organization = "acme".into();
    ws.infra = PluginRepo::new("acme-infra");
    ws
}

fn orchestrator(
    ws: Workspace,
    apps: Vec<(&str, FakePlugin)>,
    requested: Option<&str>,
    log: &Log,
) -> Orchestrator<FakeRepo> {
    let mut registry = DriverRegistry::new();
    for (app, plugin) in apps {
        let spec = AppSpec::parse(app).unwrap();
        registry.register(Driver::new(&spec, Box::new(plugin))).unwrap();
    }
    let session = Session::new(ws, registry).with_requested_upstream(requested.map(String::from));
    Orchestrator::new(session, FakeRepo { log: log.clone() })
}

fn saved_workspace(dir: &Path) -> Workspace {
    let mut ws = Workspace::new(dir.join("acme"));
    assert!(ws.load().unwrap(), "workspace record should be saved");
    ws
}

// ── Scenario: upstream + ci ────────────────────────────────────────

#[tokio::test]
async fn test_github_and_jenkins_full_run() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::default();
    let mut orch = orchestrator(
        workspace(dir.path()),
        vec![
            ("upstream:github", FakePlugin::new("github", &log).on("create", github_created())),
            ("ci:jenkins", FakePlugin::new("jenkins", &log)),
        ],
        None,
        &log,
    );

    orch.create().await.unwrap();

    let sync = format!("git:sync {UPSTREAM_URL}");
    assert_eq!(
        log.entries(),
        vec![
            "git:init",
            "github:create",
            sync.as_str(),
            "git:commit github(github) create",
            "git:push",
            "github:maintain",
            "jenkins:create",
            sync.as_str(),
            "git:commit jenkins(jenkins) create",
            "git:push",
            "jenkins:maintain",
            "jenkins:stop",
            "github:stop",
        ]
    );

    let ws = saved_workspace(dir.path());
    assert_eq!(ws.instance, ResolvedUpstream::Instance("github".into()));
    assert_eq!(ws.driver, "github");
    assert_eq!(ws.infra.upstream, UPSTREAM_URL);
    assert!(ws.infra.exist);
}

#[tokio::test]
async fn test_jenkins_only_with_none_never_pushes() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::default();
    let mut orch = orchestrator(
        workspace(dir.path()),
        vec![("ci:jenkins", FakePlugin::new("jenkins", &log))],
        Some("none"),
        &log,
    );

    orch.create().await.unwrap();

    assert_eq!(log.count("git:push"), 0);
    assert_eq!(log.count("git:sync local"), 2);
    assert_eq!(log.count("jenkins:create"), 1);
    assert_eq!(log.count("jenkins:maintain"), 1);
    assert_eq!(log.count("jenkins:stop"), 1);
    assert_eq!(saved_workspace(dir.path()).instance, ResolvedUpstream::Disabled);
}

#[tokio::test]
async fn test_none_with_upstream_driver_keeps_infra_local() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::default();
    let mut orch = orchestrator(
        workspace(dir.path()),
        vec![("upstream:github", FakePlugin::new("github", &log).on("create", github_created()))],
        Some("none"),
        &log,
    );

    orch.create().await.unwrap();

    // github runs as a regular driver; it does not own the infra remote.
    assert_eq!(log.count("github:create"), 1);
    assert_eq!(log.count("git:push"), 0);
    assert!(orch.session().infra_upstream.is_none());
}

// ── Upstream resolution failures ───────────────────────────────────

#[tokio::test]
async fn test_ambiguous_upstream_runs_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::default();
    let mut orch = orchestrator(
        workspace(dir.path()),
        vec![
            ("upstream:github", FakePlugin::new("github", &log)),
            ("upstream:gitlab", FakePlugin::new("gitlab", &log)),
        ],
        None,
        &log,
    );

    let err = orch.create().await.unwrap_err();
    assert!(matches!(err, ForgeError::AmbiguousUpstream { .. }));
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_explicit_upstream_among_several() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::default();
    let mut orch = orchestrator(
        workspace(dir.path()),
        vec![
            ("upstream:github", FakePlugin::new("github", &log)),
            ("upstream:gitlab", FakePlugin::new("gitlab", &log).on("create", github_created())),
        ],
        Some("gitlab"),
        &log,
    );

    orch.create().await.unwrap();
    let entries = log.entries();
    assert_eq!(entries[1], "gitlab:create");
    assert_eq!(log.count("git:push"), 2);
    assert_eq!(saved_workspace(dir.path()).driver, "gitlab");
}

#[tokio::test]
async fn test_missing_upstream_is_fatal_and_still_releases() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::default();
    let mut orch = orchestrator(
        workspace(dir.path()),
        vec![("ci:jenkins", FakePlugin::new("jenkins", &log))],
        None,
        &log,
    );

    let err = orch.create().await.unwrap_err();
    assert!(matches!(err, ForgeError::InfraCheck { .. }));
    assert!(matches!(err.root(), ForgeError::MissingUpstream { .. }));
    assert!(err.to_string().contains("--infra-upstream none"));

    assert_eq!(log.entries(), vec!["git:init", "jenkins:stop"]);
    saved_workspace(dir.path());
}

// ── Conflict handling ──────────────────────────────────────────────

#[tokio::test]
async fn test_conflict_restores_once_and_continues() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::default();
    let github = FakePlugin::new("github", &log).on(
        "create",
        PluginResult::conflict("repository acme-infra already exists", infra_repos(true)),
    );
    let mut orch = orchestrator(
        workspace(dir.path()),
        vec![("upstream:github", github), ("ci:jenkins", FakePlugin::new("jenkins", &log))],
        None,
        &log,
    );

    orch.create().await.unwrap();

    let sync = format!("git:sync {UPSTREAM_URL}");
    assert_eq!(
        log.entries(),
        vec![
            "git:init",
            "github:create",
            sync.as_str(),
            "jenkins:create",
            sync.as_str(),
            "git:commit jenkins(jenkins) create",
            "git:push",
            "jenkins:maintain",
            "jenkins:stop",
            "github:stop",
        ]
    );
    assert_eq!(log.count("github:maintain"), 0);
    assert_eq!(saved_workspace(dir.path()).infra.upstream, UPSTREAM_URL);
}

#[tokio::test]
async fn test_conflict_without_infra_repo_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::default();
    let github = FakePlugin::new("github", &log).on(
        "create",
        PluginResult::conflict("already exists", BTreeMap::new()),
    );
    let mut orch = orchestrator(
        workspace(dir.path()),
        vec![("upstream:github", github), ("ci:jenkins", FakePlugin::new("jenkins", &log))],
        None,
        &log,
    );

    let err = orch.create().await.unwrap_err();
    assert!(matches!(err.root(), ForgeError::RestoreFailed { .. }));
    assert!(err.to_string().contains("Not found"));
    assert_eq!(log.count("jenkins:create"), 0);
    assert_eq!(log.count("jenkins:stop"), 1);
    assert_eq!(log.count("github:stop"), 1);
}

#[tokio::test]
async fn test_conflict_with_inexistent_infra_repo_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::default();
    let github = FakePlugin::new("github", &log)
        .on("create", PluginResult::conflict("already exists", infra_repos(false)));
    let mut orch = orchestrator(
        workspace(dir.path()),
        vec![("upstream:github", github)],
        None,
        &log,
    );

    let err = orch.create().await.unwrap_err();
    assert!(err.to_string().contains("Inexistent"));
    assert_eq!(log.count("git:push"), 0);
}

#[tokio::test]
async fn test_secondary_conflict_is_a_warning() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::default();
    let jenkins = FakePlugin::new("jenkins", &log)
        .on("create", PluginResult::conflict("job exists", BTreeMap::new()));
    let mut orch = orchestrator(
        workspace(dir.path()),
        vec![("ci:jenkins", jenkins), ("ci:travis", FakePlugin::new("travis", &log))],
        Some("none"),
        &log,
    );

    orch.create().await.unwrap();
    assert_eq!(log.count("jenkins:maintain"), 0);
    assert_eq!(log.count("travis:create"), 1);
    assert_eq!(log.count("travis:maintain"), 1);
}

// ── Failures and release ───────────────────────────────────────────

#[tokio::test]
async fn test_jenkins_failure_stops_every_driver_once() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::default();
    let mut orch = orchestrator(
        workspace(dir.path()),
        vec![
            ("upstream:github", FakePlugin::new("github", &log).on("create", github_created())),
            ("ci:jenkins", FakePlugin::new("jenkins", &log).on("create", failure("no credentials"))),
        ],
        None,
        &log,
    );

    let err = orch.create().await.unwrap_err();
    match &err {
        ForgeError::DriverCreate { instance, .. } => assert_eq!(instance, "jenkins"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("no credentials"));

    assert_eq!(log.count("github:stop"), 1);
    assert_eq!(log.count("jenkins:stop"), 1);
    assert_eq!(log.count("git:push"), 1);
    assert_eq!(saved_workspace(dir.path()).infra.upstream, UPSTREAM_URL);
}

#[tokio::test]
async fn test_owner_without_infra_repo_in_result() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::default();
    let mut orch = orchestrator(
        workspace(dir.path()),
        vec![("upstream:github", FakePlugin::new("github", &log))],
        None,
        &log,
    );

    let err = orch.create().await.unwrap_err();
    assert!(matches!(err.root(), ForgeError::ResultInconsistency { .. }));
    assert_eq!(log.entries(), vec!["git:init", "github:create", "github:stop"]);
}

// ── Re-run on a saved workspace ────────────────────────────────────

#[tokio::test]
async fn test_second_run_reuses_recorded_upstream() {
    let dir = tempfile::tempdir().unwrap();
    let log = Log::default();
    let mut first = orchestrator(
        workspace(dir.path()),
        vec![("upstream:github", FakePlugin::new("github", &log).on("create", github_created()))],
        None,
        &log,
    );
    first.create().await.unwrap();

    // The second run declares another upstream: the recorded owner still wins,
    // and its URL no longer has to come from the driver result.
    let log = Log::default();
    let mut second = orchestrator(
        saved_workspace(dir.path()),
        vec![
            ("upstream:github", FakePlugin::new("github", &log)),
            ("upstream:gitlab", FakePlugin::new("gitlab", &log)),
        ],
        None,
        &log,
    );
    second.create().await.unwrap();

    assert_eq!(log.count("git:push"), 2);
    let ws = saved_workspace(dir.path());
    assert_eq!(ws.instance, ResolvedUpstream::Instance("github".into()));
    assert_eq!(ws.infra.upstream, UPSTREAM_URL);
}
