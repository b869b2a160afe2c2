#![deny(missing_docs)]
//! Project evaluation orchestrator.
//!
//! Sequences panel evaluation across a project: resolves connectors,
//! decrypts credentials transiently, dispatches through a
//! [`Runner`](panelkit_runner::Runner), persists every outcome through
//! the result store, and updates panel status. Independent panels run
//! concurrently under a semaphore; dependent panels are serialized by
//! the dependency edge, not by a global lock.
//!
//! Per-panel failures never escape [`Evaluator::evaluate`]. The caller
//! always gets a report with one outcome per scheduled panel, and every
//! non-cancelled failure is persisted in the result store. Only
//! programming-contract violations (a malformed runner descriptor, a
//! missing vault key) are fatal to the run itself.

use panelkit_connector::{
    ConnectorRegistry, ExecutionTarget, InlineCredential, build_execution_target, ensure_mode,
};
use panelkit_runner::{DriverRegistry, InProcessRunner, Runner, SubprocessRunner};
use panelkit_store::ResultStore;
use panelkit_types::{
    ConnectorId, EvalError, FatalError, Panel, PanelError, PanelId, PanelStatus, Project,
    ProjectId, ResultMeta, ResultRecord, Row, RunnerDescriptor, RunnerMode,
};
use panelkit_vault::Vault;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex, Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub mod graph;

use graph::{DepGraph, parse_refs, substitute};

/// Which panels a run evaluates.
#[derive(Debug, Clone)]
pub enum PanelSelection {
    /// Every panel in the project.
    All,
    /// Only the named panels. Ids that are not project panels are
    /// skipped; dependencies that are not named use their last persisted
    /// result instead of being re-evaluated.
    Only(Vec<PanelId>),
}

/// Options for one evaluation run.
#[derive(Clone)]
pub struct EvalOptions {
    /// Which panels to evaluate.
    pub selection: PanelSelection,
    /// The execution backend for this run.
    pub runner: RunnerDescriptor,
    /// How many independent panels may run at once.
    pub concurrency_limit: usize,
    /// Per-panel deadline; expiry cancels the dispatch and records a
    /// timeout error.
    pub timeout_per_panel: Duration,
    /// How long a subprocess worker gets to drain before force-kill.
    pub grace_period: Duration,
    /// Cooperative cancellation for the whole run.
    pub cancel: CancellationToken,
}

impl Default for EvalOptions {
    fn default() -> Self {
        Self {
            selection: PanelSelection::All,
            runner: RunnerDescriptor::in_process(),
            concurrency_limit: 4,
            timeout_per_panel: Duration::from_secs(120),
            grace_period: Duration::from_secs(2),
            cancel: CancellationToken::new(),
        }
    }
}

/// Final state of one scheduled panel.
#[derive(Debug, Clone)]
pub struct PanelOutcome {
    /// The panel.
    pub id: PanelId,
    /// Where its state machine converged.
    pub status: PanelStatus,
    /// The captured failure, when status is `Error`.
    pub error: Option<PanelError>,
    /// Wall time spent on dispatch plus persistence. Zero when the panel
    /// was never dispatched (cycle member, failed upstream, cancelled
    /// before start).
    pub elapsed_ms: u64,
}

/// Report of one evaluation run, in project panel order.
#[derive(Debug, Clone, Default)]
pub struct EvalReport {
    /// One outcome per scheduled panel.
    pub panels: Vec<PanelOutcome>,
}

impl EvalReport {
    /// Outcome for a panel, if it was scheduled in this run.
    pub fn outcome(&self, id: &PanelId) -> Option<&PanelOutcome> {
        self.panels.iter().find(|o| &o.id == id)
    }

    /// Whether every scheduled panel reached `Done`.
    pub fn all_done(&self) -> bool {
        self.panels.iter().all(|o| o.status == PanelStatus::Done)
    }
}

/// What a dispatched panel task reports back to the scheduling loop.
enum Completion {
    Success { rows: Vec<Row> },
    Failed { error: EvalError },
    Cancelled,
}

struct TaskMsg {
    id: PanelId,
    completion: Completion,
    elapsed_ms: u64,
}

/// Failure propagation that happens without dispatching a task.
enum Synthetic {
    /// Mark the panel failed with the given error and persist it.
    Fail(PanelId, EvalError),
    /// Mark the panel cancelled. Nothing is persisted.
    Cancel(PanelId),
}

/// Per-run scheduling state. Lives on the stack of
/// [`Evaluator::evaluate`]; nothing here survives the run.
struct RunState {
    project: ProjectId,
    /// Scheduled panels not yet dispatched or resolved.
    pending: Vec<PanelId>,
    /// Unfinished scheduled dependencies per pending panel.
    deps_remaining: HashMap<PanelId, usize>,
    /// Scheduled dependents per scheduled panel.
    dependents: HashMap<PanelId, Vec<PanelId>>,
    /// JSON row arrays of panels completed in this run, for reference
    /// substitution in their dependents.
    values: HashMap<PanelId, String>,
    row_counts: HashMap<PanelId, usize>,
    outcomes: HashMap<PanelId, PanelOutcome>,
    worklist: VecDeque<Synthetic>,
    running: usize,
}

impl RunState {
    fn new(
        project: ProjectId,
        scheduled: &[PanelId],
        scheduled_set: &HashSet<PanelId>,
        graph: &DepGraph,
    ) -> Self {
        let mut deps_remaining = HashMap::new();
        let mut dependents: HashMap<PanelId, Vec<PanelId>> = HashMap::new();
        for id in scheduled {
            let count = graph
                .deps
                .get(id)
                .map(|deps| deps.iter().filter(|d| scheduled_set.contains(*d)).count())
                .unwrap_or(0);
            deps_remaining.insert(id.clone(), count);
            if let Some(downstream) = graph.dependents.get(id) {
                dependents.insert(
                    id.clone(),
                    downstream
                        .iter()
                        .filter(|d| scheduled_set.contains(*d))
                        .cloned()
                        .collect(),
                );
            }
        }
        Self {
            project,
            pending: scheduled.to_vec(),
            deps_remaining,
            dependents,
            values: HashMap::new(),
            row_counts: HashMap::new(),
            outcomes: HashMap::new(),
            worklist: VecDeque::new(),
            running: 0,
        }
    }

    fn dependents_of(&self, id: &PanelId) -> Vec<PanelId> {
        self.dependents.get(id).cloned().unwrap_or_default()
    }
}

/// Sequences panel evaluation across projects.
///
/// Shared process-wide state (the vault handle, the in-process driver
/// registry, per-panel in-flight locks) lives here; per-run state lives
/// on the stack of [`Evaluator::evaluate`], so one evaluator serves
/// concurrent runs over different projects.
pub struct Evaluator {
    connectors: Arc<ConnectorRegistry>,
    store: Arc<ResultStore>,
    vault: Option<Arc<Vault>>,
    in_process: Arc<InProcessRunner>,
    /// One lock per (project, panel): at most one in-flight evaluation
    /// per panel id, so overlapping runs of the same panel serialize and
    /// result-file renames never interleave.
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Evaluator {
    /// Create an evaluator. The driver registry backs in-process
    /// dispatch; subprocess runners are built per run from the options'
    /// descriptor.
    pub fn new(connectors: ConnectorRegistry, store: ResultStore, drivers: DriverRegistry) -> Self {
        Self {
            connectors: Arc::new(connectors),
            store: Arc::new(store),
            vault: None,
            in_process: Arc::new(InProcessRunner::new(drivers)),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Install the process-wide vault. Without one, any run that
    /// schedules a connector-backed panel fails fast with
    /// [`FatalError::MissingMasterKey`].
    pub fn with_vault(mut self, vault: Vault) -> Self {
        self.vault = Some(Arc::new(vault));
        self
    }

    /// The result store backing this evaluator.
    pub fn store(&self) -> &ResultStore {
        &self.store
    }

    /// Evaluate a project.
    ///
    /// Never returns `Err` for per-panel failures; those are captured in
    /// the report, reflected in panel status, and persisted in the
    /// result store.
    pub async fn evaluate(
        &self,
        project: &mut Project,
        options: EvalOptions,
    ) -> Result<EvalReport, FatalError> {
        let runner: Arc<dyn Runner> = match options.runner.mode {
            RunnerMode::InProcess => Arc::clone(&self.in_process) as Arc<dyn Runner>,
            RunnerMode::Subprocess => Arc::new(
                SubprocessRunner::new(&options.runner)?.with_grace_period(options.grace_period),
            ),
        };

        let scheduled: Vec<PanelId> = match &options.selection {
            PanelSelection::All => project.panels.iter().map(|p| p.id.clone()).collect(),
            PanelSelection::Only(ids) => {
                let known: HashSet<&str> = project.panels.iter().map(|p| p.id.as_str()).collect();
                ids.iter()
                    .filter(|id| known.contains(id.as_str()))
                    .cloned()
                    .collect()
            }
        };
        let scheduled_set: HashSet<PanelId> = scheduled.iter().cloned().collect();

        if self.vault.is_none()
            && project
                .panels
                .iter()
                .any(|p| scheduled_set.contains(&p.id) && p.connector_id.is_some())
        {
            return Err(FatalError::MissingMasterKey);
        }

        info!(
            project = %project.id,
            scheduled = scheduled.len(),
            runner = %options.runner.name,
            "starting project evaluation"
        );

        let graph = DepGraph::build(project);
        let project_id = project.id.clone();
        let mut run = RunState::new(project_id.clone(), &scheduled, &scheduled_set, &graph);

        // Cycle members can never be dispatched; fail them up front so
        // their downstream panels are resolved before scheduling starts.
        let cyclic = graph.cycle_members();
        for id in scheduled.iter().filter(|id| cyclic.contains(*id)) {
            run.worklist
                .push_back(Synthetic::Fail(id.clone(), EvalError::CyclicDependency(id.clone())));
        }
        self.drain_worklist(&mut run).await;

        let semaphore = Arc::new(Semaphore::new(options.concurrency_limit.max(1)));
        let (tx, mut rx) = mpsc::unbounded_channel::<TaskMsg>();

        loop {
            if options.cancel.is_cancelled() && !run.pending.is_empty() {
                for id in std::mem::take(&mut run.pending) {
                    run.worklist.push_back(Synthetic::Cancel(id));
                }
                self.drain_worklist(&mut run).await;
            }

            let eligible: Vec<PanelId> = run
                .pending
                .iter()
                .filter(|id| run.deps_remaining.get(*id).copied().unwrap_or(0) == 0)
                .cloned()
                .collect();
            for id in eligible {
                run.pending.retain(|p| p != &id);
                let Some(panel) = project.panel_mut(&id) else {
                    continue;
                };
                panel.status = PanelStatus::Running;
                let panel = &*panel;
                self.spawn_panel_task(
                    &project_id,
                    panel,
                    &run.values,
                    &options,
                    &runner,
                    &semaphore,
                    &tx,
                )
                .await;
                run.running += 1;
            }

            if run.running == 0 {
                if run.pending.is_empty() {
                    break;
                }
                // Nothing running and nothing eligible: the remaining
                // panels wait on edges that can never fire.
                for id in std::mem::take(&mut run.pending) {
                    run.worklist
                        .push_back(Synthetic::Fail(id.clone(), EvalError::CyclicDependency(id)));
                }
                self.drain_worklist(&mut run).await;
                continue;
            }

            tokio::select! {
                _ = options.cancel.cancelled(), if !options.cancel.is_cancelled() => {}
                msg = rx.recv() => {
                    if let Some(msg) = msg {
                        run.running -= 1;
                        self.process_completion(&mut run, msg).await;
                    }
                }
            }
        }

        // Drop per-panel gates nobody holds any more, so repeated runs
        // over many projects do not grow the map without bound.
        self.in_flight
            .lock()
            .await
            .retain(|_, gate| Arc::strong_count(gate) > 1);

        let report = finish_run(project, run);
        info!(
            project = %project.id,
            done = report.panels.iter().filter(|o| o.status == PanelStatus::Done).count(),
            failed = report.panels.iter().filter(|o| o.status == PanelStatus::Error).count(),
            "project evaluation finished"
        );
        Ok(report)
    }

    /// Spawn the task evaluating one panel. Everything that can block
    /// (the concurrency permit, the in-flight lock, dispatch, the store
    /// write) happens inside the task, so the scheduling loop never
    /// stalls on a single panel.
    #[allow(clippy::too_many_arguments)]
    async fn spawn_panel_task(
        &self,
        project_id: &ProjectId,
        panel: &Panel,
        values: &HashMap<PanelId, String>,
        options: &EvalOptions,
        runner: &Arc<dyn Runner>,
        semaphore: &Arc<Semaphore>,
        tx: &mpsc::UnboundedSender<TaskMsg>,
    ) {
        // Snapshot upstream values at dispatch time: a dependent sees its
        // scheduled dependencies' rows as of the moment it becomes
        // eligible. References to unscheduled panels are read from the
        // store inside the task.
        let mut resolved: HashMap<PanelId, String> = HashMap::new();
        let mut store_refs: Vec<PanelId> = vec![];
        for r in parse_refs(&panel.content) {
            if let Some(value) = values.get(&r.id) {
                resolved.insert(r.id, value.clone());
            } else if !store_refs.contains(&r.id) {
                store_refs.push(r.id);
            }
        }

        let gate = {
            let key = format!("{}\u{0}{}", project_id, panel.id);
            let mut map = self.in_flight.lock().await;
            Arc::clone(map.entry(key).or_default())
        };

        let task = PanelTask {
            project: project_id.clone(),
            id: panel.id.clone(),
            content: panel.content.clone(),
            kind_tag: panel.kind.tag(),
            connector_id: panel.connector_id.clone(),
            resolved,
            store_refs,
            connectors: Arc::clone(&self.connectors),
            store: Arc::clone(&self.store),
            vault: self.vault.clone(),
            runner: Arc::clone(runner),
            timeout: options.timeout_per_panel,
            cancel: options.cancel.child_token(),
        };
        let semaphore = Arc::clone(semaphore);
        let tx = tx.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let id = task.id.clone();

            let permit = tokio::select! {
                _ = task.cancel.cancelled() => None,
                permit = semaphore.acquire_owned() => permit.ok(),
            };
            let Some(_permit) = permit else {
                let _ = tx.send(TaskMsg {
                    id,
                    completion: Completion::Cancelled,
                    elapsed_ms: 0,
                });
                return;
            };
            let _guard = gate.lock_owned().await;

            let store = Arc::clone(&task.store);
            let project = task.project.clone();
            debug!(panel = %id, "dispatching panel");

            let completion = match task.run().await {
                Ok(rows) => {
                    let record = ResultRecord::success(rows);
                    match store.write(&project, &id, &record).await {
                        Ok(()) => Completion::Success { rows: record.rows },
                        Err(e) => {
                            warn!(panel = %id, error = %e, "result persistence failed");
                            Completion::Failed {
                                error: EvalError::Other(Box::new(e)),
                            }
                        }
                    }
                }
                Err(EvalError::Cancelled) => Completion::Cancelled,
                Err(error) => {
                    let record = ResultRecord::failure(PanelError::from(&error));
                    if let Err(e) = store.write(&project, &id, &record).await {
                        warn!(panel = %id, error = %e, "error persistence failed");
                    }
                    Completion::Failed { error }
                }
            };
            let _ = tx.send(TaskMsg {
                id,
                completion,
                elapsed_ms: started.elapsed().as_millis() as u64,
            });
        });
    }

    async fn process_completion(&self, run: &mut RunState, msg: TaskMsg) {
        match msg.completion {
            Completion::Success { rows } => {
                debug!(panel = %msg.id, rows = rows.len(), "panel done");
                let value =
                    serde_json::to_string(&rows).unwrap_or_else(|_| "[]".to_owned());
                run.row_counts.insert(msg.id.clone(), rows.len());
                run.values.insert(msg.id.clone(), value);
                for dependent in run.dependents_of(&msg.id) {
                    if let Some(count) = run.deps_remaining.get_mut(&dependent) {
                        *count = count.saturating_sub(1);
                    }
                }
                run.outcomes.insert(
                    msg.id.clone(),
                    PanelOutcome {
                        id: msg.id,
                        status: PanelStatus::Done,
                        error: None,
                        elapsed_ms: msg.elapsed_ms,
                    },
                );
            }
            Completion::Failed { error } => {
                warn!(panel = %msg.id, error = %error, "panel failed");
                for dependent in run.dependents_of(&msg.id) {
                    run.worklist.push_back(Synthetic::Fail(
                        dependent,
                        EvalError::DependencyFailed(msg.id.clone()),
                    ));
                }
                run.outcomes.insert(
                    msg.id.clone(),
                    PanelOutcome {
                        id: msg.id,
                        status: PanelStatus::Error,
                        error: Some(PanelError::from(&error)),
                        elapsed_ms: msg.elapsed_ms,
                    },
                );
            }
            Completion::Cancelled => {
                debug!(panel = %msg.id, "panel cancelled");
                for dependent in run.dependents_of(&msg.id) {
                    run.worklist.push_back(Synthetic::Cancel(dependent));
                }
                run.outcomes.insert(
                    msg.id.clone(),
                    PanelOutcome {
                        id: msg.id,
                        status: PanelStatus::Cancelled,
                        error: None,
                        elapsed_ms: msg.elapsed_ms,
                    },
                );
            }
        }
        self.drain_worklist(run).await;
    }

    /// Resolve panels that fail or cancel without ever being dispatched,
    /// cascading through their scheduled dependents. Failures are
    /// persisted so external readers see why the panel has no rows;
    /// cancellations leave the previous persisted result untouched.
    async fn drain_worklist(&self, run: &mut RunState) {
        while let Some(item) = run.worklist.pop_front() {
            match item {
                Synthetic::Fail(id, error) => {
                    if run.outcomes.contains_key(&id) {
                        continue;
                    }
                    run.pending.retain(|p| p != &id);
                    let wire = PanelError::from(&error);
                    let record = ResultRecord::failure(wire.clone());
                    if let Err(e) = self.store.write(&run.project, &id, &record).await {
                        warn!(panel = %id, error = %e, "error persistence failed");
                    }
                    for dependent in run.dependents_of(&id) {
                        run.worklist.push_back(Synthetic::Fail(
                            dependent,
                            EvalError::DependencyFailed(id.clone()),
                        ));
                    }
                    run.outcomes.insert(
                        id.clone(),
                        PanelOutcome {
                            id,
                            status: PanelStatus::Error,
                            error: Some(wire),
                            elapsed_ms: 0,
                        },
                    );
                }
                Synthetic::Cancel(id) => {
                    if run.outcomes.contains_key(&id) {
                        continue;
                    }
                    run.pending.retain(|p| p != &id);
                    for dependent in run.dependents_of(&id) {
                        run.worklist.push_back(Synthetic::Cancel(dependent));
                    }
                    run.outcomes.insert(
                        id.clone(),
                        PanelOutcome {
                            id,
                            status: PanelStatus::Cancelled,
                            error: None,
                            elapsed_ms: 0,
                        },
                    );
                }
            }
        }
    }
}

/// One panel's dispatch, owned by its spawned task.
struct PanelTask {
    project: ProjectId,
    id: PanelId,
    content: String,
    kind_tag: &'static str,
    connector_id: Option<ConnectorId>,
    resolved: HashMap<PanelId, String>,
    store_refs: Vec<PanelId>,
    connectors: Arc<ConnectorRegistry>,
    store: Arc<ResultStore>,
    vault: Option<Arc<Vault>>,
    runner: Arc<dyn Runner>,
    timeout: Duration,
    cancel: CancellationToken,
}

impl PanelTask {
    async fn run(&self) -> Result<Vec<Row>, EvalError> {
        let mut resolved = self.resolved.clone();
        for dep in &self.store_refs {
            match self.store.read(&self.project, dep).await {
                Ok(Some(record)) if record.is_success() => {
                    let value = serde_json::to_string(&record.rows)
                        .map_err(|e| EvalError::Other(Box::new(e)))?;
                    resolved.insert(dep.clone(), value);
                }
                // A persisted error or no result at all: the reference
                // cannot be satisfied.
                Ok(_) => return Err(EvalError::UnresolvedDependency(dep.clone())),
                Err(e) => return Err(EvalError::Other(Box::new(e))),
            }
        }
        let content = substitute(&self.content, &resolved);

        let target = match &self.connector_id {
            Some(connector_id) => {
                let info = self.connectors.resolve(connector_id)?.clone();
                ensure_mode(&info, self.runner.mode())?;
                let vault = self
                    .vault
                    .as_deref()
                    .ok_or_else(|| EvalError::Auth("no vault configured".into()))?;
                let secret = vault
                    .decrypt(&info.password)
                    .map_err(|e| EvalError::Auth(e.to_string()))?;
                secret.with_str(|password| build_execution_target(&info, password))?
            }
            None => synthetic_target(self.kind_tag),
        };

        match tokio::time::timeout(
            self.timeout,
            self.runner.evaluate(&target, &content, self.cancel.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                // Deadline expired. Cancel the dispatch token so a
                // subprocess worker gets shut down rather than leaked.
                self.cancel.cancel();
                Err(EvalError::Timeout(self.timeout.as_millis() as u64))
            }
        }
    }
}

/// Target for panels with no connector (file, http, program). The kind
/// tag routes them to the matching driver or worker handler.
fn synthetic_target(kind_tag: &'static str) -> ExecutionTarget {
    ExecutionTarget {
        kind: kind_tag.to_owned(),
        address: String::new(),
        port: None,
        database: None,
        username: String::new(),
        password: InlineCredential::new(""),
        tls: false,
        params: serde_json::Map::new(),
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Write final statuses back to the project and assemble the report in
/// project panel order.
fn finish_run(project: &mut Project, run: RunState) -> EvalReport {
    let evaluated_at = now_ms();
    let mut report = EvalReport::default();
    for panel in &mut project.panels {
        let Some(outcome) = run.outcomes.get(&panel.id) else {
            continue;
        };
        panel.status = outcome.status;
        match outcome.status {
            PanelStatus::Done | PanelStatus::Error => {
                panel.last_result = Some(ResultMeta {
                    evaluated_at_ms: evaluated_at,
                    elapsed_ms: outcome.elapsed_ms,
                    row_count: run.row_counts.get(&panel.id).copied().unwrap_or(0),
                });
            }
            _ => {}
        }
        report.panels.push(outcome.clone());
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use panelkit_runner::ConnectorDriver;
    use panelkit_types::{ErrorKind, PanelKind};
    use serde_json::{Value, json};
    use tempfile::TempDir;

    /// Driver whose behavior is scripted by the panel content:
    /// `rows:<json>` returns those rows, `fail` errors, `sleep` hangs,
    /// anything else echoes the (substituted) content as one row.
    struct ScriptDriver;

    #[async_trait]
    impl ConnectorDriver for ScriptDriver {
        fn kind(&self) -> &'static str {
            "program"
        }

        async fn query(
            &self,
            _target: &ExecutionTarget,
            content: &str,
        ) -> Result<Vec<Row>, EvalError> {
            if let Some(rest) = content.strip_prefix("rows:") {
                let rows: Vec<Row> =
                    serde_json::from_str(rest).map_err(|e| EvalError::Query(e.to_string()))?;
                return Ok(rows);
            }
            if content == "fail" {
                return Err(EvalError::Query("scripted failure".into()));
            }
            if content == "sleep" {
                tokio::time::sleep(Duration::from_secs(300)).await;
                return Ok(vec![]);
            }
            let mut row = Row::new();
            row.insert("content".into(), Value::String(content.to_owned()));
            Ok(vec![row])
        }
    }

    fn evaluator(dir: &TempDir) -> Evaluator {
        let mut drivers = DriverRegistry::new();
        drivers.register(Arc::new(ScriptDriver));
        Evaluator::new(
            ConnectorRegistry::new(),
            ResultStore::new(dir.path()),
            drivers,
        )
    }

    fn program(id: &str, content: &str) -> Panel {
        Panel::new(id, PanelKind::Program, content)
    }

    fn options() -> EvalOptions {
        EvalOptions {
            timeout_per_panel: Duration::from_secs(5),
            ..EvalOptions::default()
        }
    }

    #[tokio::test]
    async fn single_panel_produces_rows_and_persists_them() {
        let dir = TempDir::new().unwrap();
        let eval = evaluator(&dir);
        let mut project = Project::new("p1", "p1");
        project.panels.push(program("a", r#"rows:[{"number":42}]"#));

        let report = eval.evaluate(&mut project, options()).await.unwrap();
        assert!(report.all_done());
        let panel = project.panel(&PanelId::new("a")).unwrap();
        assert_eq!(panel.status, PanelStatus::Done);
        assert_eq!(panel.last_result.unwrap().row_count, 1);

        let record = eval
            .store()
            .read(&project.id, &PanelId::new("a"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.rows[0]["number"], json!(42));
    }

    #[tokio::test]
    async fn dependent_panel_sees_upstream_rows_substituted() {
        let dir = TempDir::new().unwrap();
        let eval = evaluator(&dir);
        let mut project = Project::new("p1", "p1");
        project.panels.push(program("a", r#"rows:[{"n":1}]"#));
        project.panels.push(program("b", "upstream={{panel:a}}"));

        let report = eval.evaluate(&mut project, options()).await.unwrap();
        assert!(report.all_done());

        let record = eval
            .store()
            .read(&project.id, &PanelId::new("b"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.rows[0]["content"], json!(r#"upstream=[{"n":1}]"#));
    }

    #[tokio::test]
    async fn failure_cascades_to_dependents_but_not_siblings() {
        let dir = TempDir::new().unwrap();
        let eval = evaluator(&dir);
        let mut project = Project::new("p1", "p1");
        project.panels.push(program("a", "fail"));
        project.panels.push(program("b", "use {{panel:a}}"));
        project.panels.push(program("c", r#"rows:[{"ok":true}]"#));

        let report = eval.evaluate(&mut project, options()).await.unwrap();
        let a = report.outcome(&PanelId::new("a")).unwrap();
        assert_eq!(a.status, PanelStatus::Error);
        assert_eq!(a.error.as_ref().unwrap().kind, ErrorKind::Query);

        let b = report.outcome(&PanelId::new("b")).unwrap();
        assert_eq!(b.status, PanelStatus::Error);
        assert_eq!(b.error.as_ref().unwrap().kind, ErrorKind::DependencyFailed);

        assert_eq!(
            report.outcome(&PanelId::new("c")).unwrap().status,
            PanelStatus::Done
        );

        // Both failures were persisted for external readers.
        for id in ["a", "b"] {
            let record = eval
                .store()
                .read(&project.id, &PanelId::new(id))
                .await
                .unwrap()
                .unwrap();
            assert!(!record.is_success());
        }
    }

    #[tokio::test]
    async fn unscheduled_reference_uses_persisted_result() {
        let dir = TempDir::new().unwrap();
        let eval = evaluator(&dir);
        let mut project = Project::new("p1", "p1");
        project.panels.push(program("a", r#"rows:[{"n":7}]"#));
        project.panels.push(program("b", "got {{panel:a}}"));

        // First run: only a.
        let mut opts = options();
        opts.selection = PanelSelection::Only(vec![PanelId::new("a")]);
        let report = eval.evaluate(&mut project, opts).await.unwrap();
        assert_eq!(report.panels.len(), 1);

        // Second run: only b, which reads a's rows from the store.
        let mut opts = options();
        opts.selection = PanelSelection::Only(vec![PanelId::new("b")]);
        let report = eval.evaluate(&mut project, opts).await.unwrap();
        assert!(report.all_done());
        let record = eval
            .store()
            .read(&project.id, &PanelId::new("b"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.rows[0]["content"], json!(r#"got [{"n":7}]"#));
    }

    #[tokio::test]
    async fn reference_with_no_result_anywhere_is_unresolved() {
        let dir = TempDir::new().unwrap();
        let eval = evaluator(&dir);
        let mut project = Project::new("p1", "p1");
        project.panels.push(program("a", r#"rows:[]"#));
        project.panels.push(program("b", "got {{panel:a}}"));

        let mut opts = options();
        opts.selection = PanelSelection::Only(vec![PanelId::new("b")]);
        let report = eval.evaluate(&mut project, opts).await.unwrap();
        let b = report.outcome(&PanelId::new("b")).unwrap();
        assert_eq!(b.status, PanelStatus::Error);
        assert_eq!(
            b.error.as_ref().unwrap().kind,
            ErrorKind::UnresolvedDependency
        );
    }

    #[tokio::test]
    async fn cycle_members_and_downstream_fail_without_dispatch() {
        let dir = TempDir::new().unwrap();
        let eval = evaluator(&dir);
        let mut project = Project::new("p1", "p1");
        project.panels.push(program("a", "see {{panel:b}}"));
        project.panels.push(program("b", "see {{panel:a}}"));
        project.panels.push(program("c", "see {{panel:a}}"));
        project.panels.push(program("d", r#"rows:[{"free":1}]"#));

        let report = eval.evaluate(&mut project, options()).await.unwrap();
        for id in ["a", "b"] {
            let outcome = report.outcome(&PanelId::new(id)).unwrap();
            assert_eq!(outcome.status, PanelStatus::Error);
            assert_eq!(
                outcome.error.as_ref().unwrap().kind,
                ErrorKind::CyclicDependency
            );
        }
        // Downstream of the cycle fails too, but as a dependency failure.
        let c = report.outcome(&PanelId::new("c")).unwrap();
        assert_eq!(c.status, PanelStatus::Error);
        assert_eq!(
            report.outcome(&PanelId::new("d")).unwrap().status,
            PanelStatus::Done
        );
    }

    #[tokio::test]
    async fn panel_timeout_is_recorded_as_timeout_error() {
        let dir = TempDir::new().unwrap();
        let eval = evaluator(&dir);
        let mut project = Project::new("p1", "p1");
        project.panels.push(program("a", "sleep"));

        let mut opts = options();
        opts.timeout_per_panel = Duration::from_millis(50);
        let report = eval.evaluate(&mut project, opts).await.unwrap();
        let a = report.outcome(&PanelId::new("a")).unwrap();
        assert_eq!(a.status, PanelStatus::Error);
        assert_eq!(a.error.as_ref().unwrap().kind, ErrorKind::Timeout);
    }

    #[tokio::test]
    async fn pre_cancelled_run_marks_panels_cancelled_and_persists_nothing() {
        let dir = TempDir::new().unwrap();
        let eval = evaluator(&dir);
        let mut project = Project::new("p1", "p1");
        project.panels.push(program("a", r#"rows:[{"n":1}]"#));
        project.panels.push(program("b", "use {{panel:a}}"));

        let mut opts = options();
        opts.cancel = CancellationToken::new();
        opts.cancel.cancel();
        let report = eval.evaluate(&mut project, opts).await.unwrap();
        for outcome in &report.panels {
            assert_eq!(outcome.status, PanelStatus::Cancelled);
        }
        assert!(
            eval.store()
                .read(&project.id, &PanelId::new("a"))
                .await
                .unwrap()
                .is_none()
        );
        // Cancelled panels keep no stale metadata.
        assert!(project.panel(&PanelId::new("a")).unwrap().last_result.is_none());
    }

    #[tokio::test]
    async fn cancellation_mid_run_stops_undispatched_panels() {
        let dir = TempDir::new().unwrap();
        let eval = Arc::new(evaluator(&dir));
        let mut project = Project::new("p1", "p1");
        project.panels.push(program("a", "sleep"));
        project.panels.push(program("b", "use {{panel:a}}"));

        let cancel = CancellationToken::new();
        let mut opts = options();
        opts.cancel = cancel.clone();

        let trigger = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                cancel.cancel();
            }
        });
        let report = eval.evaluate(&mut project, opts).await.unwrap();
        trigger.await.unwrap();

        assert_eq!(
            report.outcome(&PanelId::new("a")).unwrap().status,
            PanelStatus::Cancelled
        );
        assert_eq!(
            report.outcome(&PanelId::new("b")).unwrap().status,
            PanelStatus::Cancelled
        );
    }

    #[tokio::test]
    async fn connector_panel_without_vault_is_fatal() {
        let dir = TempDir::new().unwrap();
        let eval = evaluator(&dir);
        let mut project = Project::new("p1", "p1");
        project
            .panels
            .push(Panel::new("a", PanelKind::Database, "select 1").with_connector("c1"));

        let result = eval.evaluate(&mut project, options()).await;
        assert!(matches!(result, Err(FatalError::MissingMasterKey)));
    }

    #[tokio::test]
    async fn unknown_selected_ids_are_skipped() {
        let dir = TempDir::new().unwrap();
        let eval = evaluator(&dir);
        let mut project = Project::new("p1", "p1");
        project.panels.push(program("a", r#"rows:[]"#));

        let mut opts = options();
        opts.selection =
            PanelSelection::Only(vec![PanelId::new("a"), PanelId::new("ghost")]);
        let report = eval.evaluate(&mut project, opts).await.unwrap();
        assert_eq!(report.panels.len(), 1);
        assert_eq!(report.panels[0].id.as_str(), "a");
    }

    #[tokio::test]
    async fn rerun_overwrites_previous_result() {
        let dir = TempDir::new().unwrap();
        let eval = evaluator(&dir);
        let mut project = Project::new("p1", "p1");
        project.panels.push(program("a", r#"rows:[{"v":1}]"#));
        eval.evaluate(&mut project, options()).await.unwrap();

        project.panel_mut(&PanelId::new("a")).unwrap().content =
            r#"rows:[{"v":2},{"v":3}]"#.into();
        eval.evaluate(&mut project, options()).await.unwrap();

        let record = eval
            .store()
            .read(&project.id, &PanelId::new("a"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.rows.len(), 2);
        assert_eq!(record.rows[0]["v"], json!(2));
        assert_eq!(
            project
                .panel(&PanelId::new("a"))
                .unwrap()
                .last_result
                .unwrap()
                .row_count,
            2
        );
    }

    #[tokio::test]
    async fn in_flight_gates_are_pruned_between_runs() {
        let dir = TempDir::new().unwrap();
        let eval = evaluator(&dir);
        for i in 0..5 {
            let mut project = Project::new(format!("p{i}"), format!("p{i}"));
            project.panels.push(program("a", r#"rows:[{"n":1}]"#));
            eval.evaluate(&mut project, options()).await.unwrap();
        }
        // A long-lived evaluator must not accumulate one gate per
        // project/panel pair it ever touched.
        assert!(eval.in_flight.lock().await.is_empty());
    }
}
