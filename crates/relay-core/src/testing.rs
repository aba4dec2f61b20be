//! In-memory repositories and scripted handlers shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use relay_types::compare::CompareOp;
use relay_types::credential::ServiceToken;
use relay_types::error::{HandlerError, RepositoryError};
use relay_types::reaction::ReactionOutput;
use relay_types::workflow::{HandlerDescriptor, UserId, Workflow, WorkflowId};
use serde_json::{Value, json};
use tokio::sync::Semaphore;

use crate::handler::registry::{Handler, HandlerRegistry};
use crate::handler::{
    ActionContext, ActionHandler, ActionOutcome, ReactionContext, ReactionHandler,
    ReactionOutcome,
};
use crate::repository::credential::CredentialRepository;
use crate::repository::reaction_output::ReactionOutputRepository;
use crate::repository::workflow::WorkflowRepository;

/// One write of the trigger flag: `(workflow, stored value before, value written)`.
pub type FlagWrite = (WorkflowId, bool, bool);

#[derive(Default)]
struct Inner {
    workflows: Vec<Workflow>,
    tokens: Vec<ServiceToken>,
    outputs: HashMap<WorkflowId, ReactionOutput>,
    flag_writes: Vec<FlagWrite>,
}

/// Implements all three repositories over one mutex-protected state.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    token_fetches: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, workflow: Workflow) {
        self.inner.lock().unwrap().workflows.push(workflow);
    }

    pub fn get(&self, id: &WorkflowId) -> Option<Workflow> {
        let inner = self.inner.lock().unwrap();
        inner.workflows.iter().find(|w| &w.id == id).cloned()
    }

    pub fn remove(&self, id: &WorkflowId) {
        self.inner.lock().unwrap().workflows.retain(|w| &w.id != id);
    }

    pub fn deactivate(&self, id: &WorkflowId) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(w) = inner.workflows.iter_mut().find(|w| &w.id == id) {
            w.active = false;
        }
    }

    pub fn flag_writes(&self) -> Vec<FlagWrite> {
        self.inner.lock().unwrap().flag_writes.clone()
    }

    pub fn output(&self, id: &WorkflowId) -> Option<ReactionOutput> {
        self.inner.lock().unwrap().outputs.get(id).cloned()
    }

    pub fn token_fetches(&self) -> usize {
        self.token_fetches.load(Ordering::SeqCst)
    }

    fn write_flag(&self, workflow: &Workflow, with_state: bool) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        let Inner {
            workflows,
            flag_writes,
            ..
        } = &mut *inner;
        let stored = workflows
            .iter_mut()
            .find(|w| w.id == workflow.id)
            .ok_or(RepositoryError::NotFound)?;
        flag_writes.push((workflow.id, stored.trigger_flag, workflow.trigger_flag));
        stored.trigger_flag = workflow.trigger_flag;
        if with_state {
            stored.accumulated_state = workflow.accumulated_state.clone();
        }
        Ok(())
    }
}

impl WorkflowRepository for MemoryStore {
    async fn load(&self, id: &WorkflowId) -> Result<Option<Workflow>, RepositoryError> {
        Ok(self.get(id))
    }

    async fn save(&self, workflow: &Workflow) -> Result<WorkflowId, RepositoryError> {
        self.insert(workflow.clone());
        Ok(workflow.id)
    }

    async fn update_trigger_flag(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        self.write_flag(workflow, false)
    }

    async fn update_state(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        let stored = inner
            .workflows
            .iter_mut()
            .find(|w| w.id == workflow.id)
            .ok_or(RepositoryError::NotFound)?;
        stored.accumulated_state = workflow.accumulated_state.clone();
        Ok(())
    }

    async fn update_state_and_trigger(&self, workflow: &Workflow) -> Result<(), RepositoryError> {
        self.write_flag(workflow, true)
    }

    async fn find_active_by_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<Workflow>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .workflows
            .iter()
            .filter(|w| &w.user_id == user_id && w.active)
            .cloned()
            .collect())
    }

    async fn find_all_active(&self) -> Result<Vec<Workflow>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.workflows.iter().filter(|w| w.active).cloned().collect())
    }

    async fn find_by_user(&self, user_id: &UserId) -> Result<Vec<Workflow>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .workflows
            .iter()
            .filter(|w| &w.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn find_by_name(
        &self,
        user_id: &UserId,
        name: &str,
    ) -> Result<Option<Workflow>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .workflows
            .iter()
            .find(|w| &w.user_id == user_id && w.name == name)
            .cloned())
    }

    async fn find_existing(
        &self,
        user_id: &UserId,
        action: &HandlerDescriptor,
        reaction: &HandlerDescriptor,
    ) -> Result<Option<Workflow>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .workflows
            .iter()
            .find(|w| &w.user_id == user_id && &w.action == action && &w.reaction == reaction)
            .cloned())
    }

    async fn set_active(&self, id: &WorkflowId, active: bool) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        let stored = inner
            .workflows
            .iter_mut()
            .find(|w| &w.id == id)
            .ok_or(RepositoryError::NotFound)?;
        stored.active = active;
        Ok(())
    }
}

impl CredentialRepository for MemoryStore {
    async fn get_service_tokens(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ServiceToken>, RepositoryError> {
        self.token_fetches.fetch_add(1, Ordering::SeqCst);
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .tokens
            .iter()
            .filter(|t| &t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn save_token(&self, token: &ServiceToken) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .tokens
            .retain(|t| !(t.user_id == token.user_id && t.service == token.service));
        inner.tokens.push(token.clone());
        Ok(())
    }

    async fn delete_token(&self, user_id: &UserId, service: &str) -> Result<bool, RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        let before = inner.tokens.len();
        inner
            .tokens
            .retain(|t| !(&t.user_id == user_id && t.service == service));
        Ok(inner.tokens.len() != before)
    }
}

impl ReactionOutputRepository for MemoryStore {
    async fn save_latest(&self, output: &ReactionOutput) -> Result<(), RepositoryError> {
        let mut inner = self.inner.lock().unwrap();
        inner.outputs.insert(output.workflow_id, output.clone());
        Ok(())
    }

    async fn latest(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Option<ReactionOutput>, RepositoryError> {
        Ok(self.output(workflow_id))
    }

    async fn latest_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ReactionOutput>, RepositoryError> {
        let inner = self.inner.lock().unwrap();
        let mut outputs: Vec<ReactionOutput> = inner
            .outputs
            .values()
            .filter(|o| &o.user_id == user_id)
            .cloned()
            .collect();
        outputs.sort_by(|a, b| b.produced_at.cmp(&a.produced_at));
        Ok(outputs)
    }
}

// ---------------------------------------------------------------------------
// Scripted handlers
// ---------------------------------------------------------------------------

/// Threshold action over a scripted series of readings.
///
/// Options: `{"threshold": f64, "sign": ">"|"<"|"="}`. Each poll consumes one
/// reading; the last one repeats. State is `{"polls": n}`.
#[derive(Clone, Default)]
pub struct ScriptedSensor {
    readings: Arc<Mutex<VecDeque<f64>>>,
    seen_states: Arc<Mutex<Vec<Value>>>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedSensor {
    pub fn new(readings: &[f64]) -> Self {
        let sensor = Self::default();
        sensor.push(readings);
        sensor
    }

    pub fn push(&self, readings: &[f64]) {
        self.readings.lock().unwrap().extend(readings.iter().copied());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen_states(&self) -> Vec<Value> {
        self.seen_states.lock().unwrap().clone()
    }

    fn next_reading(&self) -> Option<f64> {
        let mut readings = self.readings.lock().unwrap();
        if readings.len() > 1 {
            readings.pop_front()
        } else {
            readings.front().copied()
        }
    }
}

impl ActionHandler for ScriptedSensor {
    async fn evaluate(&self, ctx: ActionContext<'_>) -> Result<ActionOutcome, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_states.lock().unwrap().push(ctx.state.clone());

        let threshold = ctx.options["threshold"]
            .as_f64()
            .ok_or_else(|| HandlerError::malformed("missing threshold"))?;
        let sign: CompareOp = ctx.options["sign"]
            .as_str()
            .unwrap_or(">")
            .parse()
            .map_err(HandlerError::malformed)?;
        let reading = self
            .next_reading()
            .ok_or_else(|| HandlerError::transient("sensor offline"))?;

        let polls = ctx.state["polls"].as_u64().unwrap_or(0) + 1;
        let state = json!({ "polls": polls });
        if sign.apply(reading, threshold) {
            Ok(ActionOutcome::fire(state))
        } else {
            Ok(ActionOutcome::hold(state))
        }
    }
}

/// Reaction that counts its calls, failing the first `failures` of them.
#[derive(Clone, Default)]
pub struct CountingEffect {
    calls: Arc<AtomicUsize>,
    failures: Arc<AtomicUsize>,
}

impl CountingEffect {
    pub fn failing(failures: usize) -> Self {
        let effect = Self::default();
        effect.failures.store(failures, Ordering::SeqCst);
        effect
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ReactionHandler for CountingEffect {
    async fn execute(&self, _ctx: ReactionContext<'_>) -> Result<ReactionOutcome, HandlerError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(HandlerError::transient("remote unavailable"));
        }
        Ok(ReactionOutcome::with_output(json!({ "call": call })))
    }
}

/// Action that is unauthorized until a `sensor` token with value "fresh" is
/// among its credentials; then it fires.
#[derive(Clone, Default)]
pub struct TokenGatedSensor {
    calls: Arc<AtomicUsize>,
}

impl TokenGatedSensor {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ActionHandler for TokenGatedSensor {
    async fn evaluate(&self, ctx: ActionContext<'_>) -> Result<ActionOutcome, HandlerError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let token = crate::handler::bearer_token(ctx.credentials, "sensor")?;
        if token != "fresh" {
            return Err(HandlerError::unauthorized("token expired"));
        }
        Ok(ActionOutcome::fire(ctx.state.clone()))
    }
}

/// Holds every handler call until the test hands out a permit.
///
/// Counts calls and how many are blocked at once.
#[derive(Clone)]
pub struct Gate {
    permits: Arc<Semaphore>,
    calls: Arc<AtomicUsize>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl Default for Gate {
    fn default() -> Self {
        Self {
            permits: Arc::new(Semaphore::new(0)),
            calls: Arc::default(),
            in_flight: Arc::default(),
            max_in_flight: Arc::default(),
        }
    }
}

impl Gate {
    /// Let `n` more calls through.
    pub fn release(&self, n: usize) {
        self.permits.add_permits(n);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Wait for a permit. Returns the 1-based call number.
    async fn pass(&self) -> usize {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Ok(permit) = self.permits.acquire().await {
            permit.forget();
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        call
    }
}

/// Action that fires on every poll once its gate lets it through.
/// State is `{"polls": n}`.
pub struct GatedSensor(pub Gate);

impl ActionHandler for GatedSensor {
    async fn evaluate(&self, _ctx: ActionContext<'_>) -> Result<ActionOutcome, HandlerError> {
        let call = self.0.pass().await;
        Ok(ActionOutcome::fire(json!({ "polls": call })))
    }
}

/// Reaction that outputs `{"call": n}` once its gate lets it through.
pub struct GatedEffect(pub Gate);

impl ReactionHandler for GatedEffect {
    async fn execute(&self, _ctx: ReactionContext<'_>) -> Result<ReactionOutcome, HandlerError> {
        let call = self.0.pass().await;
        Ok(ReactionOutcome::with_output(json!({ "call": call })))
    }
}

/// Reaction that panics when invoked.
pub struct PanickingEffect;

impl ReactionHandler for PanickingEffect {
    async fn execute(&self, _ctx: ReactionContext<'_>) -> Result<ReactionOutcome, HandlerError> {
        panic!("effect blew up");
    }
}

pub fn registry(sensor: &ScriptedSensor, effect: &CountingEffect) -> Arc<HandlerRegistry> {
    let mut builder = HandlerRegistry::builder();
    builder
        .register("sensor", "threshold", Handler::action(sensor.clone()))
        .register("sensor", "gated", Handler::action(TokenGatedSensor::default()))
        .register("effect", "count", Handler::reaction(effect.clone()))
        .register("effect", "panic", Handler::reaction(PanickingEffect));
    Arc::new(builder.build())
}

pub fn threshold_workflow(user_id: UserId, threshold: f64) -> Workflow {
    Workflow::new(
        user_id,
        "Workflow 1",
        HandlerDescriptor::new(
            "sensor",
            "threshold",
            json!({ "threshold": threshold, "sign": ">" }),
        ),
        HandlerDescriptor::new("effect", "count", json!({})),
    )
}

/// Poll `condition` every 5ms until it holds or `timeout` elapses.
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
