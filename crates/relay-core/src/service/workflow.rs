//! Workflow management service.
//!
//! Validates and persists new workflows, toggles them on and off, and hands
//! them to the [`Supervisor`] when one is attached. Without a supervisor the
//! service only touches the store; the workflow starts the next time a
//! process with a supervisor resumes active workflows.

use std::collections::HashMap;
use std::sync::Arc;

use relay_types::credential::ServiceToken;
use relay_types::error::WorkflowError;
use relay_types::reaction::ReactionOutput;
use relay_types::workflow::{CreateWorkflowRequest, UserId, Workflow, WorkflowId};

use crate::engine::supervisor::Supervisor;
use crate::handler::registry::HandlerRegistry;
use crate::repository::credential::CredentialRepository;
use crate::repository::reaction_output::ReactionOutputRepository;
use crate::repository::workflow::WorkflowRepository;

const MAX_NAME_LEN: usize = 100;
const GENERATED_NAME_PREFIX: &str = "Workflow ";

/// Service orchestrating the workflow lifecycle.
///
/// Generic over the repository traits; relay-core never depends on
/// relay-infra.
pub struct WorkflowService<W, C, R> {
    workflows: Arc<W>,
    credentials: Arc<C>,
    outputs: Arc<R>,
    registry: Arc<HandlerRegistry>,
    supervisor: Option<Arc<Supervisor<W, C, R>>>,
}

impl<W, C, R> WorkflowService<W, C, R>
where
    W: WorkflowRepository + 'static,
    C: CredentialRepository + 'static,
    R: ReactionOutputRepository + 'static,
{
    /// A service that persists changes but never starts cycles.
    pub fn new(
        workflows: Arc<W>,
        credentials: Arc<C>,
        outputs: Arc<R>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        Self {
            workflows,
            credentials,
            outputs,
            registry,
            supervisor: None,
        }
    }

    /// Start and stop cycles through `supervisor` on create, enable and disable.
    pub fn with_supervisor(mut self, supervisor: Arc<Supervisor<W, C, R>>) -> Self {
        self.supervisor = Some(supervisor);
        self
    }

    pub fn supervisor(&self) -> Option<&Arc<Supervisor<W, C, R>>> {
        self.supervisor.as_ref()
    }

    /// Create a workflow and start it.
    ///
    /// 1. Resolves both descriptors against the handler registry
    /// 2. Uses the trimmed name, or generates "Workflow N" when it is empty
    /// 3. Rejects a duplicate of an existing action/reaction binding
    /// 4. Saves it active with the trigger cleared
    /// 5. Starts the cycles with the owner's credentials, if supervised
    pub async fn create(&self, request: CreateWorkflowRequest) -> Result<Workflow, WorkflowError> {
        let CreateWorkflowRequest {
            user_id,
            name,
            action,
            reaction,
        } = request;

        if self
            .registry
            .resolve_action(&action.service, &action.operation)
            .is_none()
        {
            return Err(WorkflowError::UnknownAction(action.key()));
        }
        if self
            .registry
            .resolve_reaction(&reaction.service, &reaction.operation)
            .is_none()
        {
            return Err(WorkflowError::UnknownReaction(reaction.key()));
        }

        let name = match name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => self.validate_name(&user_id, name).await?,
            None => self.generate_name(&user_id).await?,
        };

        if let Some(existing) = self
            .workflows
            .find_existing(&user_id, &action, &reaction)
            .await?
        {
            return Err(WorkflowError::AlreadyExists {
                active: existing.active,
            });
        }

        let credentials = if self.supervisor.is_some() {
            self.credentials.get_service_tokens(&user_id).await?
        } else {
            Vec::new()
        };

        let workflow = Workflow::new(user_id, name, action, reaction);
        self.workflows.save(&workflow).await?;
        tracing::info!(
            workflow_id = %workflow.id,
            name = %workflow.name,
            action = %workflow.action.key(),
            reaction = %workflow.reaction.key(),
            "workflow created"
        );

        self.launch(&workflow, credentials);
        Ok(workflow)
    }

    pub async fn get(&self, id: &WorkflowId) -> Result<Workflow, WorkflowError> {
        self.workflows
            .load(id)
            .await?
            .ok_or(WorkflowError::NotFound)
    }

    pub async fn list_for_user(&self, user_id: &UserId) -> Result<Vec<Workflow>, WorkflowError> {
        Ok(self.workflows.find_by_user(user_id).await?)
    }

    /// Disable a workflow. Running cycles are cancelled right away when this
    /// process supervises them, and otherwise notice within one poll interval.
    pub async fn deactivate(&self, id: &WorkflowId) -> Result<(), WorkflowError> {
        self.workflows.set_active(id, false).await?;
        if let Some(supervisor) = &self.supervisor {
            supervisor.stop(id);
        }
        tracing::info!(workflow_id = %id, "workflow deactivated");
        Ok(())
    }

    /// Enable a workflow again and restart its cycles.
    pub async fn reactivate(&self, id: &WorkflowId) -> Result<Workflow, WorkflowError> {
        let mut workflow = self.get(id).await?;
        self.workflows.set_active(id, true).await?;
        workflow.active = true;

        if self.supervisor.is_some() {
            let credentials = self
                .credentials
                .get_service_tokens(&workflow.user_id)
                .await?;
            self.launch(&workflow, credentials);
        }
        tracing::info!(workflow_id = %id, "workflow reactivated");
        Ok(workflow)
    }

    /// Start every active workflow that is not already running.
    ///
    /// Returns how many were started. Credentials are fetched once per user;
    /// a user whose credentials cannot be read is skipped and retried on the
    /// next call.
    pub async fn resume_active(&self) -> Result<usize, WorkflowError> {
        let Some(supervisor) = &self.supervisor else {
            return Ok(0);
        };

        let active = self.workflows.find_all_active().await?;
        let mut credentials: HashMap<UserId, Vec<ServiceToken>> = HashMap::new();
        let mut started = 0;

        for workflow in active {
            if supervisor.is_running(&workflow.id) {
                continue;
            }
            if !credentials.contains_key(&workflow.user_id) {
                match self.credentials.get_service_tokens(&workflow.user_id).await {
                    Ok(tokens) => {
                        credentials.insert(workflow.user_id, tokens);
                    }
                    Err(err) => {
                        tracing::warn!(
                            user_id = %workflow.user_id,
                            error = %err,
                            "cannot read credentials, workflow not resumed"
                        );
                        continue;
                    }
                }
            }
            let tokens = credentials
                .get(&workflow.user_id)
                .cloned()
                .unwrap_or_default();
            if supervisor.start(&workflow, tokens) {
                started += 1;
            }
        }

        if started > 0 {
            tracing::info!(started, "resumed active workflows");
        }
        Ok(started)
    }

    /// Latest reaction output of each of the user's workflows.
    pub async fn latest_reaction_outputs(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<ReactionOutput>, WorkflowError> {
        Ok(self.outputs.latest_for_user(user_id).await?)
    }

    /// Latest reaction output of one workflow, if it ever produced one.
    pub async fn latest_reaction_output(
        &self,
        id: &WorkflowId,
    ) -> Result<Option<ReactionOutput>, WorkflowError> {
        Ok(self.outputs.latest(id).await?)
    }

    fn launch(&self, workflow: &Workflow, credentials: Vec<ServiceToken>) {
        if let Some(supervisor) = &self.supervisor {
            supervisor.start(workflow, credentials);
        }
    }

    async fn validate_name(&self, user_id: &UserId, name: &str) -> Result<String, WorkflowError> {
        if name.chars().count() > MAX_NAME_LEN {
            return Err(WorkflowError::InvalidName(format!(
                "name must be at most {MAX_NAME_LEN} characters"
            )));
        }
        if self.workflows.find_by_name(user_id, name).await?.is_some() {
            return Err(WorkflowError::InvalidName(format!(
                "name '{name}' is already used"
            )));
        }
        Ok(name.to_string())
    }

    /// "Workflow N" with the smallest N >= 1 the user does not already use.
    async fn generate_name(&self, user_id: &UserId) -> Result<String, WorkflowError> {
        let existing = self.workflows.find_by_user(user_id).await?;
        let used: Vec<u32> = existing
            .iter()
            .filter_map(|w| w.name.strip_prefix(GENERATED_NAME_PREFIX))
            .filter_map(|n| n.parse().ok())
            .collect();
        let n = (1..).find(|n| !used.contains(n)).unwrap_or(1);
        Ok(format!("{GENERATED_NAME_PREFIX}{n}"))
    }
}
