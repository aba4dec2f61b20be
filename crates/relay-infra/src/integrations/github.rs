//! GitHub REST API integration.

use relay_core::handler::registry::{Handler, HandlerRegistryBuilder};
use relay_core::handler::{
    ActionContext, ActionHandler, ActionOutcome, ReactionContext, ReactionHandler,
    ReactionOutcome, parse_options,
};
use relay_types::config::ServiceEndpoint;
use relay_types::error::HandlerError;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{BearerApi, counter_outcome};

pub const SERVICE: &str = "github";

pub fn register(
    builder: &mut HandlerRegistryBuilder,
    endpoint: &ServiceEndpoint,
    client: &reqwest::Client,
) {
    let api = BearerApi::new(client, &endpoint.base_url, SERVICE);
    builder
        .register(SERVICE, "pull_request", Handler::action(PullRequest { api: api.clone() }))
        .register(SERVICE, "create_release", Handler::reaction(CreateRelease { api }));
}

#[derive(Debug, Deserialize)]
struct RepoOptions {
    owner: String,
    repo: String,
}

impl RepoOptions {
    fn path(&self, suffix: &str) -> Result<String, HandlerError> {
        for (field, value) in [("owner", &self.owner), ("repo", &self.repo)] {
            if value.is_empty() || value.contains('/') {
                return Err(HandlerError::malformed(format!(
                    "invalid repository {field} '{value}'"
                )));
            }
        }
        Ok(format!("/repos/{}/{}/{suffix}", self.owner, self.repo))
    }
}

// ---------------------------------------------------------------------------
// pull_request
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PullSummary {
    number: u64,
}

/// Fires when a new pull request is opened on a repository.
///
/// Pull request numbers only grow, so the highest number seen stands in for
/// the count: state is `{"pulls": n}` with `n` the newest pull's number.
struct PullRequest {
    api: BearerApi,
}

impl ActionHandler for PullRequest {
    async fn evaluate(&self, ctx: ActionContext<'_>) -> Result<ActionOutcome, HandlerError> {
        let opts: RepoOptions = parse_options(ctx.options)?;
        let pulls: Vec<PullSummary> = self
            .api
            .get_json(
                &opts.path("pulls")?,
                &[
                    ("state", "all"),
                    ("sort", "created"),
                    ("direction", "desc"),
                    ("per_page", "1"),
                ],
                ctx.credentials,
            )
            .await?;

        let newest = pulls.first().map(|p| p.number).unwrap_or(0);
        counter_outcome(ctx.state, "pulls", newest)
    }
}

// ---------------------------------------------------------------------------
// create_release
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ReleaseOptions {
    #[serde(flatten)]
    repo: RepoOptions,
    tag_name: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    body: Option<String>,
}

struct CreateRelease {
    api: BearerApi,
}

impl ReactionHandler for CreateRelease {
    async fn execute(&self, ctx: ReactionContext<'_>) -> Result<ReactionOutcome, HandlerError> {
        let opts: ReleaseOptions = parse_options(ctx.options)?;
        if opts.tag_name.trim().is_empty() {
            return Err(HandlerError::malformed("release tag_name is empty"));
        }

        let mut body = Map::new();
        body.insert("tag_name".into(), Value::String(opts.tag_name));
        if let Some(name) = opts.name {
            body.insert("name".into(), Value::String(name));
        }
        if let Some(text) = opts.body {
            body.insert("body".into(), Value::String(text));
        }

        let response = self
            .api
            .post_json(&opts.repo.path("releases")?, &Value::Object(body), ctx.credentials)
            .await?;
        Ok(ReactionOutcome { output: response })
    }
}
