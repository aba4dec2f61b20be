//! Microsoft Graph integration (Outlook calendar and mail).

use relay_core::handler::registry::{Handler, HandlerRegistryBuilder};
use relay_core::handler::{
    ActionContext, ActionHandler, ActionOutcome, ReactionContext, ReactionHandler,
    ReactionOutcome, parse_options,
};
use relay_types::config::ServiceEndpoint;
use relay_types::error::HandlerError;
use serde::Deserialize;
use serde_json::json;

use super::{BearerApi, counter_outcome};

pub const SERVICE: &str = "microsoft";

/// Number of most recent calendar events inspected per poll.
const EVENT_WINDOW: &str = "50";

pub fn register(
    builder: &mut HandlerRegistryBuilder,
    endpoint: &ServiceEndpoint,
    client: &reqwest::Client,
) {
    let api = BearerApi::new(client, &endpoint.base_url, SERVICE);
    builder
        .register(SERVICE, "outlook_event", Handler::action(OutlookEvent { api: api.clone() }))
        .register(SERVICE, "send_mail", Handler::reaction(SendMail { api }));
}

// ---------------------------------------------------------------------------
// outlook_event
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct EventOptions {
    subject: String,
}

#[derive(Debug, Deserialize)]
struct EventPage {
    value: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct Event {
    #[serde(default)]
    subject: Option<String>,
}

/// Fires when more recent calendar events mention `subject` than last time.
/// Matching is a case-insensitive substring test. State: `{"matches": n}`.
struct OutlookEvent {
    api: BearerApi,
}

impl ActionHandler for OutlookEvent {
    async fn evaluate(&self, ctx: ActionContext<'_>) -> Result<ActionOutcome, HandlerError> {
        let opts: EventOptions = parse_options(ctx.options)?;
        let needle = opts.subject.to_lowercase();

        let page: EventPage = self
            .api
            .get_json(
                "/me/events",
                &[
                    ("$select", "subject"),
                    ("$orderby", "createdDateTime desc"),
                    ("$top", EVENT_WINDOW),
                ],
                ctx.credentials,
            )
            .await?;

        let matches = page
            .value
            .iter()
            .filter_map(|e| e.subject.as_deref())
            .filter(|s| s.to_lowercase().contains(&needle))
            .count() as u64;

        counter_outcome(ctx.state, "matches", matches)
    }
}

// ---------------------------------------------------------------------------
// send_mail
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct MailOptions {
    subject: String,
    body: MailBody,
    address: String,
    #[serde(default = "default_save_to_sent_items")]
    save_to_sent_items: bool,
}

#[derive(Debug, Deserialize)]
struct MailBody {
    #[serde(rename = "contentType", alias = "content_type", default = "default_content_type")]
    content_type: String,
    content: String,
}

fn default_save_to_sent_items() -> bool {
    true
}

fn default_content_type() -> String {
    "Text".to_string()
}

/// Sends one mail from the token owner's mailbox.
struct SendMail {
    api: BearerApi,
}

impl ReactionHandler for SendMail {
    async fn execute(&self, ctx: ReactionContext<'_>) -> Result<ReactionOutcome, HandlerError> {
        let opts: MailOptions = parse_options(ctx.options)?;
        if !opts.address.contains('@') {
            return Err(HandlerError::malformed(format!(
                "'{}' is not a mail address",
                opts.address
            )));
        }

        let message = json!({
            "message": {
                "subject": opts.subject,
                "body": {
                    "contentType": opts.body.content_type,
                    "content": opts.body.content,
                },
                "toRecipients": [
                    { "emailAddress": { "address": opts.address } }
                ],
            },
            "saveToSentItems": opts.save_to_sent_items,
        });

        // Graph answers 202 with an empty body.
        self.api
            .post_json("/me/sendMail", &message, ctx.credentials)
            .await?;

        Ok(ReactionOutcome::with_output(json!({
            "sent_to": opts.address,
            "subject": opts.subject,
        })))
    }
}
