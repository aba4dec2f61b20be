//! Spotify Web API integration.

use relay_core::handler::registry::{Handler, HandlerRegistryBuilder};
use relay_core::handler::{
    ActionContext, ActionHandler, ActionOutcome, ReactionContext, ReactionHandler,
    ReactionOutcome, parse_options,
};
use relay_types::config::ServiceEndpoint;
use relay_types::error::HandlerError;
use serde::Deserialize;
use serde_json::json;

use super::{BearerApi, bool_or_string, counter_outcome};

pub const SERVICE: &str = "spotify";

pub fn register(
    builder: &mut HandlerRegistryBuilder,
    endpoint: &ServiceEndpoint,
    client: &reqwest::Client,
) {
    let api = BearerApi::new(client, &endpoint.base_url, SERVICE);
    builder
        .register(
            SERVICE,
            "playlist_track_added",
            Handler::action(PlaylistTrackAdded { api: api.clone() }),
        )
        .register(SERVICE, "add_track", Handler::reaction(AddTrack { api: api.clone() }))
        .register(SERVICE, "create_playlist", Handler::reaction(CreatePlaylist { api }));
}

/// Extract a Spotify object id from a share URL, a `spotify:` URI or a bare id.
///
/// `kind` is the object type as it appears in URLs ("playlist", "track").
fn spotify_id(reference: &str, kind: &str) -> Result<String, HandlerError> {
    let reference = reference.trim();
    let url_marker = format!("/{kind}/");
    let uri_prefix = format!("spotify:{kind}:");

    let id = if let Some(pos) = reference.find(&url_marker) {
        let rest = &reference[pos + url_marker.len()..];
        rest.split(['?', '/', '#']).next().unwrap_or_default()
    } else if let Some(rest) = reference.strip_prefix(&uri_prefix) {
        rest
    } else {
        reference
    };

    if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(HandlerError::malformed(format!(
            "'{reference}' is not a Spotify {kind} reference"
        )));
    }
    Ok(id.to_string())
}

// ---------------------------------------------------------------------------
// playlist_track_added
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PlaylistOptions {
    playlist_url: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistSummary {
    tracks: TrackPage,
}

#[derive(Debug, Deserialize)]
struct TrackPage {
    total: u64,
}

/// Fires when a playlist's track count grows. State: `{"tracks": n}`.
struct PlaylistTrackAdded {
    api: BearerApi,
}

impl ActionHandler for PlaylistTrackAdded {
    async fn evaluate(&self, ctx: ActionContext<'_>) -> Result<ActionOutcome, HandlerError> {
        let opts: PlaylistOptions = parse_options(ctx.options)?;
        let playlist = spotify_id(&opts.playlist_url, "playlist")?;

        let summary: PlaylistSummary = self
            .api
            .get_json(
                &format!("/playlists/{playlist}"),
                &[("fields", "tracks.total")],
                ctx.credentials,
            )
            .await?;

        counter_outcome(ctx.state, "tracks", summary.tracks.total)
    }
}

// ---------------------------------------------------------------------------
// add_track
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct AddTrackOptions {
    track_url: String,
    playlist_url: String,
}

/// Inserts a track at the top of a playlist.
struct AddTrack {
    api: BearerApi,
}

impl ReactionHandler for AddTrack {
    async fn execute(&self, ctx: ReactionContext<'_>) -> Result<ReactionOutcome, HandlerError> {
        let opts: AddTrackOptions = parse_options(ctx.options)?;
        let track = spotify_id(&opts.track_url, "track")?;
        let playlist = spotify_id(&opts.playlist_url, "playlist")?;

        let body = json!({
            "uris": [format!("spotify:track:{track}")],
            "position": 0,
        });
        let response = self
            .api
            .post_json(&format!("/playlists/{playlist}/tracks"), &body, ctx.credentials)
            .await?;

        Ok(ReactionOutcome { output: response })
    }
}

// ---------------------------------------------------------------------------
// create_playlist
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreatePlaylistOptions {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default, deserialize_with = "bool_or_string")]
    public: bool,
    #[serde(default, deserialize_with = "bool_or_string")]
    collaborative: bool,
}

/// Creates a playlist owned by the token's user.
struct CreatePlaylist {
    api: BearerApi,
}

impl ReactionHandler for CreatePlaylist {
    async fn execute(&self, ctx: ReactionContext<'_>) -> Result<ReactionOutcome, HandlerError> {
        let opts: CreatePlaylistOptions = parse_options(ctx.options)?;
        if opts.collaborative && opts.public {
            return Err(HandlerError::malformed(
                "a collaborative playlist cannot be public",
            ));
        }

        let body = json!({
            "name": opts.name,
            "description": opts.description,
            "public": opts.public,
            "collaborative": opts.collaborative,
        });
        let response = self
            .api
            .post_json("/me/playlists", &body, ctx.credentials)
            .await?;

        Ok(ReactionOutcome { output: response })
    }
}
