//! WeatherAPI integration: feels-like threshold and sunrise actions, plus a
//! current-conditions reaction.
//!
//! Authenticated with a single API key from configuration rather than a
//! per-user token.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use relay_core::handler::registry::{Handler, HandlerRegistryBuilder};
use relay_core::handler::{
    ActionContext, ActionHandler, ActionOutcome, ReactionContext, ReactionHandler,
    ReactionOutcome, parse_options,
};
use relay_types::compare::CompareOp;
use relay_types::config::WeatherConfig;
use relay_types::error::HandlerError;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use super::{check_status, number_or_string, read_json, send_error};

pub const SERVICE: &str = "weather";

pub fn register(
    builder: &mut HandlerRegistryBuilder,
    config: &WeatherConfig,
    client: &reqwest::Client,
) {
    let api = WeatherApi::new(client, config);
    builder
        .register(SERVICE, "feels_like", Handler::action(FeelsLike { api: api.clone() }))
        .register(SERVICE, "sunrise", Handler::action(Sunrise { api: api.clone() }))
        .register(SERVICE, "current_weather", Handler::reaction(CurrentWeather { api }));
}

#[derive(Clone)]
struct WeatherApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl WeatherApi {
    fn new(client: &reqwest::Client, config: &WeatherConfig) -> Self {
        Self {
            client: client.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().map(SecretString::from),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: &[(&str, &str)],
    ) -> Result<T, HandlerError> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| HandlerError::unauthorized("no weather API key configured"))?;

        let response = self
            .client
            .get(format!("{}/{endpoint}", self.base_url))
            .query(&[("key", key.expose_secret())])
            .query(query)
            .send()
            .await
            .map_err(send_error)?;

        read_json(check_status(response).await?).await
    }

    async fn current(&self, city: &str, lang: Option<&str>) -> Result<Value, HandlerError> {
        let mut query = vec![("q", city), ("aqi", "no")];
        if let Some(lang) = lang {
            query.push(("lang", lang));
        }
        self.get("current.json", &query).await
    }
}

// ---------------------------------------------------------------------------
// feels_like
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FeelsLikeOptions {
    city: String,
    #[serde(default)]
    lang: Option<String>,
    #[serde(deserialize_with = "number_or_string")]
    temperature: f64,
    compare_sign: CompareOp,
}

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    current: CurrentConditions,
}

#[derive(Debug, Deserialize)]
struct CurrentConditions {
    feelslike_c: f64,
}

/// Fires while `feelslike_c <compare_sign> temperature` holds.
struct FeelsLike {
    api: WeatherApi,
}

impl ActionHandler for FeelsLike {
    async fn evaluate(&self, ctx: ActionContext<'_>) -> Result<ActionOutcome, HandlerError> {
        let opts: FeelsLikeOptions = parse_options(ctx.options)?;
        let body = self.api.current(&opts.city, opts.lang.as_deref()).await?;
        let reading: CurrentResponse = serde_json::from_value(body)
            .map_err(|e| HandlerError::malformed(format!("unexpected weather response: {e}")))?;

        let feels_like = reading.current.feelslike_c;
        let state = json!({ "feelslike_c": feels_like });
        tracing::debug!(
            workflow_id = %ctx.workflow_id,
            city = %opts.city,
            feels_like,
            threshold = opts.temperature,
            sign = %opts.compare_sign,
            "feels-like reading"
        );

        if opts.compare_sign.apply(feels_like, opts.temperature) {
            Ok(ActionOutcome::fire(state))
        } else {
            Ok(ActionOutcome::hold(state))
        }
    }
}

// ---------------------------------------------------------------------------
// sunrise
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SunriseOptions {
    city: String,
    #[serde(default)]
    date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AstronomyResponse {
    #[serde(default)]
    location: Option<Location>,
    astronomy: Astronomy,
}

#[derive(Debug, Deserialize)]
struct Location {
    localtime: String,
}

#[derive(Debug, Deserialize)]
struct Astronomy {
    astro: Astro,
}

#[derive(Debug, Deserialize)]
struct Astro {
    sunrise: String,
}

/// Fires once per day, during the minute of sunrise at the city's local time.
///
/// State records the date it last fired on: `{"fired_on": "YYYY-MM-DD"}`.
struct Sunrise {
    api: WeatherApi,
}

impl ActionHandler for Sunrise {
    async fn evaluate(&self, ctx: ActionContext<'_>) -> Result<ActionOutcome, HandlerError> {
        let opts: SunriseOptions = parse_options(ctx.options)?;
        let mut query = vec![("q", opts.city.as_str())];
        if let Some(date) = opts.date.as_deref() {
            query.push(("dt", date));
        }
        let body: AstronomyResponse = self.api.get("astronomy.json", &query).await?;

        let sunrise = NaiveTime::parse_from_str(body.astronomy.astro.sunrise.trim(), "%I:%M %p")
            .map_err(|e| {
                HandlerError::malformed(format!(
                    "unreadable sunrise '{}': {e}",
                    body.astronomy.astro.sunrise
                ))
            })?;
        let now = match body.location {
            Some(location) => parse_localtime(&location.localtime)?,
            None => chrono::Local::now().naive_local(),
        };

        let today = now.date();
        if fired_on(ctx.state) == Some(today) {
            return Ok(ActionOutcome::hold(ctx.state.clone()));
        }

        if (now.hour(), now.minute()) == (sunrise.hour(), sunrise.minute()) {
            Ok(ActionOutcome::fire(
                json!({ "fired_on": today.format("%Y-%m-%d").to_string() }),
            ))
        } else {
            Ok(ActionOutcome::hold(ctx.state.clone()))
        }
    }
}

fn parse_localtime(raw: &str) -> Result<NaiveDateTime, HandlerError> {
    NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M")
        .map_err(|e| HandlerError::malformed(format!("unreadable local time '{raw}': {e}")))
}

fn fired_on(state: &Value) -> Option<NaiveDate> {
    state
        .get("fired_on")
        .and_then(Value::as_str)
        .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
}

// ---------------------------------------------------------------------------
// current_weather
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CurrentWeatherOptions {
    city: String,
    #[serde(default)]
    lang: Option<String>,
}

/// Fetches current conditions; the response becomes the reaction output.
struct CurrentWeather {
    api: WeatherApi,
}

impl ReactionHandler for CurrentWeather {
    async fn execute(&self, ctx: ReactionContext<'_>) -> Result<ReactionOutcome, HandlerError> {
        let opts: CurrentWeatherOptions = parse_options(ctx.options)?;
        let body = self.api.current(&opts.city, opts.lang.as_deref()).await?;
        Ok(ReactionOutcome::with_output(body))
    }
}
