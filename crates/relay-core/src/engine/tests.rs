use std::sync::Arc;
use std::time::Duration;

use relay_types::credential::ServiceToken;
use relay_types::workflow::{HandlerDescriptor, UserId, Workflow};
use serde_json::json;

use super::supervisor::Supervisor;
use crate::handler::registry::{Handler, HandlerRegistry};
use crate::repository::credential::CredentialRepository;
use crate::repository::workflow::WorkflowRepository;
use crate::testing::{
    CountingEffect, Gate, GatedEffect, GatedSensor, MemoryStore, ScriptedSensor, TokenGatedSensor,
    registry, threshold_workflow, wait_until,
};

const POLL: Duration = Duration::from_millis(10);
const PATIENCE: Duration = Duration::from_secs(2);

fn gated_registry(sensor: &Gate, effect: &Gate) -> Arc<HandlerRegistry> {
    let mut builder = HandlerRegistry::builder();
    builder
        .register("sensor", "gated", Handler::action(GatedSensor(sensor.clone())))
        .register("effect", "gated", Handler::reaction(GatedEffect(effect.clone())))
        .register("effect", "count", Handler::reaction(CountingEffect::default()));
    Arc::new(builder.build())
}

fn gated_workflow(reaction: &str) -> Workflow {
    Workflow::new(
        UserId::new(),
        "Workflow 1",
        HandlerDescriptor::new("sensor", "gated", json!({})),
        HandlerDescriptor::new("effect", reaction, json!({})),
    )
}

fn supervisor(
    store: &Arc<MemoryStore>,
    registry: Arc<HandlerRegistry>,
    poll: Duration,
) -> Supervisor<MemoryStore, MemoryStore, MemoryStore> {
    Supervisor::new(
        Arc::clone(store),
        Arc::clone(store),
        Arc::clone(store),
        registry,
        poll,
    )
}

#[tokio::test]
async fn reading_above_threshold_sets_flag_until_reaction_succeeds() {
    let store = MemoryStore::new();
    let sensor = ScriptedSensor::new(&[25.0, 15.0]);
    let effect = CountingEffect::failing(usize::MAX);
    let supervisor = supervisor(&store, registry(&sensor, &effect), POLL);

    let workflow = threshold_workflow(UserId::new(), 20.0);
    let id = workflow.id;
    store.insert(workflow.clone());
    assert!(supervisor.start(&workflow, vec![]));

    // The reaction keeps failing: the flag stays set and the reaction is
    // retried on every handshake.
    assert!(wait_until(PATIENCE, || effect.calls() >= 3).await);
    assert!(store.get(&id).unwrap().trigger_flag);
    assert!(store.output(&id).is_none());
    assert_eq!(store.flag_writes(), vec![(id, false, true)]);

    supervisor.stop(&id);
}

#[tokio::test]
async fn reaction_clears_flag_and_stores_output() {
    let store = MemoryStore::new();
    let sensor = ScriptedSensor::new(&[25.0, 15.0]);
    let effect = CountingEffect::default();
    let supervisor = supervisor(&store, registry(&sensor, &effect), POLL);

    let workflow = threshold_workflow(UserId::new(), 20.0);
    let id = workflow.id;
    store.insert(workflow.clone());
    supervisor.start(&workflow, vec![]);

    assert!(wait_until(PATIENCE, || store.output(&id).is_some()).await);
    assert!(!store.get(&id).unwrap().trigger_flag);
    assert_eq!(store.output(&id).unwrap().payload, json!({"call": 1}));

    // Further polls below the threshold never fire again.
    let polls = sensor.calls();
    assert!(wait_until(PATIENCE, || sensor.calls() >= polls + 5).await);
    assert_eq!(effect.calls(), 1);
    assert_eq!(store.flag_writes(), vec![(id, false, true), (id, true, false)]);

    supervisor.stop(&id);
}

#[tokio::test]
async fn reading_below_threshold_never_fires() {
    let store = MemoryStore::new();
    let sensor = ScriptedSensor::new(&[15.0]);
    let effect = CountingEffect::default();
    let supervisor = supervisor(&store, registry(&sensor, &effect), POLL);

    let workflow = threshold_workflow(UserId::new(), 20.0);
    let id = workflow.id;
    store.insert(workflow.clone());
    supervisor.start(&workflow, vec![]);

    assert!(wait_until(PATIENCE, || sensor.calls() >= 5).await);
    assert!(!store.get(&id).unwrap().trigger_flag);
    assert!(store.flag_writes().is_empty());
    assert_eq!(effect.calls(), 0);

    supervisor.stop(&id);
}

#[tokio::test]
async fn firing_again_requires_a_fresh_transition() {
    let store = MemoryStore::new();
    let sensor = ScriptedSensor::new(&[25.0, 15.0]);
    let effect = CountingEffect::default();
    let supervisor = supervisor(&store, registry(&sensor, &effect), POLL);

    let workflow = threshold_workflow(UserId::new(), 20.0);
    let id = workflow.id;
    store.insert(workflow.clone());
    supervisor.start(&workflow, vec![]);

    assert!(wait_until(PATIENCE, || effect.calls() == 1).await);
    let polls = sensor.calls();
    assert!(wait_until(PATIENCE, || sensor.calls() >= polls + 3).await);
    assert_eq!(effect.calls(), 1);

    sensor.push(&[25.0, 15.0]);
    assert!(wait_until(PATIENCE, || effect.calls() == 2).await);
    assert!(wait_until(PATIENCE, || !store.get(&id).unwrap().trigger_flag).await);

    let writes = store.flag_writes();
    assert_eq!(writes.len(), 4);
    for (_, before, after) in writes {
        assert_ne!(before, after, "flag written to its current value");
    }

    supervisor.stop(&id);
}

#[tokio::test]
async fn accumulated_state_flows_into_next_poll() {
    let store = MemoryStore::new();
    let sensor = ScriptedSensor::new(&[15.0]);
    let effect = CountingEffect::default();
    let supervisor = supervisor(&store, registry(&sensor, &effect), POLL);

    let workflow = threshold_workflow(UserId::new(), 20.0);
    let id = workflow.id;
    store.insert(workflow.clone());
    supervisor.start(&workflow, vec![]);

    assert!(wait_until(PATIENCE, || sensor.calls() >= 4).await);
    supervisor.stop(&id);

    let seen = sensor.seen_states();
    assert_eq!(seen[0], serde_json::Value::Null);
    assert_eq!(seen[1], json!({"polls": 1}));
    assert_eq!(seen[2], json!({"polls": 2}));
    assert_eq!(seen[3], json!({"polls": 3}));
}

#[tokio::test]
async fn deactivation_stops_both_cycles() {
    let store = MemoryStore::new();
    let sensor = ScriptedSensor::new(&[15.0]);
    let effect = CountingEffect::default();
    let supervisor = supervisor(&store, registry(&sensor, &effect), POLL);

    let workflow = threshold_workflow(UserId::new(), 20.0);
    let id = workflow.id;
    store.insert(workflow.clone());
    supervisor.start(&workflow, vec![]);
    assert!(wait_until(PATIENCE, || sensor.calls() >= 2).await);

    store.deactivate(&id);
    assert!(wait_until(PATIENCE, || supervisor.running_count() == 0).await);

    let polls = sensor.calls();
    tokio::time::sleep(POLL * 5).await;
    assert_eq!(sensor.calls(), polls);
}

#[tokio::test]
async fn removed_record_stops_both_cycles() {
    let store = MemoryStore::new();
    let sensor = ScriptedSensor::new(&[15.0]);
    let effect = CountingEffect::default();
    let supervisor = supervisor(&store, registry(&sensor, &effect), POLL);

    let workflow = threshold_workflow(UserId::new(), 20.0);
    let id = workflow.id;
    store.insert(workflow.clone());
    supervisor.start(&workflow, vec![]);
    assert!(wait_until(PATIENCE, || sensor.calls() >= 1).await);

    store.remove(&id);
    assert!(wait_until(PATIENCE, || !supervisor.is_running(&id)).await);
}

#[tokio::test]
async fn stop_cancels_without_waiting_for_the_poll_interval() {
    let store = MemoryStore::new();
    let sensor = ScriptedSensor::new(&[15.0]);
    let effect = CountingEffect::default();
    let supervisor = supervisor(&store, registry(&sensor, &effect), Duration::from_secs(60));

    let workflow = threshold_workflow(UserId::new(), 20.0);
    let id = workflow.id;
    store.insert(workflow.clone());
    supervisor.start(&workflow, vec![]);
    assert!(wait_until(PATIENCE, || sensor.calls() == 1).await);

    assert!(supervisor.stop(&id));
    assert!(!supervisor.is_running(&id));
    assert!(wait_until(Duration::from_millis(500), || supervisor.running_count() == 0).await);
    assert_eq!(sensor.calls(), 1);
}

#[tokio::test]
async fn start_twice_keeps_one_pair() {
    let store = MemoryStore::new();
    let sensor = ScriptedSensor::new(&[15.0]);
    let effect = CountingEffect::default();
    let supervisor = supervisor(&store, registry(&sensor, &effect), POLL);

    let workflow = threshold_workflow(UserId::new(), 20.0);
    store.insert(workflow.clone());
    assert!(supervisor.start(&workflow, vec![]));
    assert!(!supervisor.start(&workflow, vec![]));
    assert_eq!(supervisor.running_count(), 1);

    supervisor.stop_all();
    assert!(wait_until(PATIENCE, || supervisor.running_count() == 0).await);

    // A stopped workflow can be started again.
    assert!(supervisor.start(&workflow, vec![]));
    assert!(supervisor.is_running(&workflow.id));
    supervisor.stop_all();
}

#[tokio::test]
async fn shutdown_waits_for_every_cycle_to_exit() {
    let store = MemoryStore::new();
    let sensor = ScriptedSensor::new(&[15.0]);
    let effect = CountingEffect::default();
    let supervisor = supervisor(&store, registry(&sensor, &effect), Duration::from_secs(60));

    for _ in 0..3 {
        let workflow = threshold_workflow(UserId::new(), 20.0);
        store.insert(workflow.clone());
        supervisor.start(&workflow, vec![]);
    }
    assert!(wait_until(PATIENCE, || sensor.calls() == 3).await);

    assert!(supervisor.shutdown(PATIENCE).await);
    assert_eq!(supervisor.running_count(), 0);
}

#[tokio::test]
async fn workflows_of_one_user_do_not_interfere() {
    let store = MemoryStore::new();
    let hot = ScriptedSensor::new(&[25.0, 15.0]);
    let cold = ScriptedSensor::new(&[15.0]);
    let effect = CountingEffect::default();

    let mut builder = HandlerRegistry::builder();
    builder
        .register("sensor", "hot", Handler::action(hot.clone()))
        .register("sensor", "cold", Handler::action(cold.clone()))
        .register("effect", "count", Handler::reaction(effect.clone()));
    let supervisor = supervisor(&store, Arc::new(builder.build()), POLL);

    let user = UserId::new();
    let options = json!({"threshold": 20.0, "sign": ">"});
    let reaction = HandlerDescriptor::new("effect", "count", json!({}));
    let first = Workflow::new(
        user,
        "Workflow 1",
        HandlerDescriptor::new("sensor", "hot", options.clone()),
        reaction.clone(),
    );
    let second = Workflow::new(
        user,
        "Workflow 2",
        HandlerDescriptor::new("sensor", "cold", options),
        reaction,
    );
    store.insert(first.clone());
    store.insert(second.clone());
    supervisor.start(&first, vec![]);
    supervisor.start(&second, vec![]);
    assert_eq!(supervisor.running_count(), 2);

    assert!(wait_until(PATIENCE, || store.output(&first.id).is_some()).await);
    assert!(wait_until(PATIENCE, || cold.calls() >= 5).await);
    assert!(store.output(&second.id).is_none());
    assert!(!store.get(&second.id).unwrap().trigger_flag);
    assert!(store.flag_writes().iter().all(|(id, _, _)| *id == first.id));

    // Disabling one leaves the other running.
    store.deactivate(&first.id);
    assert!(wait_until(PATIENCE, || !supervisor.is_running(&first.id)).await);
    assert!(supervisor.is_running(&second.id));
    supervisor.stop_all();
}

#[tokio::test]
async fn unknown_action_handler_stops_both_cycles() {
    let store = MemoryStore::new();
    let sensor = ScriptedSensor::new(&[15.0]);
    let effect = CountingEffect::default();
    let supervisor = supervisor(&store, registry(&sensor, &effect), POLL);

    let workflow = Workflow::new(
        UserId::new(),
        "Workflow 1",
        HandlerDescriptor::new("sensor", "missing", json!({})),
        HandlerDescriptor::new("effect", "count", json!({})),
    );
    store.insert(workflow.clone());
    supervisor.start(&workflow, vec![]);

    assert!(wait_until(PATIENCE, || supervisor.running_count() == 0).await);
    assert_eq!(effect.calls(), 0);
}

#[tokio::test]
async fn unknown_reaction_handler_stops_both_cycles() {
    let store = MemoryStore::new();
    let sensor = ScriptedSensor::new(&[25.0]);
    let effect = CountingEffect::default();
    let supervisor = supervisor(&store, registry(&sensor, &effect), POLL);

    let workflow = Workflow::new(
        UserId::new(),
        "Workflow 1",
        HandlerDescriptor::new("sensor", "threshold", json!({"threshold": 20.0, "sign": ">"})),
        HandlerDescriptor::new("effect", "missing", json!({})),
    );
    let id = workflow.id;
    store.insert(workflow.clone());
    supervisor.start(&workflow, vec![]);

    assert!(wait_until(PATIENCE, || supervisor.running_count() == 0).await);
    let polls = sensor.calls();
    tokio::time::sleep(POLL * 5).await;
    assert_eq!(sensor.calls(), polls);
    // The trigger was observed but never consumed.
    assert!(store.get(&id).unwrap().trigger_flag);
}

#[tokio::test]
async fn panicking_reaction_cancels_action_cycle() {
    let store = MemoryStore::new();
    let sensor = ScriptedSensor::new(&[25.0]);
    let effect = CountingEffect::default();
    let supervisor = supervisor(&store, registry(&sensor, &effect), POLL);

    let workflow = Workflow::new(
        UserId::new(),
        "Workflow 1",
        HandlerDescriptor::new("sensor", "threshold", json!({"threshold": 20.0, "sign": ">"})),
        HandlerDescriptor::new("effect", "panic", json!({})),
    );
    store.insert(workflow.clone());
    supervisor.start(&workflow, vec![]);

    assert!(wait_until(PATIENCE, || supervisor.running_count() == 0).await);
    let polls = sensor.calls();
    tokio::time::sleep(POLL * 5).await;
    assert_eq!(sensor.calls(), polls);
}

#[tokio::test]
async fn unauthorized_handler_refetches_credentials() {
    let store = MemoryStore::new();
    let gated = TokenGatedSensor::default();
    let effect = CountingEffect::default();
    let mut builder = HandlerRegistry::builder();
    builder
        .register("sensor", "gated", Handler::action(gated.clone()))
        .register("effect", "count", Handler::reaction(effect.clone()));
    let supervisor = supervisor(&store, Arc::new(builder.build()), POLL);

    let user = UserId::new();
    let workflow = Workflow::new(
        user,
        "Workflow 1",
        HandlerDescriptor::new("sensor", "gated", json!({})),
        HandlerDescriptor::new("effect", "count", json!({})),
    );
    store.insert(workflow.clone());
    store
        .save_token(&ServiceToken::new(user, "sensor", "fresh"))
        .await
        .unwrap();

    // Started with an expired token: the first poll is rejected, the cycle
    // re-fetches and the next poll fires.
    let stale = vec![ServiceToken::new(user, "sensor", "expired")];
    supervisor.start(&workflow, stale);

    assert!(wait_until(PATIENCE, || store.output(&workflow.id).is_some()).await);
    assert!(gated.calls() >= 2);
    assert_eq!(store.token_fetches(), 1);

    supervisor.stop_all();
}

#[tokio::test]
async fn handlers_run_without_holding_the_record_lock() {
    let store = MemoryStore::new();
    let sensor = Gate::default();
    let effect = Gate::default();
    let supervisor = supervisor(&store, gated_registry(&sensor, &effect), POLL);

    let workflow = gated_workflow("gated");
    let id = workflow.id;
    store.insert(workflow.clone());
    supervisor.start(&workflow, vec![]);

    // First poll fires; the reaction blocks in its handler and the action
    // blocks in its second poll.
    sensor.release(1);
    assert!(
        wait_until(PATIENCE, || {
            effect.in_flight() == 1 && sensor.calls() == 2 && sensor.in_flight() == 1
        })
        .await
    );

    // The reaction acknowledges while the action is inside its handler.
    effect.release(1);
    assert!(
        wait_until(PATIENCE, || {
            store.output(&id).is_some() && !store.get(&id).unwrap().trigger_flag
        })
        .await
    );
    assert_eq!(sensor.in_flight(), 1);

    // The second poll fires again; the reaction blocks on it and the action
    // blocks in its third poll.
    sensor.release(1);
    assert!(
        wait_until(PATIENCE, || {
            effect.calls() == 2 && effect.in_flight() == 1 && sensor.calls() == 3
        })
        .await
    );
    assert_eq!(store.get(&id).unwrap().accumulated_state, json!({"polls": 2}));

    // The action applies its third poll while the reaction is inside its
    // handler.
    sensor.release(1);
    assert!(
        wait_until(PATIENCE, || {
            store.get(&id).unwrap().accumulated_state == json!({"polls": 3})
        })
        .await
    );
    assert_eq!(effect.in_flight(), 1);

    effect.release(1);
    assert!(wait_until(PATIENCE, || !store.get(&id).unwrap().trigger_flag).await);

    // Each cycle's write was a complete transition: the writes alternate.
    assert_eq!(
        store.flag_writes(),
        vec![(id, false, true), (id, true, false), (id, false, true), (id, true, false)]
    );

    supervisor.stop_all();
    sensor.release(100);
    effect.release(100);
    assert!(supervisor.shutdown(PATIENCE).await);
}

#[tokio::test]
async fn poll_finishing_after_stop_is_not_persisted() {
    let store = MemoryStore::new();
    let sensor = Gate::default();
    let effect = Gate::default();
    let supervisor = supervisor(&store, gated_registry(&sensor, &effect), POLL);

    let workflow = gated_workflow("count");
    let id = workflow.id;
    store.insert(workflow.clone());
    supervisor.start(&workflow, vec![]);
    assert!(wait_until(PATIENCE, || sensor.in_flight() == 1).await);

    store.deactivate(&id);
    supervisor.stop(&id);
    sensor.release(1);
    assert!(supervisor.shutdown(PATIENCE).await);

    let stored = store.get(&id).unwrap();
    assert!(!stored.trigger_flag);
    assert!(stored.accumulated_state.is_null());
    assert!(store.flag_writes().is_empty());
}

#[tokio::test]
async fn reaction_finishing_after_stop_leaves_trigger_pending() {
    let store = MemoryStore::new();
    let sensor = Gate::default();
    let effect = Gate::default();
    let supervisor = supervisor(&store, gated_registry(&sensor, &effect), POLL);

    let workflow = gated_workflow("gated");
    let id = workflow.id;
    store.insert(workflow.clone());
    supervisor.start(&workflow, vec![]);
    sensor.release(1);
    assert!(wait_until(PATIENCE, || effect.in_flight() == 1).await);

    store.deactivate(&id);
    supervisor.stop(&id);
    effect.release(1);
    sensor.release(100);
    assert!(supervisor.shutdown(PATIENCE).await);

    assert!(store.get(&id).unwrap().trigger_flag);
    assert!(store.output(&id).is_none());
    assert_eq!(store.flag_writes(), vec![(id, false, true)]);
}

#[tokio::test]
async fn restart_waits_for_the_stopped_pair_to_exit() {
    let store = MemoryStore::new();
    let sensor = Gate::default();
    let effect = Gate::default();
    let supervisor = supervisor(&store, gated_registry(&sensor, &effect), POLL);

    let workflow = gated_workflow("count");
    let id = workflow.id;
    store.insert(workflow.clone());
    supervisor.start(&workflow, vec![]);
    assert!(wait_until(PATIENCE, || sensor.in_flight() == 1).await);

    // Disable and re-enable while the first poll is still in flight.
    store.deactivate(&id);
    supervisor.stop(&id);
    store.set_active(&id, true).await.unwrap();
    assert!(supervisor.start(&workflow, vec![]));
    assert!(supervisor.is_running(&id));

    // The new pair has not polled yet.
    tokio::time::sleep(POLL * 5).await;
    assert_eq!(sensor.calls(), 1);

    sensor.release(1);
    assert!(wait_until(PATIENCE, || sensor.calls() == 2).await);
    sensor.release(1);
    assert!(wait_until(PATIENCE, || sensor.calls() == 3).await);
    assert_eq!(sensor.max_in_flight(), 1);

    // Only the new pair wrote the trigger.
    assert!(wait_until(PATIENCE, || store.output(&id).is_some()).await);
    assert_eq!(store.flag_writes()[0], (id, false, true));
    assert_eq!(supervisor.running_count(), 1);

    supervisor.stop_all();
    sensor.release(100);
    assert!(supervisor.shutdown(PATIENCE).await);
}
