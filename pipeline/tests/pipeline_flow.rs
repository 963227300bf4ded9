use config::QueueConfig;
use errors::TransportError;
use hcp_core::{Broker, Stage, StageMessage, ZoneMapping};
use pipeline::{
    AssignPrivilegeHandler, Collaborators, CreatePersonHandler, Orchestrator, PipelineError,
    StageHandler, UpdateIdentifierHandler, run_consumer
};
use queue::MemoryBroker;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use testing::{AccessCall, RecordingAccessControl, StaticPhotoSource, jane, jane_json};
use tokio::sync::oneshot;

fn collaborators(access: &Arc<RecordingAccessControl>) -> Collaborators {
    Collaborators {
        access: access.clone(),
        photos: Arc::new(StaticPhotoSource::default()),
        zones: Arc::new(ZoneMapping::default()),
        queues: QueueConfig::default()
    }
}

async fn wait_until(mut done: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn publish(broker: &MemoryBroker, queue: &str, body: &[u8]) {
    broker
        .publisher()
        .await
        .unwrap()
        .publish(queue, body)
        .await
        .unwrap();
}

fn create_message() -> Vec<u8> {
    json!({"stage": "create_person", "payload": jane_json()})
        .to_string()
        .into_bytes()
}

#[tokio::test]
async fn test_jane_flows_through_every_stage() {
    let broker = MemoryBroker::default();
    let queues = QueueConfig::default();
    let access = Arc::new(RecordingAccessControl::default());
    let photos = Arc::new(StaticPhotoSource::default());

    let create = CreatePersonHandler::new(
        access.clone(),
        photos,
        broker.publisher().await.unwrap(),
        &queues.update_identifier
    );
    let update = UpdateIdentifierHandler::new(
        access.clone(),
        Arc::new(ZoneMapping::default()),
        broker.publisher().await.unwrap(),
        &queues.assign_privilege
    );
    let assign = AssignPrivilegeHandler::new(access.clone());

    create.handle(&create_message()).await.unwrap();
    let forwarded = broker.messages(&queues.update_identifier);
    let value: Value = serde_json::from_slice(&forwarded[0]).unwrap();
    assert_eq!(value["stage"], "update_identifier");
    assert_eq!(value["payload"]["personId"], "P1");
    assert_eq!(value["payload"]["kib_number"], "K1");
    assert_eq!(value["payload"]["employee"]["identity_number"], "123");
    assert_eq!(value["payload"]["employee"]["regionals"][0]["slug"], "zona-i");

    update.handle(&forwarded[0]).await.unwrap();
    let forwarded = broker.messages(&queues.assign_privilege);
    let value: Value = serde_json::from_slice(&forwarded[0]).unwrap();
    assert_eq!(
        value,
        json!({
            "stage": "assign_privilege",
            "payload": {"personId": "P1", "privilege_groups": ["1"]}
        })
    );

    assign.handle(&forwarded[0]).await.unwrap();
    assert_eq!(
        access.calls(),
        vec![
            AccessCall::CreatePerson {
                person_code: "123".to_string(),
                name: "Jane".to_string(),
                face_data: String::new()
            },
            AccessCall::UpdateIdentifier {
                person_id: "P1".to_string(),
                kib_number: "K1".to_string()
            },
            AccessCall::AssignPrivilegeGroups {
                person_id: "P1".to_string(),
                privilege_group_ids: vec!["1".to_string()]
            }
        ]
    );
}

#[tokio::test]
async fn test_orchestrator_runs_all_stages_until_shutdown() {
    let broker = MemoryBroker::default();
    let queues = QueueConfig::default();
    let access = Arc::new(RecordingAccessControl::default());
    publish(&broker, &queues.create_person, &create_message()).await;

    let orchestrator = Orchestrator::new(Arc::new(broker.clone()), collaborators(&access));
    let (stop, stopped) = oneshot::channel::<()>();
    let running = tokio::spawn(async move {
        orchestrator
            .run(async {
                let _ = stopped.await;
            })
            .await
    });

    wait_until(|| access.calls().len() == 3).await;
    stop.send(()).unwrap();
    running.await.unwrap().unwrap();

    for stage in Stage::ALL {
        let queue = queues.for_stage(stage);
        assert!(broker.is_empty(queue), "{queue} not drained");
        assert!(broker.is_empty(&queues.dead_letter(queue)));
    }
}

#[tokio::test]
async fn test_malformed_message_is_dead_lettered() {
    let broker = MemoryBroker::default();
    let queues = QueueConfig::default();
    let access = Arc::new(RecordingAccessControl::default());
    publish(&broker, &queues.update_identifier, b"{\"personId\": 42}").await;

    let orchestrator = Orchestrator::new(Arc::new(broker.clone()), collaborators(&access));
    let (stop, stopped) = oneshot::channel::<()>();
    let running = tokio::spawn(async move {
        orchestrator
            .run(async {
                let _ = stopped.await;
            })
            .await
    });

    let dlq = queues.dead_letter(&queues.update_identifier);
    wait_until(|| broker.len(&dlq) == 1).await;
    stop.send(()).unwrap();
    running.await.unwrap().unwrap();

    assert!(access.calls().is_empty());
    assert_eq!(broker.messages(&dlq), vec![b"{\"personId\": 42}".to_vec()]);
}

#[tokio::test]
async fn test_failed_probe_starts_nothing() {
    let broker = MemoryBroker::default();
    let queues = QueueConfig::default();
    let access = Arc::new(RecordingAccessControl::default());
    publish(&broker, &queues.create_person, &create_message()).await;
    broker.fail_probes(true);

    let orchestrator = Orchestrator::new(Arc::new(broker.clone()), collaborators(&access));
    let err = orchestrator.run(std::future::pending()).await.unwrap_err();

    assert!(matches!(err, PipelineError::Probe(_)));
    assert!(access.calls().is_empty());
    assert_eq!(broker.len(&queues.create_person), 1);
}

#[tokio::test]
async fn test_broker_loss_stops_the_pipeline() {
    let broker = MemoryBroker::default();
    let access = Arc::new(RecordingAccessControl::default());
    let orchestrator = Orchestrator::new(Arc::new(broker.clone()), collaborators(&access));

    let closer = broker.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        closer.close();
    });

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        orchestrator.run(std::future::pending())
    )
    .await
    .expect("pipeline kept running after broker loss")
    .unwrap_err();

    assert!(matches!(
        err,
        PipelineError::Worker {
            source: TransportError::Closed { .. },
            ..
        }
    ));
}

#[tokio::test]
async fn test_unsettled_message_is_redelivered_after_publish_failure() {
    let broker = MemoryBroker::default();
    let queues = QueueConfig::default();
    let access = Arc::new(RecordingAccessControl::default());
    publish(&broker, &queues.create_person, &create_message()).await;

    let handler = CreatePersonHandler::new(
        access.clone(),
        Arc::new(StaticPhotoSource::default()),
        broker.publisher().await.unwrap(),
        &queues.update_identifier
    );

    broker.fail_publishes(true);
    let consumer = broker.consumer(&queues.create_person).await.unwrap();
    let Err(err) = run_consumer(consumer, &handler).await;
    assert!(matches!(err, TransportError::Publish { .. }));

    // The person exists upstream and the message is still queued.
    assert_eq!(access.calls().len(), 1);
    assert_eq!(broker.len(&queues.create_person), 1);

    broker.fail_publishes(false);
    let mut consumer = broker.consumer(&queues.create_person).await.unwrap();
    let delivery = consumer.receive().await.unwrap();
    assert!(delivery.redelivered);

    let disposition = handler.handle(&delivery.body).await.unwrap();
    consumer.settle(delivery.tag, disposition).await.unwrap();

    assert_eq!(access.calls().len(), 2);
    let forwarded = broker.messages(&queues.update_identifier);
    assert_eq!(forwarded.len(), 1);
    match StageMessage::decode(&forwarded[0]).unwrap() {
        StageMessage::UpdateIdentifier(payload) => {
            assert_eq!(payload.external_person_id, "P1");
            assert_eq!(payload.employee, jane());
        }
        other => panic!("unexpected message {other:?}")
    }
}
