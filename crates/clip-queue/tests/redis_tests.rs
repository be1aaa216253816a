//! Redis job store integration tests.

use std::sync::Arc;
use std::time::Duration;

use clip_models::{JobId, JobState, PublicationId, QueueName, Strategy, SttJob, VideoId};
use clip_queue::{
    CancellationCoordinator, EnqueueOptions, JobDispatcher, QueueConfig, QueueRegistry,
    RedisConnector, StoreConnector, CANCELLED_REASON,
};

/// Config with a throwaway key prefix so runs never collide.
fn test_config() -> QueueConfig {
    dotenvy::dotenv().ok();
    QueueConfig {
        prefix: format!("clip-test-{}", uuid::Uuid::new_v4()),
        ..QueueConfig::from_env()
    }
}

fn registry() -> Arc<QueueRegistry> {
    let connector = RedisConnector::new(test_config()).expect("Failed to create connector");
    Arc::new(QueueRegistry::new(Arc::new(connector)))
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_ping() {
    let connector = RedisConnector::new(test_config()).expect("Failed to create connector");
    let store = connector.connect(QueueName::Stt).await.expect("Failed to connect");
    store.ping().await.expect("Ping failed");
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_enqueue_claim_complete() {
    let registry = registry();
    let dispatcher = JobDispatcher::new(Arc::clone(&registry));

    let job = SttJob::new(VideoId::from("v1"), "uploads/v1.mp4", Strategy::Ru);
    let id = dispatcher.enqueue(&job).await.expect("Failed to enqueue");

    let queue = registry.get_or_create(QueueName::Stt).await.unwrap();
    let claimed = queue.store().claim_next().await.unwrap().expect("No job claimed");
    assert_eq!(claimed.id, id);
    assert_eq!(claimed.state, JobState::Active);
    assert_eq!(claimed.payload::<SttJob>().unwrap(), job);

    assert!(queue.store().complete(&id).await.unwrap());
    let counts = queue.store().counts().await.unwrap();
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.active, 0);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_fail_schedules_retry() {
    let registry = registry();
    let dispatcher = JobDispatcher::new(Arc::clone(&registry));
    let job = SttJob::new(VideoId::from("v1"), "uploads/v1.mp4", Strategy::Global);
    let id = dispatcher.enqueue(&job).await.unwrap();

    let queue = registry.get_or_create(QueueName::Stt).await.unwrap();
    queue.store().claim_next().await.unwrap();
    let next = queue.store().fail(&id, "provider timeout").await.unwrap();
    assert_eq!(next, Some(JobState::Delayed));

    let stored = queue.store().get_job(&id).await.unwrap().unwrap();
    assert_eq!(stored.attempts_made, 1);
    assert!(stored.process_at >= stored.created_at + 5000);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_cancel_by_owner() {
    let registry = registry();
    let dispatcher = JobDispatcher::new(Arc::clone(&registry));
    let coordinator = CancellationCoordinator::new(Arc::clone(&registry));

    let active = dispatcher
        .enqueue(&SttJob::new(VideoId::from("A"), "a.mp4", Strategy::Ru))
        .await
        .unwrap();
    let queue = registry.get_or_create(QueueName::Stt).await.unwrap();
    queue.store().claim_next().await.unwrap();

    dispatcher
        .enqueue(&SttJob::new(VideoId::from("A"), "a.mp4", Strategy::Ru))
        .await
        .unwrap();
    let other = dispatcher
        .enqueue(&SttJob::new(VideoId::from("B"), "b.mp4", Strategy::Ru))
        .await
        .unwrap();

    let cancelled = coordinator
        .cancel_by_owner(&VideoId::from("A"), &[QueueName::Stt])
        .await
        .unwrap();
    assert_eq!(cancelled, 2);

    let failed = queue.store().get_job(&active).await.unwrap().unwrap();
    assert_eq!(failed.state, JobState::Failed);
    assert_eq!(failed.failed_reason.as_deref(), Some(CANCELLED_REASON));
    assert!(failed.cancelled);

    let waiting = queue.store().get_jobs(&[JobState::Waiting]).await.unwrap();
    assert_eq!(waiting.len(), 1);
    assert_eq!(waiting[0].id, other);
}

#[tokio::test]
#[ignore = "requires Redis"]
async fn test_publication_job_id_and_cancel() {
    let registry = registry();
    let coordinator = CancellationCoordinator::new(Arc::clone(&registry));
    let queue = registry.get_or_create(QueueName::Publish).await.unwrap();

    let options = EnqueueOptions::default()
        .with_job_id(JobId::for_publication(&PublicationId::from("p1")))
        .with_delay(Duration::from_secs(3600));
    let data = serde_json::json!({"publicationId": "p1"});
    let policy = clip_models::DEFAULT_JOB_POLICY;

    let first = queue.store().add(&data, &policy, &options).await.unwrap();
    let second = queue.store().add(&data, &policy, &options).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(queue.store().counts().await.unwrap().delayed, 1);

    assert!(coordinator
        .cancel_publication(&PublicationId::from("p1"))
        .await
        .unwrap());
    assert_eq!(queue.store().counts().await.unwrap().delayed, 0);
}
