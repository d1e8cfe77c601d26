use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use jobforge_engine::{EngineConfig, JobEngine, JobState, RecurringJobId, WorkUnit};
use jobforge_host::RecurringDriver;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn driver_triggers_due_entries_until_shutdown() {
    let engine = JobEngine::new(EngineConfig::default()).unwrap();
    let runs = Arc::new(AtomicUsize::new(0));

    let counter = runs.clone();
    engine
        .add_or_update_recurring(
            RecurringJobId::new("pulse").unwrap(),
            "host.pulse",
            WorkUnit::new(move |_ctx| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                }
            }),
            "@every 1s",
        )
        .unwrap();

    let driver = RecurringDriver::new(engine.clone(), Duration::from_millis(50));
    driver
        .run(tokio::time::sleep(Duration::from_millis(1_500)))
        .await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(runs.load(Ordering::SeqCst), 1);

    let entry = engine
        .get_recurring(&RecurringJobId::new("pulse").unwrap())
        .unwrap()
        .unwrap();
    let job = engine.get_job(entry.last_job_id.unwrap()).unwrap().unwrap();
    assert_eq!(job.state, JobState::Succeeded);
    assert_eq!(job.work_type.as_str(), "host.pulse");
}
