use std::env;

use anyhow::Context;
use chrono::Utc;
use jobrunner::config::Config;
use jobrunner::db;
use jobrunner::jobs::bodies::{FakeOutcome, FakeSleepForMultiJob, FakeSleepPayload};
use jobrunner::jobs::{JobQueueStore, JobType, SqliteQueueStore};

const USAGE: &str = "jobctl <command>\n\
Commands:\n\
- list [queue]\n\
- clear <queue>\n\
- seed-fake <n>\n\
\n\
Uses JOBRUNNER_DATABASE_URL or DATABASE_URL. Stop the worker before changing queues.\n";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!("{USAGE}");
        std::process::exit(2);
    }

    let cfg = Config::from_env()?;
    let pool = db::make_pool(&cfg.database_url).await?;
    db::run_migrations(&pool).await?;
    let store = SqliteQueueStore::new(pool);

    match args[1].as_str() {
        "list" => list(&store, args.get(2).map(String::as_str)).await?,
        "clear" => {
            let Some(queue) = args.get(2) else {
                eprintln!("usage: jobctl clear <queue>");
                std::process::exit(2);
            };
            clear(&store, queue).await?;
        }
        "seed-fake" => {
            let n: usize = match args.get(2) {
                Some(s) => s.parse().with_context(|| format!("invalid count {s:?}"))?,
                None => 5,
            };
            seed_fake(&store, n).await?;
        }
        other => {
            eprintln!("Unknown command: {other}\n\n{USAGE}");
            std::process::exit(2);
        }
    }

    Ok(())
}

async fn list(store: &SqliteQueueStore, only: Option<&str>) -> anyhow::Result<()> {
    let names = match only {
        Some(name) => vec![name.to_string()],
        None => store.queue_names().await?,
    };

    if names.is_empty() {
        println!("no persisted queues");
    }
    for name in names {
        let records = store
            .load_queue(&name)
            .await
            .with_context(|| format!("loading {name}"))?;
        println!("=== {name} ({} jobs)", records.len());
        for r in records {
            println!(
                "  {} type={} key={:?} next={} retry={}/{}",
                r.identifier,
                r.job_type,
                r.queue_key,
                r.next_attempt_timestamp,
                r.current_retry,
                r.max_attempts
            );
        }
    }
    Ok(())
}

async fn clear(store: &SqliteQueueStore, queue: &str) -> anyhow::Result<()> {
    if store.clear_queue(queue).await? {
        println!("cleared {queue}");
    } else {
        println!("{queue} was not persisted");
    }
    Ok(())
}

async fn seed_fake(store: &SqliteQueueStore, n: usize) -> anyhow::Result<()> {
    let queue = JobType::FakeSleepForMulti.queue_name();
    let mut records = store.load_queue(&queue).await?;
    let now = Utc::now().timestamp_millis();

    for i in 0..n {
        let outcome = if i % 3 == 2 {
            FakeOutcome::Retry
        } else {
            FakeOutcome::Success
        };
        let payload = FakeSleepPayload::sleeping(500 + 250 * i as u64, outcome).labeled(format!("seed-{i}"));
        let record = FakeSleepForMultiJob::seed_record(&payload, now);
        println!("+ {} sleep={}ms outcome={:?}", record.identifier, payload.sleep_duration_ms, outcome);
        records.push(record);
    }

    store.save_queue(&queue, &records).await?;
    println!("{queue} now holds {} jobs", records.len());
    Ok(())
}
