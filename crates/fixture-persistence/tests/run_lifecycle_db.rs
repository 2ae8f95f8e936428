//! Ciclo de vida de corridas contra Postgres real: alta con candado,
//! replay por clave, transiciones de estado y liberación del candado.
//! Se salta sin `DATABASE_URL`.

mod test_support;

use fixture_core::errors::EngineError;
use fixture_core::model::{ResumeCheckpoint, RunMetrics, RunStatus};
use fixture_core::store::{RunOutcome, RunStore, Submission};
use fixture_persistence::pg::{PgPool, PgRunStore, PoolProvider};
use test_support::{fresh_id, fresh_key, new_run_for, with_pool};
use uuid::Uuid;

fn store(pool: &PgPool) -> PgRunStore<PoolProvider> {
    PgRunStore::new(PoolProvider { pool: pool.clone() })
}

#[test]
fn begin_creates_then_replays_then_blocks_other_keys() {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("skip (no DATABASE_URL)");
        return;
    }
    let pool = with_pool(|p| p.clone()).unwrap();
    let store = store(&pool);
    let day = fresh_id();
    let key = fresh_key();

    let created = match store.begin(new_run_for(day, &key)).expect("begin") {
        Submission::Created(run) => run,
        other => panic!("se esperaba Created, hubo {other:?}"),
    };
    assert_eq!(created.run_status, RunStatus::Pending);
    assert_eq!(created.resume_checkpoint, ResumeCheckpoint::BeforeP2);
    assert_eq!(created.round_ids, vec![day + 2]);
    assert_eq!(created.s1_check_results, "PENDING");

    match store.begin(new_run_for(day, &key)).expect("replay") {
        Submission::Replayed(run) => assert_eq!(run.run_id, created.run_id),
        other => panic!("se esperaba Replayed, hubo {other:?}"),
    }

    match store.begin(new_run_for(day, &fresh_key())).expect("clave nueva") {
        Submission::LockHeld { season_day_id, holder } => {
            assert_eq!(season_day_id, day);
            assert_eq!(holder, created.run_id);
        }
        other => panic!("se esperaba LockHeld, hubo {other:?}"),
    }

    let lock = store.lock_holder(day).expect("lock query").expect("candado presente");
    assert_eq!(lock.run_id, created.run_id);

    let missing = store.get(Uuid::new_v4());
    assert!(matches!(missing, Err(EngineError::RunNotFound(_))), "hubo {missing:?}");
}

#[test]
fn a_run_walks_to_terminal_and_releases_the_lock() {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("skip (no DATABASE_URL)");
        return;
    }
    let pool = with_pool(|p| p.clone()).unwrap();
    let store = store(&pool);
    let day = fresh_id();
    let run = match store.begin(new_run_for(day, &fresh_key())).expect("begin") {
        Submission::Created(run) => run,
        other => panic!("se esperaba Created, hubo {other:?}"),
    };

    let running = store.mark_running(run.run_id).expect("mark_running");
    assert_eq!(running.run_status, RunStatus::Running);
    assert!(running.started_at.is_some());
    // Idempotente mientras siga RUNNING.
    let again = store.mark_running(run.run_id).expect("mark_running de nuevo");
    assert_eq!(again.started_at, running.started_at);

    store.set_s1_results(run.run_id, "PASSED").expect("s1");
    store.set_checkpoint(run.run_id, ResumeCheckpoint::AfterP2BeforeP3).expect("checkpoint");
    let mid = store.get(run.run_id).expect("get");
    assert_eq!(mid.s1_check_results, "PASSED");
    assert_eq!(mid.resume_checkpoint, ResumeCheckpoint::AfterP2BeforeP3);

    let metrics = RunMetrics { p2_demand: 4, p2_allocated: 4, games_scheduled: 4, ..RunMetrics::default() };
    let done = store.finish(run.run_id, RunOutcome::succeeded(metrics.clone())).expect("finish");
    assert_eq!(done.run_status, RunStatus::Succeeded);
    assert_eq!(done.metrics, Some(metrics));
    assert!(done.finished_at.is_some());
    assert!(store.lock_holder(day).expect("lock tras cierre").is_none());

    let twice = store.finish(run.run_id, RunOutcome::succeeded(RunMetrics::default()));
    assert!(matches!(twice, Err(EngineError::NotActive(_))), "hubo {twice:?}");
    let stale = store.set_s1_results(run.run_id, "FAILED");
    assert!(matches!(stale, Err(EngineError::NotActive(_))), "hubo {stale:?}");
}

#[test]
fn abandon_releases_lock_and_allows_fresh_submission_same_key() {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("skip (no DATABASE_URL)");
        return;
    }
    let pool = with_pool(|p| p.clone()).unwrap();
    let store = store(&pool);
    let day = fresh_id();
    let key = fresh_key();
    let first = match store.begin(new_run_for(day, &key)).expect("begin") {
        Submission::Created(run) => run,
        other => panic!("se esperaba Created, hubo {other:?}"),
    };

    let left = store.abandon(first.run_id).expect("abandon");
    assert_eq!(left.run_status, RunStatus::Abandoned);
    assert!(store.lock_holder(day).expect("lock tras abandono").is_none());

    // La clave queda reutilizable: la corrida abandonada no cuenta para
    // el replay.
    let second = match store.begin(new_run_for(day, &key)).expect("begin tras abandono") {
        Submission::Created(run) => run,
        other => panic!("se esperaba Created, hubo {other:?}"),
    };
    assert_ne!(second.run_id, first.run_id);

    let found = store.find_by_key(&key).expect("find_by_key").expect("corrida presente");
    assert_eq!(found.run_id, second.run_id);
}

#[test]
fn checkpoint_never_regresses() {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("skip (no DATABASE_URL)");
        return;
    }
    let pool = with_pool(|p| p.clone()).unwrap();
    let store = store(&pool);
    let day = fresh_id();
    let run = match store.begin(new_run_for(day, &fresh_key())).expect("begin") {
        Submission::Created(run) => run,
        other => panic!("se esperaba Created, hubo {other:?}"),
    };

    store.set_checkpoint(run.run_id, ResumeCheckpoint::AfterP3BeforeFinalise).expect("avance");
    let regress = store.set_checkpoint(run.run_id, ResumeCheckpoint::AfterP2BeforeP3);
    assert!(matches!(regress, Err(EngineError::Internal(_))), "hubo {regress:?}");
    let kept = store.get(run.run_id).expect("get");
    assert_eq!(kept.resume_checkpoint, ResumeCheckpoint::AfterP3BeforeFinalise);
}
