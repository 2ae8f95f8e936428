//! Ciclo de vida del orquestador: idempotencia de la aceptación, candado
//! por jornada y política de fallas (el negocio cierra la corrida, la
//! infraestructura no).

mod common;

use common::{request, PlanBuilder, SEASON_DAY_ID};
use fixture_core::store::{RunStore, StagingStore};
use fixture_core::{EngineError, ResumeCheckpoint, RunStatus, SchedulerEngine, SubmitOutcome};
use fixture_domain::DayPlan;

// Un grado de cuatro equipos con demanda dos sobre cuatro franjas.
fn small_plan() -> DayPlan {
    PlanBuilder::new().grade(1, 10, 4).build()
}

#[test]
fn the_same_key_replays_the_same_run() {
    let plan = small_plan();
    let engine = SchedulerEngine::in_memory();

    let created = common::submit_created(&engine, &plan, request("clave-1", "semilla"));
    let replayed = match engine.submit(&plan, request("clave-1", "semilla")).expect("replay") {
        SubmitOutcome::Replayed(run) => run,
        other => panic!("se esperaba Replayed, hubo {other:?}"),
    };
    assert_eq!(replayed.run_id, created.run_id);

    let finished = engine.execute(&plan, created.run_id).expect("la corrida debe cerrar");
    assert_eq!(finished.run_status, RunStatus::Succeeded);

    // También sobre la corrida terminal: la clave devuelve el estado tal
    // cual, sin relanzar nada.
    let events_before = engine.events(created.run_id).len();
    let after = match engine.submit(&plan, request("clave-1", "semilla")).expect("replay terminal") {
        SubmitOutcome::Replayed(run) => run,
        other => panic!("se esperaba Replayed, hubo {other:?}"),
    };
    assert_eq!(after.run_status, RunStatus::Succeeded);
    assert_eq!(engine.events(created.run_id).len(), events_before);
}

#[test]
fn one_active_run_per_day() {
    let plan = small_plan();
    let engine = SchedulerEngine::in_memory();

    let first = common::submit_created(&engine, &plan, request("clave-a", "semilla"));
    match engine.submit(&plan, request("clave-b", "semilla")).expect("submit") {
        SubmitOutcome::LockConflict { season_day_id, holder } => {
            assert_eq!(season_day_id, SEASON_DAY_ID);
            assert_eq!(holder, first.run_id);
        }
        other => panic!("se esperaba LockConflict, hubo {other:?}"),
    }

    let abandoned = engine.abandon(first.run_id).expect("abandon");
    assert_eq!(abandoned.run_status, RunStatus::Abandoned);
    assert!(engine.runs().lock_holder(SEASON_DAY_ID).expect("lock").is_none());

    // Con el candado libre, la clave nueva sí entra.
    common::submit_created(&engine, &plan, request("clave-b", "semilla"));
}

#[test]
fn an_abandoned_run_does_not_execute() {
    let plan = small_plan();
    let engine = SchedulerEngine::in_memory();

    let run = common::submit_created(&engine, &plan, request("clave-1", "semilla"));
    engine.abandon(run.run_id).expect("abandon");

    let after = engine.execute(&plan, run.run_id).expect("execute sobre abandonada");
    assert_eq!(after.run_status, RunStatus::Abandoned);
    assert!(engine.staging().list_p2(run.run_id).expect("staging").is_empty());
    let (games, byes) = engine.staging().final_schedule(&after.round_ids).expect("final");
    assert!(games.is_empty() && byes.is_empty());
}

#[test]
fn a_threshold_breach_fails_the_run_and_keeps_the_evidence() {
    // Demanda diez contra cuatro franjas: seis sin cubrir, 60% > 25%.
    let plan = PlanBuilder::new().grade(1, 10, 4)
                                 .courts(1)
                                 .slots(4)
                                 .required_default(10)
                                 .build();
    let engine = SchedulerEngine::in_memory();

    let run = common::submit_created(&engine, &plan, request("clave-1", "semilla"));
    let failed = engine.execute(&plan, run.run_id).expect("la política de negocio cierra la corrida");

    assert_eq!(failed.run_status, RunStatus::Failed);
    assert_eq!(failed.error_code.as_deref(), Some("SENG-ENGINE-005"));
    assert_eq!(failed.resume_checkpoint, ResumeCheckpoint::BeforeP2);

    // Las franjas ya reclamadas quedan como evidencia.
    assert_eq!(engine.staging().list_p2(run.run_id).expect("staging").len(), 4);
    let metrics = failed.metrics.expect("una corrida fallida conserva métricas");
    assert_eq!(metrics.p2_demand, 10);
    assert_eq!(metrics.p2_allocated, 4);
    assert_eq!(metrics.p2_unmet, 6);

    // La falla de negocio suelta el candado y nada llega al programa
    // final.
    assert!(engine.runs().lock_holder(SEASON_DAY_ID).expect("lock").is_none());
    let (games, byes) = engine.staging().final_schedule(&failed.round_ids).expect("final");
    assert!(games.is_empty() && byes.is_empty());
}

#[test]
fn a_config_change_between_submit_and_execute_fails_the_run() {
    let plan = small_plan();
    let engine = SchedulerEngine::in_memory();
    let run = common::submit_created(&engine, &plan, request("clave-1", "semilla"));

    // La misma jornada con un plantel distinto ya no es la configuración
    // aceptada.
    let drifted = PlanBuilder::new().grade(1, 10, 4).extra_team(10, 109).build();
    let failed = engine.execute(&drifted, run.run_id).expect("el desvío cierra la corrida");
    assert_eq!(failed.run_status, RunStatus::Failed);
    assert_eq!(failed.error_code.as_deref(), Some("SENG-ENGINE-003"));
}

#[test]
fn submit_rejects_inputs_that_do_not_match_the_plan() {
    let plan = small_plan();
    let engine = SchedulerEngine::in_memory();

    let mut wrong_day = request("clave-1", "semilla");
    wrong_day.season_day_id = 999;
    assert!(matches!(engine.submit(&plan, wrong_day), Err(EngineError::Validation(_))));

    let empty_seed = request("clave-2", "   ");
    assert!(matches!(engine.submit(&plan, empty_seed), Err(EngineError::Validation(_))));

    let mut ghost_round = request("clave-3", "semilla");
    ghost_round.round_ids = vec![12345];
    assert!(matches!(engine.submit(&plan, ghost_round), Err(EngineError::Validation(_))));
}
