//! Emparejamiento de fase 3: rotación round-robin, byes con motivo,
//! vetos de cancha y decisiones manuales por encima de la rotación.

mod common;

use std::collections::BTreeMap;

use common::{bye_key, court_time, game_key, request, round_id, PlanBuilder};
use fixture_core::store::StagingStore;
use fixture_core::{RunStatus, SchedulerEngine};

#[test]
fn an_odd_grade_rotates_the_bye_through_every_team() {
    // Cinco equipos sobre cinco rondas: el ciclo completo de la rotación.
    let plan = PlanBuilder::new().grade(1, 10, 5).rounds(5).build();
    let engine = SchedulerEngine::in_memory();
    let run = common::submit_created(&engine, &plan, request("clave-impar", "semilla"));
    let finished = engine.execute(&plan, run.run_id).expect("la corrida debe cerrar");
    assert_eq!(finished.run_status, RunStatus::Succeeded);

    let (games, byes) = engine.staging().final_schedule(&finished.round_ids).expect("final");
    assert_eq!(games.len(), 10, "dos juegos por ronda");
    assert_eq!(byes.len(), 5, "un descanso por ronda");

    let mut per_team: BTreeMap<i32, u32> = BTreeMap::new();
    for (_, team, reason) in bye_key(&byes) {
        assert_eq!(reason, "ODD_TEAMS");
        *per_team.entry(team).or_insert(0) += 1;
    }
    assert_eq!(per_team.len(), 5, "cada equipo descansa exactamente una vez");
    assert!(per_team.values().all(|&n| n == 1));

    let metrics = finished.metrics.expect("métricas");
    assert_eq!(metrics.byes_by_reason.get("ODD_TEAMS"), Some(&5));
    assert_eq!(metrics.constraint_errors, 0);
}

#[test]
fn slot_shortage_parks_pairs_with_constraint_byes() {
    // El grado 11 trae tres pares y sólo dos franjas reclamadas: un par
    // queda sin cancha, pero 1 de 5 está por debajo del umbral y la
    // corrida cierra.
    let plan = PlanBuilder::new().grade(1, 10, 4).grade(1, 11, 6).build();
    let engine = SchedulerEngine::in_memory();
    let run = common::submit_created(&engine, &plan, request("clave-corta", "semilla"));
    let finished = engine.execute(&plan, run.run_id).expect("la corrida debe cerrar");

    assert_eq!(finished.run_status, RunStatus::Succeeded);
    let metrics = finished.metrics.expect("métricas");
    assert_eq!(metrics.games_scheduled, 4);
    assert_eq!(metrics.byes_by_reason.get("CONSTRAINT"), Some(&2));
    assert_eq!(metrics.constraint_errors, 1, "un aviso por el par sin franja");

    let events = engine.events(run.run_id);
    assert!(events.iter().any(|e| e.is_constraint_error()));
}

#[test]
fn court_vetoes_steer_claims_to_eligible_slots() {
    let plan = PlanBuilder::new().grade(1, 10, 4)
                                 .block_grade(10, court_time(1, 1))
                                 .block_grade(10, court_time(1, 2))
                                 .build();
    let engine = SchedulerEngine::in_memory();
    let run = common::submit_created(&engine, &plan, request("clave-veto", "semilla"));
    let finished = engine.execute(&plan, run.run_id).expect("la corrida debe cerrar");
    assert_eq!(finished.run_status, RunStatus::Succeeded);

    let (games, _) = engine.staging().final_schedule(&finished.round_ids).expect("final");
    assert_eq!(games.len(), 2);
    assert!(game_key(&games).iter()
                            .all(|&(_, ct, _, _)| ct == court_time(2, 1) || ct == court_time(2, 2)),
            "los juegos sólo pueden caer en la cancha habilitada");
}

#[test]
fn manual_overrides_take_precedence_over_the_rotation() {
    let plan = PlanBuilder::new().grade(1, 10, 4)
                                 .fixed_game(round_id(1), 1, 10, 100, 102, court_time(2, 1))
                                 .fixed_bye(round_id(1), 1, 10, 101)
                                 .build();
    let engine = SchedulerEngine::in_memory();
    let run = common::submit_created(&engine, &plan, request("clave-manual", "semilla"));
    let finished = engine.execute(&plan, run.run_id).expect("la corrida debe cerrar");
    assert_eq!(finished.run_status, RunStatus::Succeeded);

    // Queda el juego fijado en su franja, el descanso manual y el cuarto
    // equipo descansando por quedar solo.
    let (games, byes) = engine.staging().final_schedule(&finished.round_ids).expect("final");
    assert_eq!(game_key(&games), vec![(round_id(1), court_time(2, 1), 100, 102)]);
    assert_eq!(bye_key(&byes),
               vec![(round_id(1), 101, "MANUAL_OVERRIDE"), (round_id(1), 103, "ODD_TEAMS")]);
}
