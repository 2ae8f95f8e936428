use fixture_core::{ByeReason, ProcessType, ResumeCheckpoint, RunStatus, RunType, SchedulerEngine, StagingStore,
                   SubmitOutcome, SubmitRequest};
use fixture_core::{FinalByeEntry, FinalGameEntry};
use fixtureflow_rust::seed;

fn request(key: &str, seed_master: &str) -> SubmitRequest {
    SubmitRequest { season_id: seed::SEASON_ID,
                    season_day_id: seed::SEASON_DAY_ID,
                    process_type: ProcessType::Initial,
                    run_type: Some(RunType::IRun1),
                    round_ids: vec![],
                    seed_master: seed_master.to_string(),
                    idempotency_key: key.to_string() }
}

fn run_demo_day(key: &str, seed_master: &str) -> (Vec<FinalGameEntry>, Vec<FinalByeEntry>) {
    let plan = seed::demo_day_plan().expect("la jornada demo debe validar");
    let engine = SchedulerEngine::in_memory();
    let outcome = engine.submit(&plan, request(key, seed_master)).expect("submit");
    let run = outcome.run().cloned().expect("corrida aceptada");
    let finished = engine.execute(&plan, run.run_id).expect("execute");
    assert_eq!(finished.run_status, RunStatus::Succeeded);
    engine.staging().final_schedule(&finished.round_ids).expect("programa final")
}

#[test]
fn the_demo_day_publishes_a_full_weekend_programme() {
    let plan = seed::demo_day_plan().expect("la jornada demo debe validar");
    let engine = SchedulerEngine::in_memory();

    let run = match engine.submit(&plan, request("raiz-e2e", "semilla-2025")).expect("submit") {
        SubmitOutcome::Created(run) => run,
        other => panic!("se esperaba Created, hubo {other:?}"),
    };
    assert_eq!(run.round_ids, vec![seed::ROUND_SATURDAY, seed::ROUND_SUNDAY]);

    let finished = engine.execute(&plan, run.run_id).expect("execute");
    assert_eq!(finished.run_status, RunStatus::Succeeded);
    assert_eq!(finished.resume_checkpoint, ResumeCheckpoint::Finalised);
    assert_eq!(finished.s1_check_results, "PASSED");

    let metrics = finished.metrics.expect("métricas de la corrida");
    assert_eq!(metrics.p2_demand, 12, "tres grados por dos juegos por dos rondas");
    assert_eq!(metrics.p2_allocated, 12);
    assert_eq!(metrics.p2_unmet, 0);
    assert_eq!(metrics.games_scheduled, 12);
    assert_eq!(metrics.byes_total, 2, "la División B reparte un bye por ronda");
    assert_eq!(metrics.constraint_errors, 0);

    let (games, byes) = engine.staging().final_schedule(&finished.round_ids).expect("programa final");
    assert_eq!(games.len(), 12);
    assert_eq!(byes.len(), 2);

    // Greedy por ranking: con ocho franjas en el Polideportivo y demanda de
    // seis juegos por ronda, la Ribera nunca entra en juego y cada ronda usa
    // las mismas seis franjas.
    for round_id in [seed::ROUND_SATURDAY, seed::ROUND_SUNDAY] {
        let in_round: Vec<&FinalGameEntry> = games.iter().filter(|g| g.round_id == round_id).collect();
        let court_times: Vec<i32> = in_round.iter().map(|g| g.court_time_id).collect();
        assert_eq!(court_times, vec![1000, 1001, 1002, 1003, 1004, 1005]);
        assert!(in_round.iter().all(|g| g.venue_name == "Polideportivo Central"));
    }

    // Las fechas del programa salen del calendario de cada ronda.
    for game in &games {
        let expected = if game.round_id == seed::ROUND_SATURDAY { "2025-03-01" } else { "2025-03-02" };
        assert_eq!(game.game_date.to_string(), expected);
        assert_eq!(game.organisation_name, "Liga Norte");
        assert_eq!(game.competition_name, "Torneo Apertura");
        assert_eq!(game.season_name, "Temporada 2025");
    }

    // La nomenclatura compone edad, grado y equipos.
    let first = &games[0];
    assert_eq!(first.round_id, seed::ROUND_SATURDAY);
    assert_eq!(first.age_name, "Sub 12");
    assert_eq!(first.grade_name, "División A");
    assert!(first.game_name.starts_with("Sub 12 División A: "), "game_name inesperado: {}", first.game_name);
    assert!(first.game_name.contains(" v "));

    // Un bye por ronda, siempre en la División B, con el turno rotado entre
    // el sábado y el domingo.
    assert!(byes.iter().all(|b| b.grade_id == 12 && b.bye_reason == ByeReason::OddTeams));
    assert!(byes.iter().all(|b| b.bye_name.ends_with(" (bye)")));
    let saturday_bye = byes.iter().find(|b| b.round_id == seed::ROUND_SATURDAY).expect("bye del sábado");
    let sunday_bye = byes.iter().find(|b| b.round_id == seed::ROUND_SUNDAY).expect("bye del domingo");
    assert_ne!(saturday_bye.team_id, sunday_bye.team_id, "la rotación mueve el bye entre rondas");

    // Dentro de cada ronda ningún equipo aparece dos veces (juego o bye).
    for round_id in [seed::ROUND_SATURDAY, seed::ROUND_SUNDAY] {
        let mut seen: Vec<i32> = games.iter()
                                      .filter(|g| g.round_id == round_id)
                                      .flat_map(|g| [g.team_a_id, g.team_b_id])
                                      .chain(byes.iter().filter(|b| b.round_id == round_id).map(|b| b.team_id))
                                      .collect();
        let total = seen.len();
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), total, "equipo repetido dentro de la ronda {round_id}");
        assert_eq!(total, 13, "los trece equipos participan en cada ronda");
    }
}

#[test]
fn the_same_seed_reproduces_the_programme() {
    let line = |g: &FinalGameEntry| {
        format!("{} {} {} {} {}", g.round_id, g.court_time_id, g.game_date, g.start_time, g.game_name)
    };
    let bye_line = |b: &FinalByeEntry| format!("{} {} {}", b.round_id, b.team_id, b.bye_name);

    let (games_a, byes_a) = run_demo_day("raiz-det", "semilla-2025");
    let (games_b, byes_b) = run_demo_day("raiz-det", "semilla-2025");

    let lines_a: Vec<String> = games_a.iter().map(line).chain(byes_a.iter().map(bye_line)).collect();
    let lines_b: Vec<String> = games_b.iter().map(line).chain(byes_b.iter().map(bye_line)).collect();
    assert_eq!(lines_a, lines_b, "misma semilla, mismo programa");
}

#[test]
fn an_abandoned_demo_run_frees_the_day() {
    let plan = seed::demo_day_plan().expect("la jornada demo debe validar");
    let engine = SchedulerEngine::in_memory();

    let holder = match engine.submit(&plan, request("raiz-lock-a", "semilla-2025")).expect("submit") {
        SubmitOutcome::Created(run) => run,
        other => panic!("se esperaba Created, hubo {other:?}"),
    };
    match engine.submit(&plan, request("raiz-lock-b", "semilla-2025")).expect("submit") {
        SubmitOutcome::LockConflict { season_day_id, holder: held_by } => {
            assert_eq!(season_day_id, seed::SEASON_DAY_ID);
            assert_eq!(held_by, holder.run_id);
        }
        other => panic!("se esperaba LockConflict, hubo {other:?}"),
    }

    let abandoned = engine.abandon(holder.run_id).expect("abandon");
    assert_eq!(abandoned.run_status, RunStatus::Abandoned);

    let retry = engine.submit(&plan, request("raiz-lock-b", "semilla-2025")).expect("submit");
    let run = match retry {
        SubmitOutcome::Created(run) => run,
        other => panic!("se esperaba Created tras el abandono, hubo {other:?}"),
    };
    let finished = engine.execute(&plan, run.run_id).expect("execute");
    assert_eq!(finished.run_status, RunStatus::Succeeded);
}
