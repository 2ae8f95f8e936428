//! Binario de demostración `main-core`: recorre el ciclo completo del motor
//! sobre la jornada sembrada (envío, ejecución, programa final, candado,
//! determinismo) y, en forma opcional, la misma pasada contra Postgres.

use fixture_core::{FinalByeEntry, FinalGameEntry, ProcessType, ResumeCheckpoint, RunStatus, RunType, SchedulerEngine,
                   StagingStore, SubmitOutcome, SubmitRequest};
use fixture_domain::DayPlan;
use fixtureflow_rust::seed;

fn demo_request(key: &str, seed_master: &str) -> SubmitRequest {
    SubmitRequest { season_id: seed::SEASON_ID,
                    season_day_id: seed::SEASON_DAY_ID,
                    process_type: ProcessType::Initial,
                    run_type: Some(RunType::IRun1),
                    round_ids: vec![],
                    seed_master: seed_master.to_string(),
                    idempotency_key: key.to_string() }
}

fn format_game(g: &FinalGameEntry) -> String {
    format!("{} {} | {} {} | {}",
            g.game_date,
            g.start_time.format("%H:%M"),
            g.venue_name,
            g.court_name,
            g.game_name)
}

fn format_bye(b: &FinalByeEntry) -> String {
    format!("{} | {} [{}]", b.bye_date, b.bye_name, b.bye_reason.as_str())
}

/// Ciclo completo en memoria: envío, ejecución, programa final y replay por
/// clave de idempotencia.
fn run_inmemory_demo() {
    let plan = seed::demo_day_plan().expect("la jornada demo debe validar");
    let engine = SchedulerEngine::in_memory();

    let outcome = engine.submit(&plan, demo_request("fecha-doble-1", "semilla-2025"))
                        .expect("el envío demo debe pasar");
    let run = match outcome {
        SubmitOutcome::Created(run) => run,
        other => panic!("se esperaba Created, hubo {other:?}"),
    };
    println!("[DEMO] corrida creada: {} (rondas {:?})", run.run_id, run.round_ids);
    assert_eq!(run.round_ids, vec![seed::ROUND_SATURDAY, seed::ROUND_SUNDAY]);

    let finished = engine.execute(&plan, run.run_id).expect("la ejecución demo debe pasar");
    assert_eq!(finished.run_status, RunStatus::Succeeded, "la corrida demo debe terminar SUCCEEDED");
    assert_eq!(finished.resume_checkpoint, ResumeCheckpoint::Finalised);
    let metrics = finished.metrics.clone().expect("una corrida exitosa lleva métricas");
    println!("[DEMO] métricas: demanda={} asignadas={} juegos={} byes={} errores={}",
             metrics.p2_demand,
             metrics.p2_allocated,
             metrics.games_scheduled,
             metrics.byes_total,
             metrics.constraint_errors);
    assert_eq!(metrics.games_scheduled, 12, "dos rondas por tres grados por dos juegos");
    assert_eq!(metrics.byes_total, 2, "un bye por ronda en la División B");

    let (games, byes) = engine.staging().final_schedule(&finished.round_ids).expect("programa final publicado");
    println!("[DEMO] programa final ({} juegos, {} byes):", games.len(), byes.len());
    for game in &games {
        println!("[DEMO]   {}", format_game(game));
    }
    for bye in &byes {
        println!("[DEMO]   {}", format_bye(bye));
    }

    let events = engine.events(run.run_id);
    assert!(!events.is_empty(), "la corrida deja bitácora de eventos");
    println!("[DEMO] eventos registrados: {}", events.len());

    let replay = engine.submit(&plan, demo_request("fecha-doble-1", "semilla-2025"))
                       .expect("el replay demo debe pasar");
    assert!(matches!(replay, SubmitOutcome::Replayed(ref r) if r.run_id == run.run_id),
            "la misma clave reproduce la corrida sin mutar nada");
    println!("!Validación demo: OK (programa publicado y reproducible por clave)");
}

/// Candado por jornada: conflicto entre claves, abandono y liberación.
fn run_lock_demo() {
    let plan = seed::demo_day_plan().expect("la jornada demo debe validar");
    let engine = SchedulerEngine::in_memory();

    let holder = match engine.submit(&plan, demo_request("operador-a", "semilla-2025"))
                             .expect("el primer envío debe pasar")
    {
        SubmitOutcome::Created(run) => run,
        other => panic!("se esperaba Created, hubo {other:?}"),
    };

    match engine.submit(&plan, demo_request("operador-b", "semilla-2025"))
                .expect("el segundo envío debe pasar")
    {
        SubmitOutcome::LockConflict { season_day_id, holder: held_by } => {
            assert_eq!(held_by, holder.run_id);
            println!("[LOCK] jornada {} ocupada por {}", season_day_id, held_by);
        }
        other => panic!("se esperaba LockConflict, hubo {other:?}"),
    }

    engine.abandon(holder.run_id).expect("el abandono debe pasar");
    let retry = engine.submit(&plan, demo_request("operador-b", "semilla-2025"))
                      .expect("el reintento debe pasar");
    assert!(matches!(retry, SubmitOutcome::Created(_)), "el abandono libera la jornada");
    println!("!Validación candado: OK (conflicto, abandono y liberación)");
}

fn schedule_lines(plan: &DayPlan, seed_master: &str) -> Vec<String> {
    let engine = SchedulerEngine::in_memory();
    let outcome = engine.submit(plan, demo_request("determinismo", seed_master))
                        .expect("el envío de determinismo debe pasar");
    let run = outcome.run().cloned().expect("corrida aceptada");
    let finished = engine.execute(plan, run.run_id).expect("la ejecución de determinismo debe pasar");
    let (games, byes) = engine.staging().final_schedule(&finished.round_ids).expect("programa final");
    games.iter().map(format_game).chain(byes.iter().map(format_bye)).collect()
}

/// Dos motores limpios con la misma semilla producen el mismo programa.
fn run_determinism_check() {
    let plan = seed::demo_day_plan().expect("la jornada demo debe validar");
    let first = schedule_lines(&plan, "semilla-2025");
    let second = schedule_lines(&plan, "semilla-2025");
    assert_eq!(first, second, "misma semilla, mismo programa");
    println!("!Validación determinismo: OK ({} líneas idénticas)", first.len());
}

mod pg_demo {
    use super::*;

    pub fn run() -> Result<(), String> {
        let pool = fixture_persistence::build_dev_pool_from_env().map_err(|e| e.to_string())?;
        let engine = fixture_persistence::engine_from_pool(pool);
        let plan = seed::demo_day_plan().map_err(|e| e.to_string())?;

        // Clave fresca por invocación: cada pasada crea su propia corrida y
        // re-publica las rondas demo.
        let key = format!("demo-pg-{}", uuid::Uuid::new_v4());
        let outcome = engine.submit(&plan, demo_request(&key, "semilla-2025")).map_err(|e| e.to_string())?;
        let run = outcome.run()
                         .cloned()
                         .ok_or_else(|| "la jornada demo está ocupada por otra corrida".to_string())?;
        let finished = engine.execute(&plan, run.run_id).map_err(|e| e.to_string())?;
        println!("[PG] corrida {} terminó {}", finished.run_id, finished.run_status.as_str());
        if finished.run_status != RunStatus::Succeeded {
            return Err(format!("la corrida PG terminó {}", finished.run_status.as_str()));
        }

        let events = engine.events(finished.run_id);
        println!("[PG] eventos persistidos: {}", events.len());
        let (games, byes) = engine.staging().final_schedule(&finished.round_ids).map_err(|e| e.to_string())?;
        println!("[PG] programa final en Postgres: {} juegos, {} byes", games.len(), byes.len());
        Ok(())
    }
}

fn maybe_run_pg_demo() {
    // Ejecutar sólo si hay DATABASE_URL y aplicar mitigación para GSS por defecto.
    if let Ok(url) = std::env::var("DATABASE_URL") {
        if !url.to_lowercase().contains("gssencmode=") && std::env::var("PGGSSENCMODE").is_err() {
            std::env::set_var("PGGSSENCMODE", "disable");
            eprintln!("[PG] PGGSSENCMODE=disable (auto) para evitar issues GSS/libpq");
        }
    } else {
        eprintln!("[PG] DATABASE_URL no definido; se omite la pasada Postgres");
        return;
    }
    if let Err(e) = pg_demo::run() {
        eprintln!("[PG] Error: {e}");
    }
}

fn main() {
    // Cargar variables de entorno desde .env si existe (antes de leer DATABASE_URL)
    let _ = dotenvy::dotenv();

    run_inmemory_demo();
    run_lock_demo();
    run_determinism_check();

    if std::env::var("FIXTUREFLOW_RUN_PG_DEMO").ok().as_deref() == Some("1") {
        maybe_run_pg_demo();
    } else {
        eprintln!("[PG] omitido (exporta FIXTUREFLOW_RUN_PG_DEMO=1 para habilitarlo)");
    }
}
