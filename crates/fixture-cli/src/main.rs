//! CLI de operación: envía, consulta y abandona corridas de programación.
//!
//! Subcomandos: `submit`, `status`, `abandon`, `events`. Parseo manual de
//! banderas, sin clap. Los exit codes salen del catálogo estable de errores
//! del motor. `submit` arma la jornada desde un archivo JSON (`--plan`) o,
//! con `FIXTURE_DEMO=1`, desde la jornada sembrada de demostración.

use fixture_core::{codes, EngineError, ProcessType, RunStatus, RunStore, RunType, SchedulerEngine, StagingStore,
                   SubmitOutcome, SubmitRequest};
use fixture_domain::{DayPlan, DayPlanData};
use fixture_persistence::{PgRunStore, PgStagingStore, PoolProvider};
use fixtureflow_rust::seed;
use uuid::Uuid;

/// Exit code del catálogo para un código estable ya almacenado en una
/// corrida fallida.
fn exit_for_stored_code(code: &str) -> i32 {
    let known = [codes::CONFIG_ERROR,
                 codes::DB_CONNECTION_ERROR,
                 codes::DB_OPERATION_ERROR,
                 codes::VALIDATION_ERROR,
                 codes::NOT_FOUND_ERROR,
                 codes::CONFLICT_ERROR,
                 codes::DUPLICATE_CLAIM,
                 codes::PROGRESS_LOOP,
                 codes::FINGERPRINT_MISMATCH,
                 codes::FINALISE_CONFLICT,
                 codes::THRESHOLD_EXCEEDED];
    known.iter().find(|c| c.code == code).map(|c| c.exit_code).unwrap_or(codes::UNKNOWN_ERROR.exit_code)
}

fn exit_engine_error(prefix: &str, err: EngineError) -> ! {
    let code = err.code();
    eprintln!("[{prefix}] {}: {err}", code.code);
    std::process::exit(code.exit_code);
}

fn usage_exit(usage: &str) -> ! {
    eprintln!("Uso: {usage}");
    std::process::exit(codes::VALIDATION_ERROR.exit_code);
}

/// Extrae `--run <UUID>` o termina con el uso del subcomando.
fn parse_run_flag(args: &[String], usage: &str) -> Uuid {
    let mut run: Option<Uuid> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--run" => {
                i += 1;
                if i < args.len() {
                    run = Uuid::parse_str(&args[i]).ok();
                }
            }
            _ => {}
        }
        i += 1;
    }
    match run {
        Some(run_id) => run_id,
        None => usage_exit(usage),
    }
}

/// Motor sobre Postgres; termina el proceso si falta `DATABASE_URL` o el
/// pool no levanta.
fn pg_engine(prefix: &str) -> SchedulerEngine<PgRunStore<PoolProvider>, PgStagingStore<PoolProvider>> {
    if std::env::var("DATABASE_URL").is_err() {
        eprintln!("[{prefix}] requiere DATABASE_URL para operar contra backend persistente");
        std::process::exit(codes::CONFIG_ERROR.exit_code);
    }
    match fixture_persistence::build_dev_pool_from_env() {
        Ok(pool) => fixture_persistence::engine_from_pool(pool),
        Err(e) => {
            eprintln!("[{prefix}] pool error: {e}");
            std::process::exit(codes::DB_CONNECTION_ERROR.exit_code);
        }
    }
}

fn load_plan(path: &str) -> DayPlan {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            eprintln!("[fixture submit] no se pudo leer {path}: {e}");
            std::process::exit(codes::CONFIG_ERROR.exit_code);
        }
    };
    let data: DayPlanData = match serde_json::from_str(&raw) {
        Ok(data) => data,
        Err(e) => {
            eprintln!("[fixture submit] JSON de jornada inválido: {e}");
            std::process::exit(codes::VALIDATION_ERROR.exit_code);
        }
    };
    match DayPlan::from_data(data) {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("[fixture submit] jornada inválida: {e}");
            std::process::exit(codes::VALIDATION_ERROR.exit_code);
        }
    }
}

fn print_metrics(run: &fixture_core::SchedulingRun) {
    if let Some(m) = &run.metrics {
        println!("métricas: demanda={} asignadas={} sin_franja={} juegos={} byes={} errores={}",
                 m.p2_demand,
                 m.p2_allocated,
                 m.p2_unmet,
                 m.games_scheduled,
                 m.byes_total,
                 m.constraint_errors);
    }
}

/// Envía la corrida y la ejecuta hasta su estado terminal. El outcome del
/// envío se imprime antes de ejecutar; un conflicto de candado termina acá.
fn submit_and_execute<R, S>(engine: &SchedulerEngine<R, S>, plan: &DayPlan, req: SubmitRequest) -> !
    where R: RunStore,
          S: StagingStore
{
    let outcome = match engine.submit(plan, req) {
        Ok(outcome) => outcome,
        Err(e) => exit_engine_error("fixture submit", e),
    };
    let run = match outcome {
        SubmitOutcome::Created(run) => {
            println!("corrida creada: {} (rondas {:?})", run.run_id, run.round_ids);
            run
        }
        SubmitOutcome::Replayed(run) => {
            println!("replay por clave de idempotencia: {} ({})", run.run_id, run.run_status.as_str());
            run
        }
        SubmitOutcome::LockConflict { season_day_id, holder } => {
            eprintln!("[fixture submit] jornada {season_day_id} ocupada por la corrida {holder}");
            std::process::exit(codes::CONFLICT_ERROR.exit_code);
        }
    };

    let finished = match engine.execute(plan, run.run_id) {
        Ok(finished) => finished,
        Err(e) => exit_engine_error("fixture submit", e),
    };
    println!("corrida {}: {} (checkpoint {})",
             finished.run_id,
             finished.run_status.as_str(),
             finished.resume_checkpoint.as_str());
    print_metrics(&finished);
    match finished.run_status {
        RunStatus::Succeeded => std::process::exit(0),
        RunStatus::Failed => {
            if let Some(code) = &finished.error_code {
                eprintln!("[fixture submit] corrida fallida con {code}");
                std::process::exit(exit_for_stored_code(code));
            }
            std::process::exit(codes::UNKNOWN_ERROR.exit_code);
        }
        // Un abandono concurrente ganó la carrera; el estado vigente manda.
        _ => std::process::exit(0),
    }
}

fn cmd_submit(args: &[String]) -> ! {
    const USAGE: &str = "fixture submit --token <KEY> --seed <TXT> [--day <N>] [--season <N>] \
                         [--process INITIAL|MID] [--run-type I_RUN_1] [--rounds 1,2,3] [--plan <FILE>]";
    let mut day: Option<i32> = None;
    let mut season: Option<i32> = None;
    let mut process = ProcessType::Initial;
    let mut run_type: Option<RunType> = None;
    let mut token: Option<String> = None;
    let mut seed_master: Option<String> = None;
    let mut rounds: Vec<i32> = Vec::new();
    let mut plan_file: Option<String> = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--day" => {
                i += 1;
                if i < args.len() {
                    day = args[i].parse::<i32>().ok();
                }
            }
            "--season" => {
                i += 1;
                if i < args.len() {
                    season = args[i].parse::<i32>().ok();
                }
            }
            "--process" => {
                i += 1;
                if i < args.len() {
                    match ProcessType::parse(&args[i]) {
                        Some(p) => process = p,
                        None => {
                            eprintln!("[fixture submit] process desconocido: {} (use INITIAL o MID)", args[i]);
                            std::process::exit(codes::VALIDATION_ERROR.exit_code);
                        }
                    }
                }
            }
            "--run-type" => {
                i += 1;
                if i < args.len() {
                    match RunType::parse(&args[i]) {
                        Some(rt) => run_type = Some(rt),
                        None => {
                            eprintln!("[fixture submit] run-type desconocido: {}", args[i]);
                            std::process::exit(codes::VALIDATION_ERROR.exit_code);
                        }
                    }
                }
            }
            "--token" => {
                i += 1;
                if i < args.len() {
                    token = Some(args[i].clone());
                }
            }
            "--seed" => {
                i += 1;
                if i < args.len() {
                    seed_master = Some(args[i].clone());
                }
            }
            "--rounds" => {
                i += 1;
                if i < args.len() {
                    for piece in args[i].split(',') {
                        match piece.trim().parse::<i32>() {
                            Ok(round_id) => rounds.push(round_id),
                            Err(_) => {
                                eprintln!("[fixture submit] ronda inválida en --rounds: {piece}");
                                std::process::exit(codes::VALIDATION_ERROR.exit_code);
                            }
                        }
                    }
                }
            }
            "--plan" => {
                i += 1;
                if i < args.len() {
                    plan_file = Some(args[i].clone());
                }
            }
            _ => {}
        }
        i += 1;
    }

    let (token, seed_master) = match (token, seed_master) {
        (Some(token), Some(seed_master)) => (token, seed_master),
        _ => usage_exit(USAGE),
    };

    let demo = std::env::var("FIXTURE_DEMO").ok().as_deref() == Some("1");
    let plan = if demo {
        match seed::demo_day_plan() {
            Ok(plan) => plan,
            Err(e) => {
                eprintln!("[fixture submit] jornada demo inválida: {e}");
                std::process::exit(codes::VALIDATION_ERROR.exit_code);
            }
        }
    } else if let Some(path) = plan_file {
        load_plan(&path)
    } else {
        eprintln!("[fixture submit] requiere --plan <FILE> o FIXTURE_DEMO=1 para armar la jornada");
        std::process::exit(codes::VALIDATION_ERROR.exit_code);
    };

    let req = SubmitRequest { season_id: season.unwrap_or(plan.season_day().season_id),
                              season_day_id: day.unwrap_or(plan.season_day().season_day_id),
                              process_type: process,
                              run_type,
                              round_ids: rounds,
                              seed_master,
                              idempotency_key: token };

    if std::env::var("DATABASE_URL").is_ok() {
        let engine = pg_engine("fixture submit");
        submit_and_execute(&engine, &plan, req)
    } else if demo {
        let engine = SchedulerEngine::in_memory();
        submit_and_execute(&engine, &plan, req)
    } else {
        eprintln!("[fixture submit] requiere DATABASE_URL para operar contra backend persistente");
        std::process::exit(codes::CONFIG_ERROR.exit_code);
    }
}

fn cmd_status(args: &[String]) -> ! {
    let run_id = parse_run_flag(args, "fixture status --run <UUID>");
    let engine = pg_engine("fixture status");
    match engine.status(run_id) {
        Ok(run) => {
            println!("corrida {}: {} (checkpoint {}, s1 {})",
                     run.run_id,
                     run.run_status.as_str(),
                     run.resume_checkpoint.as_str(),
                     run.s1_check_results);
            print_metrics(&run);
            if let Some(code) = &run.error_code {
                match &run.error_details {
                    Some(details) => println!("error {code}: {}", details.message),
                    None => println!("error {code}"),
                }
            }
            std::process::exit(0);
        }
        Err(e) => exit_engine_error("fixture status", e),
    }
}

fn cmd_abandon(args: &[String]) -> ! {
    let run_id = parse_run_flag(args, "fixture abandon --run <UUID>");
    let engine = pg_engine("fixture abandon");
    match engine.abandon(run_id) {
        Ok(run) => {
            println!("corrida {} abandonada (candado de la jornada liberado)", run.run_id);
            std::process::exit(0);
        }
        Err(e) => exit_engine_error("fixture abandon", e),
    }
}

fn cmd_events(args: &[String]) -> ! {
    let run_id = parse_run_flag(args, "fixture events --run <UUID>");
    let engine = pg_engine("fixture events");
    let events = engine.events(run_id);
    if events.is_empty() {
        eprintln!("[fixture events] corrida sin eventos: {run_id}");
        std::process::exit(codes::NOT_FOUND_ERROR.exit_code);
    }
    for event in &events {
        println!("{:>4} {} {} {} {}",
                 event.seq,
                 event.ts.format("%Y-%m-%dT%H:%M:%SZ"),
                 event.stage.as_str(),
                 event.severity.as_str(),
                 event.event_message);
    }
    std::process::exit(0);
}

fn main() {
    // Cargar .env si existe para obtener DATABASE_URL
    let _ = dotenvy::dotenv();
    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        println!("fixture: use los subcomandos 'submit', 'status', 'abandon' o 'events'");
        return;
    }
    match args[1].as_str() {
        "submit" => cmd_submit(&args[2..]),
        "status" => cmd_status(&args[2..]),
        "abandon" => cmd_abandon(&args[2..]),
        "events" => cmd_events(&args[2..]),
        other => {
            eprintln!("[fixture] subcomando desconocido: {other}");
            std::process::exit(codes::VALIDATION_ERROR.exit_code);
        }
    }
}
