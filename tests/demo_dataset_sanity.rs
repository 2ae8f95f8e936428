use fixture_domain::{DayPlan, DayPlanData};
use fixtureflow_rust::seed;

#[test]
fn the_demo_day_validates_and_counts_line_up() {
    let data = seed::demo_day_data().expect("transporte demo");
    assert_eq!(data.ages.len(), 2);
    assert_eq!(data.grades.len(), 3);
    assert_eq!(data.teams.len(), 13);
    assert_eq!(data.venues.len(), 2);
    assert_eq!(data.courts.len(), 3);
    assert_eq!(data.court_times.len(), 12);
    assert_eq!(data.court_times.iter().filter(|ct| ct.is_eligible()).count(),
               11,
               "una franja queda en mantenimiento");
    assert_eq!(data.court_rankings.len(), data.courts.len(), "toda cancha llega rankeada");

    let plan = DayPlan::from_data(data).expect("la jornada demo debe validar");
    let rounds = plan.rounds_ordered();
    assert_eq!(rounds.len(), 2);
    assert!(rounds[0].round_number < rounds[1].round_number);
    let saturday = plan.date_for_round(seed::ROUND_SATURDAY).expect("fecha del sábado");
    let sunday = plan.date_for_round(seed::ROUND_SUNDAY).expect("fecha del domingo");
    assert_eq!(sunday, saturday.succ_opt().expect("día siguiente"));

    // La División B queda impar a propósito: cinco equipos.
    assert_eq!(plan.teams_in_grade(12).len(), 5);
}

#[test]
fn sub12_vetoes_cover_every_ribera_slot() {
    let plan = seed::demo_day_plan().expect("la jornada demo debe validar");
    let vetoed = plan.age_restrictions(1, 1);
    assert_eq!(vetoed.len(), 4);
    for court_time_id in vetoed {
        let ct = plan.court_time(court_time_id).expect("franja vetada existe");
        let court = plan.court(ct.court_id).expect("cancha de la franja");
        assert_eq!(court.court_name, "Cancha Ribera");
    }
    // Los Sub 14 llevan fila explícita sin restricción.
    let setting = plan.allocation_setting(1, 2, 21).expect("fila de asignación Sub 14");
    assert!(!setting.restricted);
}

// El mismo transporte que consume la CLI vía `--plan <FILE>`: serializar y
// volver debe dejar una jornada idéntica y válida.
#[test]
fn the_demo_day_survives_a_json_round_trip() {
    let data = seed::demo_day_data().expect("transporte demo");
    let raw = serde_json::to_string(&data).expect("serializar jornada");
    let back: DayPlanData = serde_json::from_str(&raw).expect("deserializar jornada");
    assert_eq!(back.teams.len(), data.teams.len());
    assert_eq!(back.court_times.len(), data.court_times.len());
    assert_eq!(back.naming, data.naming);
    let plan = DayPlan::from_data(back).expect("la jornada deserializada debe validar");
    assert_eq!(plan.season_day().season_day_id, seed::SEASON_DAY_ID);
}
