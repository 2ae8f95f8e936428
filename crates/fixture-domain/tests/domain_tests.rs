//! Tests de integridad del agregado de jornada.

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use fixture_domain::*;

fn base_data() -> DayPlanData {
    let mut data = DayPlanData::default();
    data.season_day = Some(SeasonDay { season_day_id: 1, season_id: 3, day_label: "Saturday".to_string() });
    data.naming = NamingContext { organisation_name: "Harbour Basketball".to_string(),
                                 competition_name: "Winter League".to_string(),
                                 season_name: "2025".to_string() };
    data.ages = vec![Age::new(1, "U12", "Under 12", 1).unwrap()];
    data.grades = vec![Grade::new(10, 1, "U12-A", "Under 12 Division A", 1).unwrap()];
    data.teams = vec![Team::new(100, 10, "Sharks").unwrap(), Team::new(101, 10, "Rays").unwrap()];
    data.venues = vec![Venue { venue_id: 1, venue_name: "Main Stadium".to_string() }];
    data.courts = vec![Court { court_id: 1, venue_id: 1, court_name: "Court 1".to_string() }];
    data.time_slots = vec![TimeSlot { time_slot_id: 1,
                                      start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                                      duration_min: 40 }];
    data.court_times = vec![CourtTime { court_time_id: 1,
                                        season_day_id: 1,
                                        round_settings_number: 1,
                                        court_id: 1,
                                        time_slot_id: 1,
                                        availability_status: AvailabilityStatus::Available,
                                        lock_state: LockState::Open,
                                        block_reason: None }];
    data.court_rankings = vec![CourtRanking { court_rank_id: 1,
                                              season_day_id: 1,
                                              round_settings_number: 1,
                                              court_id: 1,
                                              court_rank: 1,
                                              overridden: false,
                                              created_at: Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap() }];
    data.rounds = vec![Round { round_id: 1,
                               season_id: 3,
                               round_number: 1,
                               round_label: "Round 1".to_string(),
                               round_settings_number: 1 }];
    data.round_dates = vec![RoundDate { round_id: 1,
                                        season_day_id: 1,
                                        game_date: NaiveDate::from_ymd_opt(2025, 6, 7).unwrap() }];
    data.round_settings = vec![RoundSetting { round_setting_id: 1,
                                              season_day_id: 1,
                                              round_settings_number: 1,
                                              rules: RoundRules { schema_version: 1,
                                                                  default_required_games: 1,
                                                                  required_games: vec![] } }];
    data.age_round_constraints = vec![AgeRoundConstraint { round_settings_number: 1, age_id: 1, active: true }];
    data.grade_round_constraints =
        vec![GradeRoundConstraint { round_settings_number: 1, age_id: 1, grade_id: 10, active: true }];
    data
}

#[test]
fn valid_plan_builds_and_resolves_lookups() {
    let plan = DayPlan::from_data(base_data()).expect("plan should build");
    assert_eq!(plan.season_day().season_day_id, 1);
    assert_eq!(plan.age(1).map(|a| a.age_code.as_str()), Some("U12"));
    assert_eq!(plan.teams_in_grade(10).len(), 2);
    assert_eq!(plan.rounds_ordered()[0].round_id, 1);
    assert_eq!(plan.date_for_round(1), NaiveDate::from_ymd_opt(2025, 6, 7));
    assert_eq!(plan.active_court_ranks(1).get(&1), Some(&1));
}

#[test]
fn grade_pointing_at_unknown_age_is_rejected() {
    let mut data = base_data();
    data.grades.push(Grade::new(11, 99, "X", "Ghost", 2).unwrap());
    let err = DayPlan::from_data(data).unwrap_err();
    assert!(matches!(err, DomainError::MissingReference(_)));
}

#[test]
fn duplicate_ids_are_rejected() {
    let mut data = base_data();
    data.teams.push(Team::new(100, 10, "Clone").unwrap());
    let err = DayPlan::from_data(data).unwrap_err();
    assert!(matches!(err, DomainError::ValidationError(_)));
}

#[test]
fn round_without_date_is_rejected() {
    let mut data = base_data();
    data.round_dates.clear();
    let err = DayPlan::from_data(data).unwrap_err();
    assert!(matches!(err, DomainError::ValidationError(_)));
}

#[test]
fn court_time_from_other_day_is_rejected() {
    let mut data = base_data();
    data.court_times[0].season_day_id = 2;
    assert!(DayPlan::from_data(data).is_err());
}

#[test]
fn override_game_with_same_team_twice_is_rejected() {
    let mut data = base_data();
    data.overrides.games.push(OverrideGame { round_id: 1,
                                             age_id: 1,
                                             grade_id: 10,
                                             team_a_id: 100,
                                             team_b_id: 100,
                                             court_time_id: 1 });
    assert!(DayPlan::from_data(data).is_err());
}

#[test]
fn override_referencing_unknown_team_is_rejected() {
    let mut data = base_data();
    data.overrides.byes.push(OverrideBye { round_id: 1, age_id: 1, grade_id: 10, team_id: 999 });
    assert!(DayPlan::from_data(data).is_err());
}

#[test]
fn team_committed_twice_in_a_round_is_rejected() {
    let mut data = base_data();
    data.overrides.games.push(OverrideGame { round_id: 1,
                                             age_id: 1,
                                             grade_id: 10,
                                             team_a_id: 100,
                                             team_b_id: 101,
                                             court_time_id: 1 });
    data.overrides.byes.push(OverrideBye { round_id: 1, age_id: 1, grade_id: 10, team_id: 101 });
    let err = DayPlan::from_data(data).unwrap_err();
    assert!(matches!(err, DomainError::ValidationError(_)));
}

#[test]
fn teams_in_grade_come_back_sorted_by_id() {
    let mut data = base_data();
    data.teams = vec![Team::new(103, 10, "Z").unwrap(),
                      Team::new(101, 10, "A").unwrap(),
                      Team::new(102, 10, "M").unwrap()];
    let plan = DayPlan::from_data(data).expect("plan should build");
    let ids: Vec<i32> = plan.teams_in_grade(10).iter().map(|t| t.team_id).collect();
    assert_eq!(ids, vec![101, 102, 103]);
}

#[test]
fn eligibility_reflects_availability_and_lock() {
    let data = base_data();
    let mut blocked = data.court_times[0].clone();
    blocked.availability_status = AvailabilityStatus::Blocked;
    assert!(data.court_times[0].is_eligible());
    assert!(!blocked.is_eligible());
}
