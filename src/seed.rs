//! Jornada de demostración: el mundo completo que consumen `main-core` y
//! las pruebas de integración de la raíz.
//!
//! Fecha doble de la Liga Norte: dos rondas (sábado y domingo) sobre dos
//! sedes y tres canchas rankeadas. La División B de Sub 12 lleva cinco
//! equipos, así cada ronda reparte un bye por rotación. Todos los ids y
//! fechas son fijos: dos corridas con la misma semilla producen el mismo
//! programa byte a byte.

use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use fixture_domain::{Age, AgeCourtRestriction, AgeRoundConstraint, AllocationRestrictionType, AllocationSetting,
                     AvailabilityStatus, Court, CourtRanking, CourtTime, DayPlan, DayPlanData, DomainError, Grade,
                     GradeRoundConstraint, LockState, NamingContext, Round, RoundDate, RoundRules, RoundSetting,
                     SeasonDay, Team, TimeSlot, Venue};

pub const SEASON_ID: i32 = 1;
pub const SEASON_DAY_ID: i32 = 1;
/// Ronda del sábado.
pub const ROUND_SATURDAY: i32 = 301;
/// Ronda del domingo.
pub const ROUND_SUNDAY: i32 = 302;

const ROUND_SETTINGS: i32 = 1;

fn hhmm(h: u32, m: u32) -> Result<NaiveTime, DomainError> {
    NaiveTime::from_hms_opt(h, m, 0).ok_or_else(|| DomainError::ValidationError(format!("hora inválida {h:02}:{m:02}")))
}

fn ymd(y: i32, m: u32, d: u32) -> Result<NaiveDate, DomainError> {
    NaiveDate::from_ymd_opt(y, m, d).ok_or_else(|| DomainError::ValidationError(format!("fecha inválida {y}-{m}-{d}")))
}

/// Transporte plano de la jornada de demostración.
pub fn demo_day_data() -> Result<DayPlanData, DomainError> {
    let ranked_at = Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0)
                       .single()
                       .ok_or_else(|| DomainError::ValidationError("timestamp de ranking inválido".to_string()))?;

    // Tres canchas por cuatro franjas; la última de la Ribera queda en
    // mantenimiento y no es elegible.
    let mut court_times = Vec::new();
    for court in 1..=3i32 {
        for slot in 1..=4i32 {
            let court_time_id = 1000 + (court - 1) * 4 + (slot - 1);
            let maintenance = court_time_id == 1011;
            court_times.push(CourtTime { court_time_id,
                                         season_day_id: SEASON_DAY_ID,
                                         round_settings_number: ROUND_SETTINGS,
                                         court_id: court,
                                         time_slot_id: slot,
                                         availability_status: if maintenance {
                                             AvailabilityStatus::Maintenance
                                         } else {
                                             AvailabilityStatus::Available
                                         },
                                         lock_state: LockState::Open,
                                         block_reason: maintenance.then(|| "mantenimiento programado".to_string()) });
        }
    }

    let ranking = |court_rank_id, court_id, court_rank| CourtRanking { court_rank_id,
                                                                       season_day_id: SEASON_DAY_ID,
                                                                       round_settings_number: ROUND_SETTINGS,
                                                                       court_id,
                                                                       court_rank,
                                                                       overridden: false,
                                                                       created_at: ranked_at };

    Ok(DayPlanData { season_day: Some(SeasonDay { season_day_id: SEASON_DAY_ID,
                                                  season_id: SEASON_ID,
                                                  day_label: "Fecha doble 1".to_string() }),
                     naming: NamingContext { organisation_name: "Liga Norte".to_string(),
                                             competition_name: "Torneo Apertura".to_string(),
                                             season_name: "Temporada 2025".to_string() },
                     ages: vec![Age::new(1, "U12", "Sub 12", 1)?, Age::new(2, "U14", "Sub 14", 2)?],
                     grades: vec![Grade::new(11, 1, "A", "División A", 1)?,
                                  Grade::new(12, 1, "B", "División B", 2)?,
                                  Grade::new(21, 2, "A", "División A", 1)?],
                     teams: vec![Team::new(111, 11, "Águilas")?,
                                 Team::new(112, 11, "Cóndores")?,
                                 Team::new(113, 11, "Halcones")?,
                                 Team::new(114, 11, "Búhos")?,
                                 Team::new(121, 12, "Teros")?,
                                 Team::new(122, 12, "Chingolos")?,
                                 Team::new(123, 12, "Zorzales")?,
                                 Team::new(124, 12, "Calandrias")?,
                                 Team::new(125, 12, "Horneros")?,
                                 Team::new(211, 21, "Pumas")?,
                                 Team::new(212, 21, "Jaguares")?,
                                 Team::new(213, 21, "Zorros")?,
                                 Team::new(214, 21, "Tapires")?],
                     venues: vec![Venue { venue_id: 1, venue_name: "Polideportivo Central".to_string() },
                                  Venue { venue_id: 2, venue_name: "Club Ribera".to_string() }],
                     courts: vec![Court { court_id: 1, venue_id: 1, court_name: "Cancha 1".to_string() },
                                  Court { court_id: 2, venue_id: 1, court_name: "Cancha 2".to_string() },
                                  Court { court_id: 3, venue_id: 2, court_name: "Cancha Ribera".to_string() }],
                     time_slots: vec![TimeSlot { time_slot_id: 1, start_time: hhmm(9, 0)?, duration_min: 90 },
                                      TimeSlot { time_slot_id: 2, start_time: hhmm(10, 30)?, duration_min: 90 },
                                      TimeSlot { time_slot_id: 3, start_time: hhmm(12, 0)?, duration_min: 90 },
                                      TimeSlot { time_slot_id: 4, start_time: hhmm(15, 30)?, duration_min: 90 }],
                     court_times,
                     court_rankings: vec![ranking(1, 1, 1), ranking(2, 2, 2), ranking(3, 3, 3)],
                     rounds: vec![Round { round_id: ROUND_SATURDAY,
                                          season_id: SEASON_ID,
                                          round_number: 3,
                                          round_label: "Ronda 3".to_string(),
                                          round_settings_number: ROUND_SETTINGS },
                                  Round { round_id: ROUND_SUNDAY,
                                          season_id: SEASON_ID,
                                          round_number: 4,
                                          round_label: "Ronda 4".to_string(),
                                          round_settings_number: ROUND_SETTINGS }],
                     round_dates: vec![RoundDate { round_id: ROUND_SATURDAY,
                                                   season_day_id: SEASON_DAY_ID,
                                                   game_date: ymd(2025, 3, 1)? },
                                       RoundDate { round_id: ROUND_SUNDAY,
                                                   season_day_id: SEASON_DAY_ID,
                                                   game_date: ymd(2025, 3, 2)? }],
                     round_settings: vec![RoundSetting { round_setting_id: 1,
                                                         season_day_id: SEASON_DAY_ID,
                                                         round_settings_number: ROUND_SETTINGS,
                                                         rules: RoundRules { schema_version: 1,
                                                                             default_required_games: 2,
                                                                             required_games: vec![] } }],
                     age_round_constraints: vec![AgeRoundConstraint { round_settings_number: ROUND_SETTINGS,
                                                                      age_id: 1,
                                                                      active: true },
                                                 AgeRoundConstraint { round_settings_number: ROUND_SETTINGS,
                                                                      age_id: 2,
                                                                      active: true }],
                     grade_round_constraints: vec![GradeRoundConstraint { round_settings_number: ROUND_SETTINGS,
                                                                          age_id: 1,
                                                                          grade_id: 11,
                                                                          active: true },
                                                   GradeRoundConstraint { round_settings_number: ROUND_SETTINGS,
                                                                          age_id: 1,
                                                                          grade_id: 12,
                                                                          active: true },
                                                   GradeRoundConstraint { round_settings_number: ROUND_SETTINGS,
                                                                          age_id: 2,
                                                                          grade_id: 21,
                                                                          active: true }],
                     // Los Sub 14 juegan donde sea; los Sub 12 no viajan a
                     // la Ribera (veto DUAL por defecto sobre sus franjas).
                     allocation_settings: vec![AllocationSetting { round_settings_number: ROUND_SETTINGS,
                                                                   age_id: 2,
                                                                   grade_id: 21,
                                                                   restricted: false,
                                                                   restriction_type: AllocationRestrictionType::Dual }],
                     age_court_restrictions: (1008..=1011).map(|court_time_id| {
                                                              AgeCourtRestriction { round_settings_number:
                                                                                        ROUND_SETTINGS,
                                                                                    age_id: 1,
                                                                                    court_time_id }
                                                          })
                                                          .collect(),
                     ..DayPlanData::default() })
}

/// Jornada validada lista para el motor.
pub fn demo_day_plan() -> Result<DayPlan, DomainError> {
    DayPlan::from_data(demo_day_data()?)
}
