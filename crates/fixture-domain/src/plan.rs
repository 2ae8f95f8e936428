//! Agregado de jornada: todos los datos del mundo que consume el motor.
//!
//! `DayPlanData` es el transporte serializable (lo que arma la capa de datos o
//! un archivo JSON); `DayPlan` es el agregado validado con accesores indexados.
//! La construcción falla si la integridad referencial está rota, de modo que
//! el motor puede asumir que toda referencia resuelve.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::constraints::{AgeCourtRestriction, AgeRoundConstraint, AllocationSetting, GradeCourtRestriction,
                         GradeRoundConstraint, ManualOverrides};
use crate::taxonomy::{Age, Grade, Team};
use crate::timeplan::{Round, RoundDate, RoundSetting, SeasonDay};
use crate::venues::{active_rankings, Court, CourtRanking, CourtTime, TimeSlot, Venue};
use crate::DomainError;

/// Nombres denormalizados que terminan impresos en el programa final.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingContext {
    pub organisation_name: String,
    pub competition_name: String,
    pub season_name: String,
}

/// Transporte plano de una jornada completa.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DayPlanData {
    pub season_day: Option<SeasonDay>,
    pub naming: NamingContext,
    pub ages: Vec<Age>,
    pub grades: Vec<Grade>,
    pub teams: Vec<Team>,
    pub venues: Vec<Venue>,
    pub courts: Vec<Court>,
    pub time_slots: Vec<TimeSlot>,
    pub court_times: Vec<CourtTime>,
    pub court_rankings: Vec<CourtRanking>,
    pub rounds: Vec<Round>,
    pub round_dates: Vec<RoundDate>,
    pub round_settings: Vec<RoundSetting>,
    pub age_round_constraints: Vec<AgeRoundConstraint>,
    pub grade_round_constraints: Vec<GradeRoundConstraint>,
    pub allocation_settings: Vec<AllocationSetting>,
    pub age_court_restrictions: Vec<AgeCourtRestriction>,
    pub grade_court_restrictions: Vec<GradeCourtRestriction>,
    pub overrides: ManualOverrides,
}

/// Jornada validada. Inmutable una vez construida.
#[derive(Debug, Clone)]
pub struct DayPlan {
    data: DayPlanData,
    season_day: SeasonDay,
    ages_by_id: HashMap<i32, usize>,
    grades_by_id: HashMap<i32, usize>,
    teams_by_id: HashMap<i32, usize>,
    courts_by_id: HashMap<i32, usize>,
    venues_by_id: HashMap<i32, usize>,
    slots_by_id: HashMap<i32, usize>,
    court_times_by_id: HashMap<i32, usize>,
    rounds_by_id: HashMap<i32, usize>,
    settings_by_number: HashMap<i32, usize>,
    dates_by_round: HashMap<i32, NaiveDate>,
}

impl DayPlan {
    /// Valida el transporte y construye el agregado.
    pub fn from_data(data: DayPlanData) -> Result<Self, DomainError> {
        let season_day = data.season_day
                             .clone()
                             .ok_or_else(|| DomainError::ValidationError("season_day ausente".to_string()))?;

        let ages_by_id = index_unique(data.ages.iter().map(|a| a.age_id), "age_id")?;
        let grades_by_id = index_unique(data.grades.iter().map(|g| g.grade_id), "grade_id")?;
        let teams_by_id = index_unique(data.teams.iter().map(|t| t.team_id), "team_id")?;
        let venues_by_id = index_unique(data.venues.iter().map(|v| v.venue_id), "venue_id")?;
        let courts_by_id = index_unique(data.courts.iter().map(|c| c.court_id), "court_id")?;
        let slots_by_id = index_unique(data.time_slots.iter().map(|s| s.time_slot_id), "time_slot_id")?;
        let court_times_by_id = index_unique(data.court_times.iter().map(|ct| ct.court_time_id), "court_time_id")?;
        let rounds_by_id = index_unique(data.rounds.iter().map(|r| r.round_id), "round_id")?;
        let settings_by_number = index_unique(data.round_settings.iter().map(|s| s.round_settings_number),
                                              "round_settings_number")?;

        for grade in &data.grades {
            if !ages_by_id.contains_key(&grade.age_id) {
                return Err(missing("grade", grade.grade_id, "age", grade.age_id));
            }
        }
        for team in &data.teams {
            if !grades_by_id.contains_key(&team.grade_id) {
                return Err(missing("team", team.team_id, "grade", team.grade_id));
            }
        }
        for court in &data.courts {
            if !venues_by_id.contains_key(&court.venue_id) {
                return Err(missing("court", court.court_id, "venue", court.venue_id));
            }
        }
        for ct in &data.court_times {
            if ct.season_day_id != season_day.season_day_id {
                return Err(DomainError::ValidationError(format!("court_time {} pertenece a otra jornada",
                                                                ct.court_time_id)));
            }
            if !courts_by_id.contains_key(&ct.court_id) {
                return Err(missing("court_time", ct.court_time_id, "court", ct.court_id));
            }
            if !slots_by_id.contains_key(&ct.time_slot_id) {
                return Err(missing("court_time", ct.court_time_id, "time_slot", ct.time_slot_id));
            }
            if !settings_by_number.contains_key(&ct.round_settings_number) {
                return Err(missing("court_time", ct.court_time_id, "round_settings_number", ct.round_settings_number));
            }
        }
        for ranking in &data.court_rankings {
            if !courts_by_id.contains_key(&ranking.court_id) {
                return Err(missing("court_ranking", ranking.court_rank_id, "court", ranking.court_id));
            }
        }

        let mut dates_by_round: HashMap<i32, NaiveDate> = HashMap::new();
        for rd in &data.round_dates {
            if !rounds_by_id.contains_key(&rd.round_id) {
                return Err(missing("round_date", rd.round_id, "round", rd.round_id));
            }
            dates_by_round.insert(rd.round_id, rd.game_date);
        }
        for round in &data.rounds {
            if !settings_by_number.contains_key(&round.round_settings_number) {
                return Err(missing("round", round.round_id, "round_settings_number", round.round_settings_number));
            }
            if !dates_by_round.contains_key(&round.round_id) {
                return Err(DomainError::ValidationError(format!("round {} sin fecha de juego", round.round_id)));
            }
        }

        for arc in &data.age_round_constraints {
            if !ages_by_id.contains_key(&arc.age_id) {
                return Err(missing("age_round_constraint", arc.round_settings_number, "age", arc.age_id));
            }
        }
        for grc in &data.grade_round_constraints {
            if !grades_by_id.contains_key(&grc.grade_id) || !ages_by_id.contains_key(&grc.age_id) {
                return Err(missing("grade_round_constraint", grc.round_settings_number, "grade", grc.grade_id));
            }
        }
        for setting in &data.allocation_settings {
            if !grades_by_id.contains_key(&setting.grade_id) || !ages_by_id.contains_key(&setting.age_id) {
                return Err(missing("allocation_setting", setting.round_settings_number, "grade", setting.grade_id));
            }
        }
        for r in &data.age_court_restrictions {
            if !ages_by_id.contains_key(&r.age_id) || !court_times_by_id.contains_key(&r.court_time_id) {
                return Err(missing("age_court_restriction", r.age_id, "court_time", r.court_time_id));
            }
        }
        for r in &data.grade_court_restrictions {
            if !grades_by_id.contains_key(&r.grade_id) || !court_times_by_id.contains_key(&r.court_time_id) {
                return Err(missing("grade_court_restriction", r.grade_id, "court_time", r.court_time_id));
            }
        }

        validate_overrides(&data, &rounds_by_id, &teams_by_id, &court_times_by_id)?;

        Ok(DayPlan { season_day,
                     ages_by_id,
                     grades_by_id,
                     teams_by_id,
                     courts_by_id,
                     venues_by_id,
                     slots_by_id,
                     court_times_by_id,
                     rounds_by_id,
                     settings_by_number,
                     dates_by_round,
                     data })
    }

    pub fn season_day(&self) -> &SeasonDay {
        &self.season_day
    }

    pub fn naming(&self) -> &NamingContext {
        &self.data.naming
    }

    pub fn overrides(&self) -> &ManualOverrides {
        &self.data.overrides
    }

    pub fn age(&self, age_id: i32) -> Option<&Age> {
        self.ages_by_id.get(&age_id).map(|i| &self.data.ages[*i])
    }

    pub fn grade(&self, grade_id: i32) -> Option<&Grade> {
        self.grades_by_id.get(&grade_id).map(|i| &self.data.grades[*i])
    }

    pub fn team(&self, team_id: i32) -> Option<&Team> {
        self.teams_by_id.get(&team_id).map(|i| &self.data.teams[*i])
    }

    pub fn court(&self, court_id: i32) -> Option<&Court> {
        self.courts_by_id.get(&court_id).map(|i| &self.data.courts[*i])
    }

    pub fn venue(&self, venue_id: i32) -> Option<&Venue> {
        self.venues_by_id.get(&venue_id).map(|i| &self.data.venues[*i])
    }

    pub fn time_slot(&self, time_slot_id: i32) -> Option<&TimeSlot> {
        self.slots_by_id.get(&time_slot_id).map(|i| &self.data.time_slots[*i])
    }

    pub fn court_time(&self, court_time_id: i32) -> Option<&CourtTime> {
        self.court_times_by_id.get(&court_time_id).map(|i| &self.data.court_times[*i])
    }

    pub fn round(&self, round_id: i32) -> Option<&Round> {
        self.rounds_by_id.get(&round_id).map(|i| &self.data.rounds[*i])
    }

    pub fn setting(&self, round_settings_number: i32) -> Option<&RoundSetting> {
        self.settings_by_number.get(&round_settings_number).map(|i| &self.data.round_settings[*i])
    }

    pub fn date_for_round(&self, round_id: i32) -> Option<NaiveDate> {
        self.dates_by_round.get(&round_id).copied()
    }

    /// Rondas de la jornada ordenadas por `round_number` (y por id en empate).
    pub fn rounds_ordered(&self) -> Vec<&Round> {
        let mut rounds: Vec<&Round> = self.data.rounds.iter().collect();
        rounds.sort_by_key(|r| (r.round_number, r.round_id));
        rounds
    }

    /// Grados de una edad, ordenados por `sort_order` y luego por id.
    pub fn grades_in_age(&self, age_id: i32) -> Vec<&Grade> {
        let mut grades: Vec<&Grade> = self.data.grades.iter().filter(|g| g.age_id == age_id).collect();
        grades.sort_by_key(|g| (g.sort_order, g.grade_id));
        grades
    }

    /// Equipos de un grado, ordenados por id (orden canónico del rotador).
    pub fn teams_in_grade(&self, grade_id: i32) -> Vec<&Team> {
        let mut teams: Vec<&Team> = self.data.teams.iter().filter(|t| t.grade_id == grade_id).collect();
        teams.sort_by_key(|t| t.team_id);
        teams
    }

    /// Edades ordenadas por `sort_order` y luego id.
    pub fn ages_ordered(&self) -> Vec<&Age> {
        let mut ages: Vec<&Age> = self.data.ages.iter().collect();
        ages.sort_by_key(|a| (a.sort_order, a.age_id));
        ages
    }

    /// Ranking activo por cancha (ver [`active_rankings`]) limitado a una
    /// configuración de ronda.
    pub fn active_court_ranks(&self, round_settings_number: i32) -> BTreeMap<i32, i32> {
        let rows: Vec<CourtRanking> = self.data
                                          .court_rankings
                                          .iter()
                                          .filter(|r| r.round_settings_number == round_settings_number)
                                          .cloned()
                                          .collect();
        active_rankings(&rows)
    }

    pub fn court_times_for_setting(&self, round_settings_number: i32) -> Vec<&CourtTime> {
        self.data
            .court_times
            .iter()
            .filter(|ct| ct.round_settings_number == round_settings_number)
            .collect()
    }

    pub fn age_round_constraints(&self, round_settings_number: i32) -> Vec<&AgeRoundConstraint> {
        self.data
            .age_round_constraints
            .iter()
            .filter(|c| c.round_settings_number == round_settings_number)
            .collect()
    }

    pub fn grade_round_constraints(&self, round_settings_number: i32) -> Vec<&GradeRoundConstraint> {
        self.data
            .grade_round_constraints
            .iter()
            .filter(|c| c.round_settings_number == round_settings_number)
            .collect()
    }

    pub fn allocation_setting(&self, round_settings_number: i32, age_id: i32, grade_id: i32)
                              -> Option<&AllocationSetting> {
        self.data
            .allocation_settings
            .iter()
            .find(|s| s.round_settings_number == round_settings_number && s.age_id == age_id && s.grade_id == grade_id)
    }

    pub fn age_restrictions(&self, round_settings_number: i32, age_id: i32) -> HashSet<i32> {
        self.data
            .age_court_restrictions
            .iter()
            .filter(|r| r.round_settings_number == round_settings_number && r.age_id == age_id)
            .map(|r| r.court_time_id)
            .collect()
    }

    pub fn grade_restrictions(&self, round_settings_number: i32, grade_id: i32) -> HashSet<i32> {
        self.data
            .grade_court_restrictions
            .iter()
            .filter(|r| r.round_settings_number == round_settings_number && r.grade_id == grade_id)
            .map(|r| r.court_time_id)
            .collect()
    }

    /// Transporte subyacente (para fingerprints y snapshots).
    pub fn data(&self) -> &DayPlanData {
        &self.data
    }
}

fn index_unique<I: Iterator<Item = i32>>(ids: I, field: &str) -> Result<HashMap<i32, usize>, DomainError> {
    let mut map = HashMap::new();
    for (idx, id) in ids.enumerate() {
        if map.insert(id, idx).is_some() {
            return Err(DomainError::ValidationError(format!("{field} duplicado: {id}")));
        }
    }
    Ok(map)
}

fn missing(owner: &str, owner_id: i32, target: &str, target_id: i32) -> DomainError {
    DomainError::MissingReference(format!("{owner} {owner_id} referencia {target} {target_id} inexistente"))
}

fn validate_overrides(data: &DayPlanData,
                      rounds: &HashMap<i32, usize>,
                      teams: &HashMap<i32, usize>,
                      court_times: &HashMap<i32, usize>)
                      -> Result<(), DomainError> {
    let mut used_slots: HashSet<(i32, i32)> = HashSet::new();
    let mut committed: HashSet<(i32, i32)> = HashSet::new();
    for g in &data.overrides.games {
        if !rounds.contains_key(&g.round_id) {
            return Err(missing("override_game", g.court_time_id, "round", g.round_id));
        }
        if !teams.contains_key(&g.team_a_id) || !teams.contains_key(&g.team_b_id) {
            return Err(missing("override_game", g.round_id, "team", g.team_a_id));
        }
        if g.team_a_id == g.team_b_id {
            return Err(DomainError::ValidationError(format!("override_game de la ronda {} empareja un equipo consigo mismo",
                                                            g.round_id)));
        }
        if !court_times.contains_key(&g.court_time_id) {
            return Err(missing("override_game", g.round_id, "court_time", g.court_time_id));
        }
        if !used_slots.insert((g.round_id, g.court_time_id)) {
            return Err(DomainError::ValidationError(format!("dos override_game reclaman court_time {} en la ronda {}",
                                                            g.court_time_id, g.round_id)));
        }
        for team_id in [g.team_a_id, g.team_b_id] {
            if !committed.insert((g.round_id, team_id)) {
                return Err(DomainError::ValidationError(format!("equipo {team_id} comprometido dos veces a mano en la ronda {}",
                                                                g.round_id)));
            }
        }
    }
    for b in &data.overrides.byes {
        if !rounds.contains_key(&b.round_id) {
            return Err(missing("override_bye", b.team_id, "round", b.round_id));
        }
        if !teams.contains_key(&b.team_id) {
            return Err(missing("override_bye", b.round_id, "team", b.team_id));
        }
        if !committed.insert((b.round_id, b.team_id)) {
            return Err(DomainError::ValidationError(format!("equipo {} comprometido dos veces a mano en la ronda {}",
                                                            b.team_id, b.round_id)));
        }
    }
    Ok(())
}
