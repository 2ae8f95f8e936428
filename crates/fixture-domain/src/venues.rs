//! Sedes, canchas, franjas horarias y su disponibilidad.
//!
//! `CourtTime` es la unidad asignable del día: una cancha concreta en una
//! franja concreta, ligada a un número de configuración de ronda. Sólo las
//! filas `AVAILABLE` + `OPEN` son elegibles para asignación.
//!
//! `CourtRanking` es una bitácora sólo-agregar: cada repriorización de canchas
//! inserta filas nuevas y marca `overridden` en las anteriores. El ranking
//! "activo" se resuelve con [`active_rankings`].

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Estado de disponibilidad de una cancha-franja.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AvailabilityStatus {
    #[serde(rename = "AVAILABLE")]
    Available,
    #[serde(rename = "BLOCKED")]
    Blocked,
    #[serde(rename = "MAINTENANCE")]
    Maintenance,
    #[serde(rename = "EVENT")]
    Event,
}

impl AvailabilityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityStatus::Available => "AVAILABLE",
            AvailabilityStatus::Blocked => "BLOCKED",
            AvailabilityStatus::Maintenance => "MAINTENANCE",
            AvailabilityStatus::Event => "EVENT",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "AVAILABLE" => Some(AvailabilityStatus::Available),
            "BLOCKED" => Some(AvailabilityStatus::Blocked),
            "MAINTENANCE" => Some(AvailabilityStatus::Maintenance),
            "EVENT" => Some(AvailabilityStatus::Event),
            _ => None,
        }
    }
}

/// Candado administrativo sobre una cancha-franja.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LockState {
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "LOCKED")]
    Locked,
}

impl LockState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockState::Open => "OPEN",
            LockState::Locked => "LOCKED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(LockState::Open),
            "LOCKED" => Some(LockState::Locked),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    pub venue_id: i32,
    pub venue_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Court {
    pub court_id: i32,
    pub venue_id: i32,
    pub court_name: String,
}

/// Franja horaria reutilizable (hora de inicio + duración en minutos).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub time_slot_id: i32,
    pub start_time: NaiveTime,
    pub duration_min: i32,
}

/// Cancha-franja concreta de una jornada, la unidad que asigna la fase 2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourtTime {
    pub court_time_id: i32,
    pub season_day_id: i32,
    pub round_settings_number: i32,
    pub court_id: i32,
    pub time_slot_id: i32,
    pub availability_status: AvailabilityStatus,
    pub lock_state: LockState,
    pub block_reason: Option<String>,
}

impl CourtTime {
    /// Elegible para asignación: disponible y sin candado.
    pub fn is_eligible(&self) -> bool {
        self.availability_status == AvailabilityStatus::Available && self.lock_state == LockState::Open
    }
}

/// Fila de la bitácora de prioridad de canchas. `court_rank` menor = mejor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourtRanking {
    pub court_rank_id: i32,
    pub season_day_id: i32,
    pub round_settings_number: i32,
    pub court_id: i32,
    pub court_rank: i32,
    pub overridden: bool,
    pub created_at: DateTime<Utc>,
}

/// Resuelve el ranking activo por cancha a partir de la bitácora.
///
/// Regla: se ignoran las filas `overridden`; si quedara más de una fila viva
/// para la misma cancha, gana la más reciente (`created_at`, y en empate el
/// `court_rank_id` mayor).
pub fn active_rankings(rows: &[CourtRanking]) -> BTreeMap<i32, i32> {
    let mut chosen: BTreeMap<i32, &CourtRanking> = BTreeMap::new();
    for row in rows.iter().filter(|r| !r.overridden) {
        match chosen.get(&row.court_id) {
            Some(current) if (current.created_at, current.court_rank_id) >= (row.created_at, row.court_rank_id) => {}
            _ => {
                chosen.insert(row.court_id, row);
            }
        }
    }
    chosen.into_iter().map(|(court_id, r)| (court_id, r.court_rank)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ranking(id: i32, court: i32, rank: i32, overridden: bool, minute: u32) -> CourtRanking {
        CourtRanking { court_rank_id: id,
                       season_day_id: 1,
                       round_settings_number: 1,
                       court_id: court,
                       court_rank: rank,
                       overridden,
                       created_at: Utc.with_ymd_and_hms(2025, 3, 1, 10, minute, 0).unwrap() }
    }

    #[test]
    fn active_ranking_ignores_overridden_rows() {
        let rows = vec![ranking(1, 7, 1, true, 0), ranking(2, 7, 3, false, 5)];
        let active = active_rankings(&rows);
        assert_eq!(active.get(&7), Some(&3));
    }

    #[test]
    fn active_ranking_prefers_latest_row() {
        let rows = vec![ranking(1, 7, 1, false, 0), ranking(2, 7, 2, false, 5), ranking(3, 9, 4, false, 1)];
        let active = active_rankings(&rows);
        assert_eq!(active.get(&7), Some(&2));
        assert_eq!(active.get(&9), Some(&4));
    }
}
