// fixture-domain library entry point
pub mod constraints;
pub mod errors;
pub mod plan;
pub mod taxonomy;
pub mod timeplan;
pub mod venues;

pub use constraints::{AgeCourtRestriction, AgeRoundConstraint, AllocationRestrictionType, AllocationSetting,
                      GradeCourtRestriction, GradeRoundConstraint, ManualOverrides, OverrideBye, OverrideGame};
pub use errors::DomainError;
pub use plan::{DayPlan, DayPlanData, NamingContext};
pub use taxonomy::{Age, Grade, Team};
pub use timeplan::{RequiredGames, Round, RoundDate, RoundRules, RoundSetting, SeasonDay};
pub use venues::{active_rankings, AvailabilityStatus, Court, CourtRanking, CourtTime, LockState, TimeSlot, Venue};
