//! Static risk taxonomy for agent actions.
//!
//! The table is a single exhaustive match: adding an [`ActionType`] variant
//! will not compile until it is given a tier here.

use crate::domain::action::{ActionType, RiskLevel};

/// Tier assigned to action types the table does not know.
pub const DEFAULT_RISK: RiskLevel = RiskLevel::Medium;

pub fn classify(action_type: &ActionType) -> RiskLevel {
    match action_type {
        ActionType::MarkHabitComplete | ActionType::CreateTask | ActionType::UpdateGoalProgress => {
            RiskLevel::Low
        }
        ActionType::CreateGoal | ActionType::CreateHabit | ActionType::CreateCalendarEvent => {
            RiskLevel::Medium
        }
        ActionType::SendEmail | ActionType::SendSms => RiskLevel::High,
        ActionType::MakeVoiceCall => RiskLevel::Critical,
        ActionType::Other(_) => DEFAULT_RISK,
    }
}
