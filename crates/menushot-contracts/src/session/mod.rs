mod summary;
mod types;
mod wizard;

pub use summary::{write_summary, ResultsSummary, SummaryDish};
pub use types::{
    ContextualInfo, DishContext, GeneratedDish, GroundingSource, MenuImage, MAX_SELECTED_DISHES,
    NO_SUMMARY_FALLBACK,
};
pub use wizard::{transition, InvalidTransition, WizardAction, WizardState, WizardStep};

/// Fresh identifier for one wizard session.
pub fn new_session_id() -> String {
    format!("menushot-{}", uuid::Uuid::new_v4().simple())
}
