use std::fmt;

use serde::{Deserialize, Serialize};

use super::types::{ContextualInfo, GeneratedDish, MAX_SELECTED_DISHES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WizardStep {
    #[default]
    MenuInput,
    DishSelection,
    ContextInput,
    ContextValidation,
    Generating,
    Results,
}

impl WizardStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MenuInput => "MENU_INPUT",
            Self::DishSelection => "DISH_SELECTION",
            Self::ContextInput => "CONTEXT_INPUT",
            Self::ContextValidation => "CONTEXT_VALIDATION",
            Self::Generating => "GENERATING",
            Self::Results => "RESULTS",
        }
    }
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything one session has accumulated so far.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WizardState {
    pub step: WizardStep,
    pub menu_text: Option<String>,
    pub suggested_dishes: Vec<String>,
    pub dish_names: Vec<String>,
    pub restaurant_name: Option<String>,
    pub context: Option<ContextualInfo>,
    pub generated: Vec<GeneratedDish>,
    pub loading: bool,
    pub error: Option<String>,
}

impl WizardState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardAction {
    StartLoading,
    SubmitMenu { text: String },
    SuggestDishes(Vec<String>),
    SelectDishes(Vec<String>),
    SkipContext,
    SubmitRestaurant { name: String },
    ContextFound(ContextualInfo),
    ContextSearchFailed { message: String },
    AcceptContext,
    RejectContext,
    GenerationFinished(Vec<GeneratedDish>),
    GenerationFailed { message: String },
    Fail { message: String },
    DismissError,
    Reset,
}

impl WizardAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StartLoading => "start_loading",
            Self::SubmitMenu { .. } => "submit_menu",
            Self::SuggestDishes(_) => "suggest_dishes",
            Self::SelectDishes(_) => "select_dishes",
            Self::SkipContext => "skip_context",
            Self::SubmitRestaurant { .. } => "submit_restaurant",
            Self::ContextFound(_) => "context_found",
            Self::ContextSearchFailed { .. } => "context_search_failed",
            Self::AcceptContext => "accept_context",
            Self::RejectContext => "reject_context",
            Self::GenerationFinished(_) => "generation_finished",
            Self::GenerationFailed { .. } => "generation_failed",
            Self::Fail { .. } => "fail",
            Self::DismissError => "dismiss_error",
            Self::Reset => "reset",
        }
    }
}

/// An action that the current state does not accept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub step: WizardStep,
    pub action: &'static str,
    pub reason: String,
}

impl InvalidTransition {
    pub fn new(state: &WizardState, action: &'static str, reason: impl Into<String>) -> Self {
        Self {
            step: state.step,
            action,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cannot {} during {}: {}",
            self.action, self.step, self.reason
        )
    }
}

impl std::error::Error for InvalidTransition {}

/// Applies `action` to `state` and returns the successor state.
///
/// Pure: no I/O, and a rejected action leaves the caller's state untouched.
/// While an error is shown only `DismissError` and `Reset` are accepted.
pub fn transition(
    state: &WizardState,
    action: WizardAction,
) -> Result<WizardState, InvalidTransition> {
    use WizardAction as A;
    use WizardStep as S;

    if matches!(action, A::Reset) {
        return Ok(WizardState::default());
    }
    if state.has_error() && !matches!(action, A::DismissError) {
        return Err(InvalidTransition::new(
            state,
            action.name(),
            "an error is shown; dismiss it or start over",
        ));
    }

    let mut next = state.clone();
    match (state.step, action) {
        (_, A::DismissError) => {
            if !state.has_error() {
                return Err(InvalidTransition::new(
                    state,
                    "dismiss_error",
                    "there is no error to dismiss",
                ));
            }
            next.error = None;
            next.loading = false;
        }
        (_, A::StartLoading) => {
            next.loading = true;
        }
        (S::Generating, A::GenerationFailed { message } | A::Fail { message }) => {
            next.context = None;
            next.generated.clear();
            next.error = Some(message);
            next.step = S::ContextInput;
            next.loading = false;
        }
        (_, A::Fail { message }) => {
            next.error = Some(message);
            next.loading = false;
        }
        (S::MenuInput, A::SubmitMenu { text }) => {
            next.menu_text = Some(text);
            next.suggested_dishes.clear();
            next.step = S::DishSelection;
            next.loading = false;
        }
        (S::DishSelection, A::SuggestDishes(names)) => {
            next.suggested_dishes = names;
            next.loading = false;
        }
        (S::DishSelection, A::SelectDishes(names)) => {
            let names = clean_dish_names(&names);
            if names.is_empty() {
                return Err(InvalidTransition::new(
                    state,
                    "select_dishes",
                    "select at least one dish",
                ));
            }
            if names.len() > MAX_SELECTED_DISHES {
                return Err(InvalidTransition::new(
                    state,
                    "select_dishes",
                    format!("select at most {MAX_SELECTED_DISHES} dishes"),
                ));
            }
            next.dish_names = names;
            next.step = S::ContextInput;
            next.loading = false;
        }
        (S::ContextInput, A::SkipContext) => {
            next.restaurant_name = None;
            next.context = None;
            next.step = S::Generating;
            next.loading = true;
        }
        (S::ContextInput, A::SubmitRestaurant { name }) => {
            let name = name.trim();
            if name.is_empty() {
                return Err(InvalidTransition::new(
                    state,
                    "submit_restaurant",
                    "restaurant name is empty",
                ));
            }
            next.restaurant_name = Some(name.to_string());
            next.context = None;
            next.loading = true;
        }
        (S::ContextInput, A::ContextFound(info)) => {
            next.context = Some(info);
            next.step = S::ContextValidation;
            next.loading = false;
        }
        (S::ContextInput, A::ContextSearchFailed { message }) => {
            next.context = None;
            next.error = Some(message);
            next.loading = false;
        }
        (S::ContextValidation, A::AcceptContext) => {
            next.step = S::Generating;
            next.loading = true;
        }
        (S::ContextValidation, A::RejectContext) => {
            next.context = None;
            next.step = S::Generating;
            next.loading = true;
        }
        (S::Generating, A::GenerationFinished(dishes)) => {
            if dishes.len() != state.dish_names.len() {
                return Err(InvalidTransition::new(
                    state,
                    "generation_finished",
                    format!(
                        "expected {} generated dishes, got {}",
                        state.dish_names.len(),
                        dishes.len()
                    ),
                ));
            }
            next.generated = dishes;
            next.step = S::Results;
            next.loading = false;
        }
        (_, action) => {
            return Err(InvalidTransition::new(
                state,
                action.name(),
                "not available at this step",
            ));
        }
    }
    Ok(next)
}

fn clean_dish_names(names: &[String]) -> Vec<String> {
    names
        .iter()
        .map(|name| name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}
