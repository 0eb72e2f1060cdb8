use serde::{Deserialize, Serialize};

/// Upper bound on dishes visualised per session.
pub const MAX_SELECTED_DISHES: usize = 3;

/// Summary used when context extraction returns none.
pub const NO_SUMMARY_FALLBACK: &str = "No summary could be generated.";

/// Citation attached to a search-grounded response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingSource {
    pub title: String,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DishContext {
    pub dish_name: String,
    pub image_url: Option<String>,
}

/// Real-world grounding for one restaurant.
///
/// `dish_contexts` always lines up 1:1 with the dish list it was resolved
/// for; dishes without a reference image keep their slot with `image_url`
/// set to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextualInfo {
    pub summary: String,
    #[serde(default)]
    pub sources: Vec<GroundingSource>,
    #[serde(default)]
    pub dish_contexts: Vec<DishContext>,
}

impl ContextualInfo {
    /// Reference image for the dish at `index` of the requested list.
    pub fn reference_for(&self, index: usize) -> Option<&str> {
        self.dish_contexts
            .get(index)
            .and_then(|context| context.image_url.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedDish {
    pub name: String,
    /// Base64 image bytes.
    pub image_data: String,
    #[serde(default = "default_image_mime")]
    pub mime_type: String,
}

/// A menu photo ready for OCR.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuImage {
    /// Base64 image bytes.
    pub data: String,
    pub mime_type: String,
}

fn default_image_mime() -> String {
    "image/png".to_string()
}
