pub mod engine;
pub mod explain;
pub mod metadata;
pub mod prefs;

pub use engine::{RecommendationEngine, RecommendationResult, Strategy};
pub use explain::ExplanationClient;
pub use prefs::UserPrefs;
