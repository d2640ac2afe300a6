use serde::{Deserialize, Serialize};

use super::enums::Disease;

/// Raised when a disease total at a location crosses the outbreak threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutbreakAlert {
    pub location_id: String,
    pub disease: Disease,
    pub cases: u64,
    pub threshold: u64,
}
