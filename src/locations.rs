//! Known reporting locations (state → district → cities).
//!
//! A location identifier is `"{state}-{district}-{city}"` lower-cased with
//! whitespace runs replaced by `_`, e.g. `sikkim-gangtok-ranipool`.

use serde::Serialize;

const HIERARCHY: &[(&str, &[(&str, &[&str])])] = &[
    ("Assam", &[("Kamrup", &["Kamrup"]), ("Dibrugarh", &["Dibrugarh"])]),
    ("Tripura", &[("West Tripura", &["West Tripura"])]),
    ("Meghalaya", &[("East Khasi Hills", &["East Khasi Hills"])]),
    ("Manipur", &[("Imphal West", &["Imphal West"])]),
    (
        "Sikkim",
        &[
            ("Gangtok", &["Gangtok", "Ranipool", "Singtam", "Ranka", "Tadong"]),
            ("Pakyong", &["Pakyong", "Rhenock", "Rangpo"]),
            ("Soreng", &["Soreng", "Chakung"]),
            ("Namchi", &["Namchi", "Jorethang", "Melli", "Ravangla"]),
            ("Gyalshing", &["Gyalshing", "Yuksom", "Pelling", "Dentam"]),
            ("Mangan", &["Mangan", "Chungthang", "Lachen", "Lachung"]),
        ],
    ),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    pub id: String,
    pub state: &'static str,
    pub district: &'static str,
    pub city: &'static str,
}

/// Build the identifier for a state/district/city triple.
pub fn location_id(state: &str, district: &str, city: &str) -> String {
    format!("{state}-{district}-{city}")
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
}

/// Every known location, in catalog order.
pub fn known_locations() -> Vec<Location> {
    HIERARCHY
        .iter()
        .flat_map(|&(state, districts)| {
            districts.iter().flat_map(move |&(district, cities)| {
                cities.iter().map(move |&city| Location {
                    id: location_id(state, district, city),
                    state,
                    district,
                    city,
                })
            })
        })
        .collect()
}

pub fn known_location_ids() -> Vec<String> {
    known_locations().into_iter().map(|l| l.id).collect()
}
