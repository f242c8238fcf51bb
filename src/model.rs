use serde::{Deserialize, Serialize};

/// Dubai areas the catalog is seeded with. Also used by the hint extractor
/// to recognize location mentions without a round trip to the database.
pub const AREAS: &[&str] = &[
    "Dubai Marina",
    "Downtown Dubai",
    "Palm Jumeirah",
    "Dubai Hills Estate",
    "Business Bay",
    "Jumeirah Village Circle",
    "Arabian Ranches",
    "Emirates Hills",
    "Jumeirah Beach Residence",
    "Dubai Creek Harbour",
    "Al Furjan",
    "Meydan",
    "Dubai South",
    "Dubai Silicon Oasis",
    "Al Barsha",
    "Dubai Sports City",
    "Motor City",
    "Jumeirah Lake Towers",
    "Dubai Investment Park",
];

/// Common abbreviations users type instead of the full area name.
pub const AREA_ALIASES: &[(&str, &str)] = &[
    ("jvc", "Jumeirah Village Circle"),
    ("jbr", "Jumeirah Beach Residence"),
    ("jlt", "Jumeirah Lake Towers"),
];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyType {
    Apartment,
    Villa,
    Townhouse,
    Penthouse,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Apartment => "Apartment",
            PropertyType::Villa => "Villa",
            PropertyType::Townhouse => "Townhouse",
            PropertyType::Penthouse => "Penthouse",
        }
    }
}

/// Possession status as stored in the catalog: "Ready", a handover quarter
/// like "Q1 2026", or a bare "Under Construction" when no quarter is known.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Possession {
    Ready,
    UnderConstruction { quarter: Option<String> },
}

impl Possession {
    pub fn as_catalog_text(&self) -> String {
        match self {
            Possession::Ready => "Ready".to_string(),
            Possession::UnderConstruction { quarter: Some(q) } => q.clone(),
            Possession::UnderConstruction { quarter: None } => "Under Construction".to_string(),
        }
    }
}

impl From<String> for Possession {
    fn from(s: String) -> Self {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("ready") {
            Possession::Ready
        } else if trimmed.eq_ignore_ascii_case("under construction") {
            Possession::UnderConstruction { quarter: None }
        } else {
            Possession::UnderConstruction {
                quarter: Some(trimmed.to_string()),
            }
        }
    }
}

impl From<Possession> for String {
    fn from(p: Possession) -> Self {
        p.as_catalog_text()
    }
}

/// One row of the read-only listings catalog. Field names mirror the column
/// names of the `properties` table so a serialized listing is exactly the
/// JSON shape the catalog accessor produces.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PropertyListing {
    pub id: i64,
    pub location: String,
    pub building: Option<String>,
    pub price: i64,
    #[serde(rename = "type")]
    pub property_type: PropertyType,
    pub bedrooms: i32,
    pub size_sqft: Option<i32>,
    pub pool: Option<bool>,
    pub gym: Option<bool>,
    pub balcony: Option<bool>,
    pub available: bool,
    pub possession: Possession,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single turn of the conversation as supplied by the front-end.
/// Turns are ordered and append-only; the service never mutates them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}
