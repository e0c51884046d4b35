use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Finite and within WGS84 bounds.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude.abs() <= 90.0
            && self.longitude.abs() <= 180.0
    }
}

/// Closed set of claimable place kinds. Unknown source tags collapse to
/// `Other` at the parse edge only; every variant maps totally below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PoiKind {
    Park,
    Museum,
    Historic,
    Church,
    Monument,
    Castle,
    Windmill,
    Other,
}

impl PoiKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoiKind::Park => "park",
            PoiKind::Museum => "museum",
            PoiKind::Historic => "historic",
            PoiKind::Church => "church",
            PoiKind::Monument => "monument",
            PoiKind::Castle => "castle",
            PoiKind::Windmill => "windmill",
            PoiKind::Other => "other",
        }
    }

    pub fn from_tag(value: &str) -> Self {
        match value {
            "park" => PoiKind::Park,
            "museum" => PoiKind::Museum,
            "historic" => PoiKind::Historic,
            "church" => PoiKind::Church,
            "monument" => PoiKind::Monument,
            "castle" => PoiKind::Castle,
            "windmill" => PoiKind::Windmill,
            _ => PoiKind::Other,
        }
    }

    /// Map marker glyph for this kind.
    pub fn marker(&self) -> &'static str {
        match self {
            PoiKind::Park => "🌳",
            PoiKind::Museum => "🎨",
            PoiKind::Historic => "🏛️",
            PoiKind::Church => "⛪",
            PoiKind::Monument => "🗿",
            PoiKind::Castle => "🏰",
            PoiKind::Windmill => "🌬️",
            PoiKind::Other => "📍",
        }
    }
}

/// A claimable physical place. Immutable once a session has observed it;
/// the persistence boundary creates it lazily on first claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Poi {
    pub id: String,
    pub name: String,
    pub coordinates: Coordinates,
    pub kind: PoiKind,
    pub category: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_tag() {
        for kind in [
            PoiKind::Park,
            PoiKind::Museum,
            PoiKind::Historic,
            PoiKind::Church,
            PoiKind::Monument,
            PoiKind::Castle,
            PoiKind::Windmill,
            PoiKind::Other,
        ] {
            assert_eq!(PoiKind::from_tag(kind.as_str()), kind);
        }
    }

    #[test]
    fn unknown_tag_maps_to_other() {
        assert_eq!(PoiKind::from_tag("viaduct"), PoiKind::Other);
    }

    #[test]
    fn coordinate_bounds() {
        assert!(Coordinates::new(52.37, 4.89).is_valid());
        assert!(!Coordinates::new(f64::NAN, 4.89).is_valid());
        assert!(!Coordinates::new(91.0, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, -181.0).is_valid());
    }
}
