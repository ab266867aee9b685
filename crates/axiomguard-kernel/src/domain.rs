//! Domain, severity and status vocabulary shared by every component.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Subsystem partition for axioms and violations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DomainTag {
    Combat,
    Inventory,
    World,
    Status,
    Render,
    Integrity,
    Geometry,
    GeometrySegments,
    SpatialTopology,
    PathContinuity,
    RenderDepth,
}

impl DomainTag {
    pub const COUNT: usize = 11;

    pub const ALL: [DomainTag; Self::COUNT] = [
        Self::Combat,
        Self::Inventory,
        Self::World,
        Self::Status,
        Self::Render,
        Self::Integrity,
        Self::Geometry,
        Self::GeometrySegments,
        Self::SpatialTopology,
        Self::PathContinuity,
        Self::RenderDepth,
    ];

    /// Critical domains bypass sampling and always run.
    #[must_use]
    pub const fn is_critical(self) -> bool {
        matches!(
            self,
            Self::Inventory
                | Self::Combat
                | Self::Geometry
                | Self::GeometrySegments
                | Self::World
                | Self::Status
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Combat => "COMBAT",
            Self::Inventory => "INVENTORY",
            Self::World => "WORLD",
            Self::Status => "STATUS",
            Self::Render => "RENDER",
            Self::Integrity => "INTEGRITY",
            Self::Geometry => "GEOMETRY",
            Self::GeometrySegments => "GEOMETRY_SEGMENTS",
            Self::SpatialTopology => "SPATIAL_TOPOLOGY",
            Self::PathContinuity => "PATH_CONTINUITY",
            Self::RenderDepth => "RENDER_DEPTH",
        }
    }

    /// Parse from string (case-insensitive, `-` and `_` interchangeable).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::ALL.into_iter().find(|d| d.as_str() == normalized)
    }

    /// Dense index for per-domain tables.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for DomainTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Violation severity, totally ordered.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    #[default]
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub const ALL: [Severity; 4] = [Self::Low, Self::Medium, Self::High, Self::Critical];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// Parse from string (case-insensitive).
    #[must_use]
    pub fn from_str_loose(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "l" => Some(Self::Low),
            "medium" | "med" | "m" => Some(Self::Medium),
            "high" | "h" => Some(Self::High),
            "critical" | "crit" | "c" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of the stability score. Derived on every read, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemStatus {
    Stable,
    Unstable,
    Critical,
}

impl SystemStatus {
    /// `score <= critical → Critical`, `score < stable → Unstable`, else `Stable`.
    ///
    /// The critical bound is inclusive: accumulated penalties of exactly
    /// `100 - critical` already count as a critical collapse.
    #[must_use]
    pub fn classify(score: f64, stable_threshold: f64, critical_threshold: f64) -> Self {
        if score <= critical_threshold {
            Self::Critical
        } else if score < stable_threshold {
            Self::Unstable
        } else {
            Self::Stable
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "STABLE",
            Self::Unstable => "UNSTABLE",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn critical_domain_set_is_fixed() {
        let critical: Vec<DomainTag> = DomainTag::ALL
            .into_iter()
            .filter(|d| d.is_critical())
            .collect();
        assert_eq!(
            critical,
            vec![
                DomainTag::Combat,
                DomainTag::Inventory,
                DomainTag::World,
                DomainTag::Status,
                DomainTag::Geometry,
                DomainTag::GeometrySegments,
            ]
        );
        assert!(!DomainTag::SpatialTopology.is_critical());
        assert!(!DomainTag::PathContinuity.is_critical());
        assert!(!DomainTag::RenderDepth.is_critical());
    }

    #[test]
    fn domain_names_round_trip_loosely() {
        for d in DomainTag::ALL {
            assert_eq!(DomainTag::from_str_loose(d.as_str()), Some(d));
            assert_eq!(DomainTag::from_str_loose(&d.as_str().to_lowercase()), Some(d));
        }
        assert_eq!(
            DomainTag::from_str_loose("spatial-topology"),
            Some(DomainTag::SpatialTopology)
        );
        assert_eq!(DomainTag::from_str_loose("bogus"), None);
    }

    #[test]
    fn indices_are_dense() {
        for (i, d) in DomainTag::ALL.into_iter().enumerate() {
            assert_eq!(d.index(), i);
        }
    }

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Low < Severity::Medium);
        assert!(Severity::Medium < Severity::High);
        assert!(Severity::High < Severity::Critical);
        assert_eq!(Severity::from_str_loose("CRIT"), Some(Severity::Critical));
        assert_eq!(Severity::from_str_loose("nope"), None);
    }

    #[test]
    fn status_thresholds() {
        assert_eq!(SystemStatus::classify(100.0, 80.0, 40.0), SystemStatus::Stable);
        assert_eq!(SystemStatus::classify(80.0, 80.0, 40.0), SystemStatus::Stable);
        assert_eq!(SystemStatus::classify(79.9, 80.0, 40.0), SystemStatus::Unstable);
        assert_eq!(SystemStatus::classify(40.1, 80.0, 40.0), SystemStatus::Unstable);
        assert_eq!(SystemStatus::classify(40.0, 80.0, 40.0), SystemStatus::Critical);
        assert_eq!(SystemStatus::classify(0.0, 80.0, 40.0), SystemStatus::Critical);
    }

    #[test]
    fn serde_uses_screaming_names() {
        let json = serde_json::to_string(&DomainTag::GeometrySegments).unwrap();
        assert_eq!(json, "\"GEOMETRY_SEGMENTS\"");
        let sev: Severity = serde_json::from_str("\"HIGH\"").unwrap();
        assert_eq!(sev, Severity::High);
    }
}
