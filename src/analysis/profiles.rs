//! Domain expert profiles.
//!
//! A profile is plain data: the expert's name, its instruction text and the
//! placeholder entries used when extraction comes back empty. New domains are
//! added through configuration, not code.

use serde::{Deserialize, Serialize};

/// Configuration for one domain expert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainProfile {
    /// Short identifier, used in storage keys and prompt headings
    pub name: String,

    /// Human-readable title
    pub title: String,

    /// Instruction text placed at the top of every analysis prompt
    pub system_prompt: String,

    /// Placeholder finding when none could be extracted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_finding: Option<String>,

    /// Placeholder recommendation when none could be extracted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_recommendation: Option<String>,

    /// Placeholder next step when none could be extracted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_next_step: Option<String>,
}

impl DomainProfile {
    pub fn new(
        name: impl Into<String>,
        title: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            system_prompt: system_prompt.into(),
            fallback_finding: None,
            fallback_recommendation: None,
            fallback_next_step: None,
        }
    }

    pub fn with_fallbacks(
        mut self,
        finding: impl Into<String>,
        recommendation: impl Into<String>,
        next_step: impl Into<String>,
    ) -> Self {
        self.fallback_finding = Some(finding.into());
        self.fallback_recommendation = Some(recommendation.into());
        self.fallback_next_step = Some(next_step.into());
        self
    }

    pub fn finding_placeholder(&self) -> String {
        self.fallback_finding.clone().unwrap_or_else(|| format!("{} analysis completed", self.title))
    }

    pub fn recommendation_placeholder(&self) -> String {
        self.fallback_recommendation
            .clone()
            .unwrap_or_else(|| format!("Consider {} design constraints", self.name))
    }

    pub fn next_step_placeholder(&self) -> String {
        self.fallback_next_step
            .clone()
            .unwrap_or_else(|| format!("Review the {} analysis with the team", self.name))
    }
}

/// The default mechanical, electrical and programming experts.
pub fn builtin_profiles() -> Vec<DomainProfile> {
    vec![
        DomainProfile::new(
            "mechanical",
            "Mechanical Engineering",
            "You are a senior mechanical engineer. Analyze the request for structural \
             integrity, materials, tolerances, thermal behaviour, manufacturability and \
             moving-part reliability. Call out failure modes and safety margins.",
        )
        .with_fallbacks(
            "Mechanical analysis completed",
            "Consider mechanical design constraints",
            "Proceed to electrical analysis",
        ),
        DomainProfile::new(
            "electrical",
            "Electrical Engineering",
            "You are a senior electrical engineer. Analyze the request for power budget, \
             circuit topology, signal integrity, sensors and actuators, protection and \
             compliance. Call out component choices and electrical risks.",
        )
        .with_fallbacks(
            "Electrical analysis completed",
            "Consider electrical design constraints",
            "Proceed to programming analysis",
        ),
        DomainProfile::new(
            "programming",
            "Software Engineering",
            "You are a senior software engineer. Analyze the request for software \
             architecture, control logic, data flow, interfaces, testing and maintainability. \
             Call out libraries, algorithms and integration risks.",
        )
        .with_fallbacks(
            "Programming analysis completed",
            "Consider software architecture constraints",
            "Proceed to deliverable generation",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names_unique() {
        let profiles = builtin_profiles();
        let mut names: Vec<_> = profiles.iter().map(|p| p.name.clone()).collect();
        names.dedup();
        assert_eq!(names.len(), 3);
    }

    #[test]
    fn test_derived_placeholders() {
        let profile = DomainProfile::new("thermal", "Thermal", "prompt");
        assert_eq!(profile.finding_placeholder(), "Thermal analysis completed");
        assert_eq!(profile.recommendation_placeholder(), "Consider thermal design constraints");
        assert!(!profile.next_step_placeholder().is_empty());
    }
}
