//! Agent personas and their model settings.
//!
//! Each persona is a variant of the closed [`AgentKind`] enum. Prompt
//! templates and model settings are exhaustive matches, so adding a
//! persona is a compile-time-checked change rather than a string-keyed
//! lookup that can silently miss.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// The six fixed personas a caller can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// General professional-development mentor.
    Mentor,
    /// Market/company discovery analyst.
    DiscoveryAnalyst,
    /// Competitive-intelligence scout.
    CompetitorScout,
    /// Long-form content writer.
    ContentWriter,
    /// Career-path coach.
    CareerCoach,
    /// Business strategy advisor.
    StrategyAdvisor,
}

impl std::fmt::Display for AgentKind {
    /// Kebab-case form matching the CLI value names.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AgentKind::Mentor => "mentor",
            AgentKind::DiscoveryAnalyst => "discovery-analyst",
            AgentKind::CompetitorScout => "competitor-scout",
            AgentKind::ContentWriter => "content-writer",
            AgentKind::CareerCoach => "career-coach",
            AgentKind::StrategyAdvisor => "strategy-advisor",
        };
        write!(f, "{}", name)
    }
}

/// Fixed generation settings per persona.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
}

impl AgentKind {
    pub const ALL: [AgentKind; 6] = [
        AgentKind::Mentor,
        AgentKind::DiscoveryAnalyst,
        AgentKind::CompetitorScout,
        AgentKind::ContentWriter,
        AgentKind::CareerCoach,
        AgentKind::StrategyAdvisor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentKind::Mentor => "mentor",
            AgentKind::DiscoveryAnalyst => "discovery_analyst",
            AgentKind::CompetitorScout => "competitor_scout",
            AgentKind::ContentWriter => "content_writer",
            AgentKind::CareerCoach => "career_coach",
            AgentKind::StrategyAdvisor => "strategy_advisor",
        }
    }

    pub fn parse(s: &str) -> Option<AgentKind> {
        match s {
            "mentor" => Some(AgentKind::Mentor),
            "discovery_analyst" => Some(AgentKind::DiscoveryAnalyst),
            "competitor_scout" => Some(AgentKind::CompetitorScout),
            "content_writer" => Some(AgentKind::ContentWriter),
            "career_coach" => Some(AgentKind::CareerCoach),
            "strategy_advisor" => Some(AgentKind::StrategyAdvisor),
            _ => None,
        }
    }

    /// The persona's base role prompt. Composed with retrieved context
    /// and the user message by the prompt composer.
    pub fn role_prompt(&self) -> &'static str {
        match self {
            AgentKind::Mentor => {
                "You are a seasoned professional-development mentor. Give direct, \
                 actionable advice grounded in the context provided. Prefer concrete \
                 next steps over generalities."
            }
            AgentKind::DiscoveryAnalyst => {
                "You are a discovery analyst. Identify companies, markets, and \
                 opportunities from the supplied research. Cite specific facts, \
                 figures, and dates from the context."
            }
            AgentKind::CompetitorScout => {
                "You are a competitive-intelligence scout. Summarize competitor \
                 positioning, funding, and recent moves. Every claim should trace \
                 back to the supplied search results."
            }
            AgentKind::ContentWriter => {
                "You are a professional content writer. Produce polished prose in \
                 the requested format, weaving in facts from the supplied context."
            }
            AgentKind::CareerCoach => {
                "You are a career coach. Tailor guidance to the user's profile and \
                 goals described in the context. Be encouraging but honest."
            }
            AgentKind::StrategyAdvisor => {
                "You are a business strategy advisor. Weigh trade-offs explicitly \
                 and recommend a course of action backed by the supplied research."
            }
        }
    }

    /// Fixed temperature / token settings per persona. Kept static by
    /// design; tune here, not at call sites.
    pub fn model_settings(&self) -> ModelSettings {
        match self {
            AgentKind::Mentor => ModelSettings {
                model: "gpt-4o".to_string(),
                temperature: 0.7,
                max_tokens: 1200,
            },
            AgentKind::DiscoveryAnalyst => ModelSettings {
                model: "gpt-4o".to_string(),
                temperature: 0.3,
                max_tokens: 1600,
            },
            AgentKind::CompetitorScout => ModelSettings {
                model: "gpt-4o".to_string(),
                temperature: 0.2,
                max_tokens: 1600,
            },
            AgentKind::ContentWriter => ModelSettings {
                model: "gpt-4o".to_string(),
                temperature: 0.9,
                max_tokens: 2400,
            },
            AgentKind::CareerCoach => ModelSettings {
                model: "gpt-4o-mini".to_string(),
                temperature: 0.7,
                max_tokens: 1200,
            },
            AgentKind::StrategyAdvisor => ModelSettings {
                model: "gpt-4o".to_string(),
                temperature: 0.4,
                max_tokens: 2000,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_every_kind() {
        for kind in AgentKind::ALL {
            assert_eq!(AgentKind::parse(kind.as_str()), Some(kind));
        }
    }

    #[test]
    fn parse_rejects_unknown() {
        assert_eq!(AgentKind::parse("growth_hacker"), None);
    }

    #[test]
    fn settings_are_sane() {
        for kind in AgentKind::ALL {
            let s = kind.model_settings();
            assert!(!s.model.is_empty());
            assert!((0.0..=2.0).contains(&s.temperature));
            assert!(s.max_tokens > 0);
        }
    }
}
