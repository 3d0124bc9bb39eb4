//! Agent resolution
//!
//! An agent is the persona the dialogue model plays on a call: its
//! instructions and optionally its voice. Inbound calls are bound to an
//! agent by the number that was dialled; outbound calls may name one.

use crate::domain::shared::error::{DomainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub instructions: String,
    /// Overrides the configured default voice
    #[serde(default)]
    pub voice: Option<String>,
}

/// Agent chosen for a call
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedAgent {
    /// None when no agent is bound and no default is configured
    pub agent_id: Option<String>,
    pub instructions: String,
    pub voice: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AgentDirectory {
    default_agent: Option<String>,
    bindings: HashMap<String, String>,
    profiles: HashMap<String, AgentProfile>,
    fallback_instructions: String,
}

impl AgentDirectory {
    pub fn new(
        default_agent: Option<String>,
        bindings: HashMap<String, String>,
        profiles: Vec<AgentProfile>,
        fallback_instructions: impl Into<String>,
    ) -> Self {
        Self {
            default_agent,
            bindings: bindings
                .into_iter()
                .map(|(number, agent)| (number.trim().to_string(), agent))
                .collect(),
            profiles: profiles.into_iter().map(|p| (p.id.clone(), p)).collect(),
            fallback_instructions: fallback_instructions.into(),
        }
    }

    /// Agent bound to the dialled number, else the default agent
    pub fn resolve_for_callee(&self, callee: &str) -> ResolvedAgent {
        let agent_id = self
            .bindings
            .get(callee.trim())
            .or(self.default_agent.as_ref())
            .cloned();
        self.materialize(agent_id)
    }

    /// Explicit agent choice; an unknown agent id is rejected
    pub fn resolve_override(&self, agent_id: &str) -> Result<ResolvedAgent> {
        if !self.profiles.contains_key(agent_id) {
            return Err(DomainError::NotFound(format!("agent {}", agent_id)));
        }
        Ok(self.materialize(Some(agent_id.to_string())))
    }

    fn materialize(&self, agent_id: Option<String>) -> ResolvedAgent {
        match agent_id.as_deref().and_then(|id| self.profiles.get(id)) {
            Some(profile) => ResolvedAgent {
                agent_id,
                instructions: profile.instructions.clone(),
                voice: profile.voice.clone(),
            },
            None => ResolvedAgent {
                agent_id,
                instructions: self.fallback_instructions.clone(),
                voice: None,
            },
        }
    }
}
