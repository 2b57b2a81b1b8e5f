use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmpathyLevel {
    Low,
    Medium,
    High,
}

impl EmpathyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn tone_instruction(&self) -> &'static str {
        match self {
            Self::Low => "Be brief and factual. Skip pleasantries beyond a greeting.",
            Self::Medium => "Be warm but concise. Acknowledge the request before answering.",
            Self::High => {
                "Open by acknowledging how the customer feels, then answer with care and reassurance."
            }
        }
    }
}

/// Per-tenant settings, resolved once per email and passed down explicitly.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantSettings {
    pub tenant_id: TenantId,
    pub company_name: String,
    pub empathy_level: EmpathyLevel,
    pub support_signature: String,
    pub knowledge_snippets: Vec<String>,
    pub competitors: Vec<String>,
}

impl TenantSettings {
    pub fn defaults_for(tenant_id: TenantId) -> Self {
        Self {
            tenant_id,
            company_name: "our store".to_string(),
            empathy_level: EmpathyLevel::Medium,
            support_signature: "The Support Team".to_string(),
            knowledge_snippets: Vec::new(),
            competitors: Vec::new(),
        }
    }
}
