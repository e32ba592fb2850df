//! Named research personas.
//!
//! A persona is a prompt prepended to the task before it reaches the model.
//! Profiles come from `agents.json` files (a JSON array) in the user data
//! directory and the workspace `.quarry/` directory, and from `[[agents]]`
//! tables in the configuration. Later sources replace earlier ones by id.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::error::ConfigError;

/// File name looked up in each agents directory.
pub const AGENTS_FILE: &str = "agents.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Text prepended to every task run under this persona.
    pub prompt: String,
}

/// Ordered collection of persona profiles.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentStore {
    agents: Vec<AgentProfile>,
}

impl AgentStore {
    pub fn new(agents: Vec<AgentProfile>) -> Self {
        let mut store = Self::default();
        store.extend(agents);
        store
    }

    /// Profiles from the user data dir, the workspace and `configured`, in
    /// that order of precedence (lowest first).
    pub fn discover(workspace: Option<&Path>, configured: &[AgentProfile]) -> Result<Self, ConfigError> {
        let mut store = Self::default();
        if let Some(dirs) = directories::ProjectDirs::from("dev", "quarry", "quarry") {
            store.extend(load_agents(&dirs.data_dir().join(AGENTS_FILE))?);
        }
        if let Some(ws) = workspace {
            store.extend(load_agents(&ws.join(".quarry").join(AGENTS_FILE))?);
        }
        store.extend(configured.iter().cloned());
        debug!(count = store.len(), "Loaded agent profiles");
        Ok(store)
    }

    /// Add `agents`, replacing any profile with the same id in place.
    pub fn extend(&mut self, agents: impl IntoIterator<Item = AgentProfile>) {
        for agent in agents {
            match self.agents.iter_mut().find(|a| a.id == agent.id) {
                Some(existing) => *existing = agent,
                None => self.agents.push(agent),
            }
        }
    }

    pub fn list(&self) -> &[AgentProfile] {
        &self.agents
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    /// First profile, in store order, whose id equals `id` or whose name
    /// equals `name`.
    pub fn resolve(&self, name: Option<&str>, id: Option<&str>) -> Option<&AgentProfile> {
        self.agents.iter().find(|agent| {
            id.is_some_and(|id| agent.id == id) || name.is_some_and(|name| agent.name == name)
        })
    }

    /// Persona prompt for a run that names an agent.
    ///
    /// `Ok(None)` when neither selector is given; an unknown agent is an error.
    pub fn persona_for(&self, name: Option<&str>, id: Option<&str>) -> Result<Option<String>, ConfigError> {
        let name = name.map(str::trim).filter(|s| !s.is_empty());
        let id = id.map(str::trim).filter(|s| !s.is_empty());
        if name.is_none() && id.is_none() {
            return Ok(None);
        }
        self.resolve(name, id)
            .map(|agent| Some(agent.prompt.clone()))
            .ok_or_else(|| ConfigError::Invalid {
                message: format!("unknown agent '{}'", id.or(name).unwrap_or_default()),
            })
    }
}

/// Read an `agents.json` array. A missing file yields no profiles.
pub fn load_agents(path: &Path) -> Result<Vec<AgentProfile>, ConfigError> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path).map_err(|e| parse_error(path, e))?;
    serde_json::from_str(&content).map_err(|e| parse_error(path, e))
}

fn parse_error(path: &Path, e: impl std::fmt::Display) -> ConfigError {
    ConfigError::ParseError {
        message: format!("{}: {}", path.display(), e),
    }
}

/// The task as the model sees it: persona prompt, blank line, task.
pub fn brief(persona: Option<&str>, task: &str) -> String {
    match persona.map(str::trim).filter(|p| !p.is_empty()) {
        Some(persona) => format!("{}\n\n{}", persona, task),
        None => task.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn profile(id: &str, name: &str, prompt: &str) -> AgentProfile {
        AgentProfile {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            prompt: prompt.into(),
        }
    }

    #[test]
    fn test_load_agents_reads_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(AGENTS_FILE);
        std::fs::write(
            &path,
            r#"[{"id": "analyst", "name": "Market Analyst", "prompt": "You are a market analyst."}]"#,
        )
        .unwrap();

        let agents = load_agents(&path).unwrap();
        assert_eq!(agents, vec![profile("analyst", "Market Analyst", "You are a market analyst.")]);
    }

    #[test]
    fn test_load_agents_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_agents(&dir.path().join(AGENTS_FILE)).unwrap().is_empty());
    }

    #[test]
    fn test_load_agents_rejects_non_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(AGENTS_FILE);
        std::fs::write(&path, r#"{"id": "x"}"#).unwrap();
        let err = load_agents(&path).unwrap_err();
        assert!(err.to_string().contains(AGENTS_FILE));
    }

    #[test]
    fn test_discover_workspace_then_config() {
        let dir = tempfile::tempdir().unwrap();
        let quarry_dir = dir.path().join(".quarry");
        std::fs::create_dir_all(&quarry_dir).unwrap();
        std::fs::write(
            quarry_dir.join(AGENTS_FILE),
            r#"[{"id": "a", "name": "A", "prompt": "from file"},
                {"id": "b", "name": "B", "prompt": "b"}]"#,
        )
        .unwrap();

        let store = AgentStore::discover(Some(dir.path()), &[profile("a", "A", "from config")]).unwrap();
        let a = store.resolve(None, Some("a")).unwrap();
        assert_eq!(a.prompt, "from config");
        assert!(store.resolve(Some("B"), None).is_some());
    }

    #[test]
    fn test_resolve_by_id_or_name_in_order() {
        let store = AgentStore::new(vec![
            profile("fin", "Finance", "f"),
            profile("tech", "Technology", "t"),
        ]);
        assert_eq!(store.resolve(Some("Technology"), None).unwrap().id, "tech");
        assert_eq!(store.resolve(None, Some("fin")).unwrap().name, "Finance");
        // The first profile matching either selector wins.
        assert_eq!(store.resolve(Some("Technology"), Some("fin")).unwrap().id, "fin");
        assert!(store.resolve(Some("fin"), None).is_none());
        assert!(store.resolve(None, None).is_none());
    }

    #[test]
    fn test_persona_for() {
        let store = AgentStore::new(vec![profile("fin", "Finance", "Focus on revenue.")]);
        assert_eq!(store.persona_for(None, None).unwrap(), None);
        assert_eq!(store.persona_for(Some("  "), None).unwrap(), None);
        assert_eq!(
            store.persona_for(Some("Finance"), None).unwrap().as_deref(),
            Some("Focus on revenue.")
        );
        let err = store.persona_for(None, Some("legal")).unwrap_err();
        assert!(err.to_string().contains("unknown agent 'legal'"));
    }

    #[test]
    fn test_brief_prepends_persona() {
        assert_eq!(brief(Some("Be terse."), "cloud market"), "Be terse.\n\ncloud market");
        assert_eq!(brief(Some("   "), "cloud market"), "cloud market");
        assert_eq!(brief(None, "cloud market"), "cloud market");
    }
}
