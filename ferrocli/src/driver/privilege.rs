//! Privilege level management with graph-based navigation.

use std::collections::{HashMap, HashSet, VecDeque};

use indexmap::IndexMap;

use crate::error::{PrivilegeError, Result};
use crate::platform::PrivilegeLevel;

/// Manages privilege level navigation over a validated tree.
///
/// Levels connect to their parent (`previous_priv`); edges are walked in both
/// directions. This manager handles:
/// - Validating the level table on construction
/// - Determining the level a prompt belongs to
/// - Finding paths and transitions between levels
/// - Tracking the last level derived from a live prompt
/// - Adding levels at runtime (named configuration sessions)
#[derive(Debug, Clone)]
pub struct PrivilegeManager {
    /// All defined privilege levels, in definition order.
    levels: IndexMap<String, PrivilegeLevel>,

    /// Adjacency list for the privilege graph.
    graph: HashMap<String, HashSet<String>>,

    /// Name of the level without a parent.
    root: String,

    /// Last level derived from a prompt.
    current: Option<String>,
}

/// Which way a single-edge transition goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Parent to child, using the child's escalate command.
    Escalate,
    /// Child to parent, using the child's deescalate command.
    Deescalate,
}

/// Information about a privilege level transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionInfo {
    /// Command to execute for the transition.
    pub command: String,

    /// Escalation or de-escalation.
    pub direction: Direction,

    /// Prompt that asks for the secondary secret. If `Some`, authentication
    /// is required.
    pub auth_prompt: Option<String>,
}

impl PrivilegeManager {
    /// Validate `levels` and build the manager.
    ///
    /// The table must have exactly one root, every parent must exist, every
    /// level must reach the root, and every non-root level needs both an
    /// escalate and a deescalate command.
    pub fn new(levels: IndexMap<String, PrivilegeLevel>) -> Result<Self> {
        let mut roots = Vec::new();
        for (key, level) in &levels {
            if key != &level.name {
                return Err(invalid(format!(
                    "level registered as '{key}' is named '{}'",
                    level.name
                )));
            }
            match &level.previous_priv {
                None => roots.push(key.clone()),
                Some(parent) => {
                    if !levels.contains_key(parent) {
                        return Err(invalid(format!(
                            "level '{key}' refers to unknown parent '{parent}'"
                        )));
                    }
                    check_commands(level)?;
                }
            }
            check_auth(level)?;
        }

        let root = match roots.as_slice() {
            [root] => root.clone(),
            [] => return Err(invalid("no root level".to_string())),
            many => return Err(invalid(format!("multiple root levels: {many:?}"))),
        };

        for name in levels.keys() {
            let mut node = name;
            let mut steps = 0;
            while let Some(parent) = levels.get(node).and_then(|l| l.previous_priv.as_ref()) {
                node = parent;
                steps += 1;
                if steps > levels.len() {
                    return Err(invalid(format!("level '{name}' is part of a cycle")));
                }
            }
        }

        let graph = Self::build_graph(&levels);

        Ok(Self {
            levels,
            graph,
            root,
            current: None,
        })
    }

    /// Build the bidirectional adjacency list from privilege definitions.
    fn build_graph(levels: &IndexMap<String, PrivilegeLevel>) -> HashMap<String, HashSet<String>> {
        let mut graph: HashMap<String, HashSet<String>> = HashMap::new();

        for (name, level) in levels {
            graph.entry(name.clone()).or_default();

            if let Some(ref parent) = level.previous_priv {
                graph.entry(name.clone()).or_default().insert(parent.clone());
                graph.entry(parent.clone()).or_default().insert(name.clone());
            }
        }

        graph
    }

    /// Every level whose filters and pattern accept `prompt`, in definition order.
    pub fn matching_levels(&self, prompt: &str) -> Vec<&PrivilegeLevel> {
        self.levels.values().filter(|l| l.matches(prompt)).collect()
    }

    /// The single level `prompt` belongs to.
    ///
    /// No match is [`PrivilegeError::UnknownLevel`]; several matches are
    /// [`PrivilegeError::AmbiguousLevel`].
    pub fn determine_from_prompt(&self, prompt: &str) -> Result<&PrivilegeLevel> {
        let matches = self.matching_levels(prompt);
        match matches.as_slice() {
            [level] => Ok(level),
            [] => Err(PrivilegeError::UnknownLevel {
                prompt: prompt.to_string(),
            }
            .into()),
            many => Err(PrivilegeError::AmbiguousLevel {
                prompt: prompt.to_string(),
                candidates: many.iter().map(|l| l.name.clone()).collect(),
            }
            .into()),
        }
    }

    /// Get the current privilege level.
    pub fn current(&self) -> Option<&PrivilegeLevel> {
        self.current.as_ref().and_then(|name| self.levels.get(name))
    }

    /// Set the current privilege level by name.
    pub fn set_current(&mut self, name: &str) -> Result<()> {
        if self.levels.contains_key(name) {
            self.current = Some(name.to_string());
            Ok(())
        } else {
            Err(undefined(name))
        }
    }

    /// Forget the current level, e.g. after the session closed.
    pub fn clear_current(&mut self) {
        self.current = None;
    }

    /// Get a privilege level by name.
    pub fn get(&self, name: &str) -> Option<&PrivilegeLevel> {
        self.levels.get(name)
    }

    /// The level without a parent.
    pub fn root(&self) -> &PrivilegeLevel {
        &self.levels[self.root.as_str()]
    }

    /// Find the shortest path from one privilege level to another.
    ///
    /// Returns a list of privilege level names to traverse, including
    /// both the start and end nodes.
    pub fn find_path(&self, from: &str, to: &str) -> Result<Vec<String>> {
        if !self.levels.contains_key(from) {
            return Err(undefined(from));
        }
        if !self.levels.contains_key(to) {
            return Err(undefined(to));
        }
        if from == to {
            return Ok(vec![from.to_string()]);
        }

        let mut queue = VecDeque::new();
        let mut visited = HashSet::new();
        let mut parent: HashMap<String, String> = HashMap::new();

        queue.push_back(from.to_string());
        visited.insert(from.to_string());

        while let Some(current) = queue.pop_front() {
            if current == to {
                let mut path = vec![to.to_string()];
                let mut node = to.to_string();

                while let Some(prev) = parent.get(&node) {
                    path.push(prev.clone());
                    node = prev.clone();
                }

                path.reverse();
                return Ok(path);
            }

            if let Some(neighbors) = self.graph.get(&current) {
                for neighbor in neighbors {
                    if visited.insert(neighbor.clone()) {
                        parent.insert(neighbor.clone(), current.clone());
                        queue.push_back(neighbor.clone());
                    }
                }
            }
        }

        Err(PrivilegeError::NoPath {
            from: from.to_string(),
            to: to.to_string(),
        }
        .into())
    }

    /// The level one edge from `from` toward `to`, or `None` when they are equal.
    pub fn next_hop(&self, from: &str, to: &str) -> Result<Option<String>> {
        let mut path = self.find_path(from, to)?;
        if path.len() < 2 {
            return Ok(None);
        }
        Ok(Some(path.swap_remove(1)))
    }

    /// Get the transition from one level to an adjacent level.
    pub fn get_transition(&self, from: &str, to: &str) -> Option<TransitionInfo> {
        let from_level = self.levels.get(from)?;
        let to_level = self.levels.get(to)?;

        if to_level.previous_priv.as_deref() == Some(from) {
            return Some(TransitionInfo {
                command: to_level.escalate_command.clone()?,
                direction: Direction::Escalate,
                auth_prompt: to_level
                    .escalate_auth
                    .then(|| to_level.escalate_prompt.clone())
                    .flatten(),
            });
        }

        if from_level.previous_priv.as_deref() == Some(to) {
            return Some(TransitionInfo {
                command: from_level.deescalate_command.clone()?,
                direction: Direction::Deescalate,
                auth_prompt: None,
            });
        }

        None
    }

    /// Longest root-to-leaf path, in edges, at least 1.
    pub fn depth(&self) -> usize {
        self.levels
            .keys()
            .map(|name| {
                let mut depth = 0;
                let mut node = name;
                while let Some(parent) = self.levels.get(node).and_then(|l| l.previous_priv.as_ref())
                {
                    node = parent;
                    depth += 1;
                }
                depth
            })
            .max()
            .unwrap_or(0)
            .max(1)
    }

    /// Maximum number of transitions one acquisition may attempt.
    ///
    /// Any two levels are at most `2 * depth` edges apart; one extra attempt
    /// covers a single rejected transition.
    pub fn hop_budget(&self) -> usize {
        2 * self.depth() + 1
    }

    /// Add a leaf level at runtime.
    ///
    /// Existing names are rejected with [`PrivilegeError::DuplicateLevel`]; the
    /// parent must already exist. Levels are never removed.
    pub fn register_dynamic_level(&mut self, level: PrivilegeLevel) -> Result<()> {
        if self.levels.contains_key(&level.name) {
            return Err(PrivilegeError::DuplicateLevel { name: level.name }.into());
        }
        let Some(parent) = level.previous_priv.clone() else {
            return Err(invalid(format!("dynamic level '{}' has no parent", level.name)));
        };
        if !self.levels.contains_key(&parent) {
            return Err(invalid(format!(
                "dynamic level '{}' refers to unknown parent '{parent}'",
                level.name
            )));
        }
        check_commands(&level)?;
        check_auth(&level)?;

        let name = level.name.clone();
        self.graph.entry(name.clone()).or_default().insert(parent.clone());
        self.graph.entry(parent).or_default().insert(name.clone());
        self.levels.insert(name, level);
        Ok(())
    }

    /// A prompt regex matching any level, suitable for the channel config.
    pub fn combined_prompt_pattern(&self) -> String {
        self.levels
            .values()
            .map(|level| format!("(?:{})", level.pattern_source()))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Get all privilege level names.
    pub fn level_names(&self) -> impl Iterator<Item = &String> {
        self.levels.keys()
    }

    /// All levels, in definition order.
    pub fn levels(&self) -> &IndexMap<String, PrivilegeLevel> {
        &self.levels
    }
}

fn invalid(message: String) -> crate::Error {
    PrivilegeError::InvalidGraph { message }.into()
}

fn undefined(name: &str) -> crate::Error {
    PrivilegeError::UndefinedLevel {
        name: name.to_string(),
    }
    .into()
}

fn check_commands(level: &PrivilegeLevel) -> Result<()> {
    if level.escalate_command.as_deref().is_none_or(str::is_empty) {
        return Err(invalid(format!(
            "level '{}' has no escalate command",
            level.name
        )));
    }
    if level.deescalate_command.as_deref().is_none_or(str::is_empty) {
        return Err(invalid(format!(
            "level '{}' has no deescalate command",
            level.name
        )));
    }
    Ok(())
}

fn check_auth(level: &PrivilegeLevel) -> Result<()> {
    if level.escalate_auth && level.escalate_prompt.as_deref().is_none_or(str::is_empty) {
        return Err(invalid(format!(
            "level '{}' requires escalation auth but has no auth prompt",
            level.name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn make_test_levels() -> IndexMap<String, PrivilegeLevel> {
        let user = PrivilegeLevel::new("user", r"(?m)^[\w.\-]+>\s*$").unwrap();

        let privileged = PrivilegeLevel::new("privileged", r"(?m)^[\w.\-()]+#\s*$")
            .unwrap()
            .with_parent("user")
            .with_escalate("enable")
            .with_deescalate("disable")
            .with_auth(r"(?i)^password:\s?$")
            .with_not_contains("(config");

        let configuration = PrivilegeLevel::new("configuration", r"(?m)^[\w.\-]+\(config[^)]*\)#\s*$")
            .unwrap()
            .with_parent("privileged")
            .with_escalate("configure terminal")
            .with_deescalate("end");

        let mut levels = IndexMap::new();
        levels.insert("user".to_string(), user);
        levels.insert("privileged".to_string(), privileged);
        levels.insert("configuration".to_string(), configuration);
        levels
    }

    fn manager() -> PrivilegeManager {
        PrivilegeManager::new(make_test_levels()).unwrap()
    }

    fn invalid_message(levels: IndexMap<String, PrivilegeLevel>) -> String {
        match PrivilegeManager::new(levels).unwrap_err() {
            crate::Error::Privilege(PrivilegeError::InvalidGraph { message }) => message,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_determine_privilege() {
        let manager = manager();

        let level = manager.determine_from_prompt("router>").unwrap();
        assert_eq!(level.name, "user");

        let level = manager.determine_from_prompt("router#").unwrap();
        assert_eq!(level.name, "privileged");

        let level = manager.determine_from_prompt("router(config)#").unwrap();
        assert_eq!(level.name, "configuration");

        let level = manager.determine_from_prompt("router(config-if)#").unwrap();
        assert_eq!(level.name, "configuration");
    }

    #[test]
    fn test_unknown_prompt() {
        let err = manager().determine_from_prompt("login:").unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Privilege(PrivilegeError::UnknownLevel { ref prompt }) if prompt == "login:"
        ));
    }

    #[test]
    fn test_ambiguous_prompt() {
        let mut levels = make_test_levels();
        levels
            .get_mut("privileged")
            .unwrap()
            .not_contains
            .clear();

        let manager = PrivilegeManager::new(levels).unwrap();
        let err = manager.determine_from_prompt("router(config)#").unwrap_err();
        match err {
            crate::Error::Privilege(PrivilegeError::AmbiguousLevel { candidates, .. }) => {
                assert_eq!(candidates, vec!["privileged", "configuration"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(manager.matching_levels("router(config)#").len(), 2);
    }

    #[test]
    fn test_find_path() {
        let manager = manager();

        let path = manager.find_path("user", "configuration").unwrap();
        assert_eq!(path, vec!["user", "privileged", "configuration"]);

        let path = manager.find_path("configuration", "user").unwrap();
        assert_eq!(path, vec!["configuration", "privileged", "user"]);

        let path = manager.find_path("user", "user").unwrap();
        assert_eq!(path, vec!["user"]);

        assert_eq!(
            manager.next_hop("user", "configuration").unwrap().as_deref(),
            Some("privileged")
        );
        assert_eq!(manager.next_hop("user", "user").unwrap(), None);

        let err = manager.find_path("user", "shell").unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Privilege(PrivilegeError::UndefinedLevel { .. })
        ));
    }

    #[test]
    fn test_get_transition() {
        let manager = manager();

        let trans = manager.get_transition("user", "privileged").unwrap();
        assert_eq!(trans.command, "enable");
        assert_eq!(trans.direction, Direction::Escalate);
        assert_eq!(trans.auth_prompt.as_deref(), Some(r"(?i)^password:\s?$"));

        let trans = manager.get_transition("privileged", "user").unwrap();
        assert_eq!(trans.command, "disable");
        assert_eq!(trans.direction, Direction::Deescalate);
        assert!(trans.auth_prompt.is_none());

        assert!(manager.get_transition("user", "configuration").is_none());
    }

    #[test]
    fn test_depth_and_budget() {
        let manager = manager();
        assert_eq!(manager.depth(), 2);
        assert_eq!(manager.hop_budget(), 5);
        assert_eq!(manager.root().name, "user");
        assert!(manager.current().is_none());
    }

    #[test]
    fn test_rejects_missing_or_extra_root() {
        let mut levels = make_test_levels();
        levels.get_mut("user").unwrap().previous_priv = Some("configuration".into());
        levels.get_mut("user").unwrap().escalate_command = Some("x".into());
        levels.get_mut("user").unwrap().deescalate_command = Some("y".into());
        assert!(invalid_message(levels).contains("no root"));

        let mut levels = make_test_levels();
        levels.get_mut("configuration").unwrap().previous_priv = None;
        assert!(invalid_message(levels).contains("multiple root"));
    }

    #[test]
    fn test_rejects_dangling_parent() {
        let mut levels = make_test_levels();
        levels.get_mut("configuration").unwrap().previous_priv = Some("nonexistent".into());
        assert!(invalid_message(levels).contains("unknown parent 'nonexistent'"));
    }

    #[test]
    fn test_rejects_missing_commands() {
        let mut levels = make_test_levels();
        levels.get_mut("configuration").unwrap().escalate_command = None;
        assert!(invalid_message(levels).contains("no escalate command"));

        let mut levels = make_test_levels();
        levels.get_mut("privileged").unwrap().deescalate_command = None;
        assert!(invalid_message(levels).contains("no deescalate command"));

        let mut levels = make_test_levels();
        levels.get_mut("privileged").unwrap().escalate_prompt = None;
        assert!(invalid_message(levels).contains("no auth prompt"));
    }

    #[test]
    fn test_rejects_cycle() {
        let mut levels = make_test_levels();
        let a = PrivilegeLevel::new("a", "a#")
            .unwrap()
            .with_parent("b")
            .with_escalate("to-a")
            .with_deescalate("from-a");
        let b = PrivilegeLevel::new("b", "b#")
            .unwrap()
            .with_parent("a")
            .with_escalate("to-b")
            .with_deescalate("from-b");
        levels.insert("a".into(), a);
        levels.insert("b".into(), b);
        assert!(invalid_message(levels).contains("cycle"));
    }

    #[test]
    fn test_register_dynamic_level() {
        let mut manager = manager();
        let session = PrivilegeLevel::new("config_session_a", r"(?m)^\S+\(config-s-a\)#\s?$")
            .unwrap()
            .with_parent("privileged")
            .with_escalate("configure session a")
            .with_deescalate("end");
        manager.register_dynamic_level(session.clone()).unwrap();

        assert!(manager.get("config_session_a").is_some());
        assert_eq!(
            manager.find_path("configuration", "config_session_a").unwrap(),
            vec!["configuration", "privileged", "config_session_a"]
        );
        assert!(manager.combined_prompt_pattern().contains("config-s-a"));

        let err = manager.register_dynamic_level(session).unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Privilege(PrivilegeError::DuplicateLevel { ref name }) if name == "config_session_a"
        ));

        let orphan = PrivilegeLevel::new("orphan", "o#")
            .unwrap()
            .with_parent("missing")
            .with_escalate("x")
            .with_deescalate("y");
        assert!(matches!(
            manager.register_dynamic_level(orphan).unwrap_err(),
            crate::Error::Privilege(PrivilegeError::InvalidGraph { .. })
        ));
    }

    #[test]
    fn test_combined_pattern_matches_every_level() {
        let manager = manager();
        let combined = regex::bytes::Regex::new(&manager.combined_prompt_pattern()).unwrap();
        for prompt in ["router>", "router#", "router(config)#"] {
            assert!(combined.is_match(prompt.as_bytes()), "{prompt}");
        }
    }

    proptest! {
        #[test]
        fn unique_match_is_reported(host in "[a-z][a-z0-9\\-]{0,20}", mode in 0usize..3) {
            let manager = manager();
            let (prompt, expected) = match mode {
                0 => (format!("{host}>"), "user"),
                1 => (format!("{host}#"), "privileged"),
                _ => (format!("{host}(config)#"), "configuration"),
            };
            let level = manager.determine_from_prompt(&prompt).unwrap();
            prop_assert_eq!(level.name.as_str(), expected);
        }
    }
}
