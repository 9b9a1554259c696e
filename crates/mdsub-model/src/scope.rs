//! Program/project transaction scope

use crate::resource::ResourcePath;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Entity type of program nodes
pub const PROGRAM: &str = "program";
/// Entity type of project nodes
pub const PROJECT: &str = "project";

/// The `(program, project)` context a submission writes into
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectScope {
    pub program: String,
    pub project: String,
}

impl ProjectScope {
    /// Create scope
    #[must_use]
    pub fn new(program: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            project: project.into(),
        }
    }

    /// `{program}-{project}`, the value documents carry in `project_id`
    #[must_use]
    pub fn project_id(&self) -> String {
        format!("{}-{}", self.program, self.project)
    }

    /// `/programs/{program}/projects/{project}`
    #[must_use]
    pub fn resource_path(&self) -> ResourcePath {
        ResourcePath::project(&self.program, &self.project)
    }

    /// Storage scope under which nodes of `label` are keyed
    ///
    /// Programs are global, projects live under their program, every other
    /// entity lives under its project.
    #[must_use]
    pub fn node_scope(&self, label: &str) -> Option<String> {
        match label {
            PROGRAM => None,
            PROJECT => Some(self.program.clone()),
            _ => Some(self.project_id()),
        }
    }

    /// Key of the root node of `label` inside this scope
    #[must_use]
    pub fn root_key(&self, label: &str) -> Option<&str> {
        match label {
            PROGRAM => Some(&self.program),
            PROJECT => Some(&self.project),
            _ => None,
        }
    }
}

impl fmt::Display for ProjectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.program, self.project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_scopes() {
        let scope = ProjectScope::new("CGCI", "BLGSP");
        assert_eq!(scope.project_id(), "CGCI-BLGSP");
        assert_eq!(scope.node_scope(PROGRAM), None);
        assert_eq!(scope.node_scope(PROJECT).as_deref(), Some("CGCI"));
        assert_eq!(scope.node_scope("sample").as_deref(), Some("CGCI-BLGSP"));
        assert_eq!(scope.root_key(PROJECT), Some("BLGSP"));
        assert_eq!(scope.root_key("sample"), None);
    }

    #[test]
    fn resource_path() {
        let scope = ProjectScope::new("P", "Q");
        assert_eq!(scope.resource_path().to_string(), "/programs/P/projects/Q");
    }
}
