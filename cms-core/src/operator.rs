use serde::{Deserialize, Serialize};

use crate::access::{ProjectFilter, WorkspaceFilter};
use crate::errors::{CmsError, CmsResult};
use crate::id::{IntegrationId, ProjectId, UserId, WorkspaceId};

/// The principal a call is made for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "lowercase")]
pub enum Actor {
    User(UserId),
    Integration(IntegrationId),
    /// Trusted background runner, e.g. the extraction worker.
    Machine,
}

/// Caller descriptor passed to every orchestrator operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    pub actor: Actor,
    pub workspaces: WorkspaceFilter,
    pub projects: ProjectFilter,
}

impl Operator {
    /// Build from loosely-typed parts; exactly one of user, integration or
    /// machine must be set.
    pub fn from_parts(
        user: Option<UserId>,
        integration: Option<IntegrationId>,
        machine: bool,
        workspaces: WorkspaceFilter,
        projects: ProjectFilter,
    ) -> CmsResult<Self> {
        let actor = match (user, integration, machine) {
            (Some(u), None, false) => Actor::User(u),
            (None, Some(i), false) => Actor::Integration(i),
            (None, None, true) => Actor::Machine,
            _ => {
                return Err(CmsError::invalid_operator(
                    "operator must be exactly one of user, integration or machine",
                ))
            }
        };
        Ok(Self::new(actor, workspaces, projects))
    }

    pub fn new(actor: Actor, workspaces: WorkspaceFilter, projects: ProjectFilter) -> Self {
        match actor {
            Actor::Machine => Self::machine(),
            _ => Self {
                actor,
                workspaces,
                projects,
            },
        }
    }

    pub fn user(user: UserId, workspaces: WorkspaceFilter, projects: ProjectFilter) -> Self {
        Self::new(Actor::User(user), workspaces, projects)
    }

    pub fn integration(integration: IntegrationId, workspaces: WorkspaceFilter, projects: ProjectFilter) -> Self {
        Self::new(Actor::Integration(integration), workspaces, projects)
    }

    /// Machine operators are never scope-restricted.
    pub fn machine() -> Self {
        Self {
            actor: Actor::Machine,
            workspaces: WorkspaceFilter::unrestricted(),
            projects: ProjectFilter::unrestricted(),
        }
    }

    pub fn is_machine(&self) -> bool {
        matches!(self.actor, Actor::Machine)
    }

    pub fn user_id(&self) -> Option<UserId> {
        match self.actor {
            Actor::User(u) => Some(u),
            _ => None,
        }
    }

    pub fn integration_id(&self) -> Option<IntegrationId> {
        match self.actor {
            Actor::Integration(i) => Some(i),
            _ => None,
        }
    }

    pub fn can_write_workspace(&self, workspace: &WorkspaceId) -> bool {
        self.is_machine() || self.workspaces.can_write(workspace)
    }

    pub fn can_read_project(&self, project: &ProjectId) -> bool {
        self.is_machine() || self.projects.can_read(project)
    }

    /// Update authority on a project's assets.
    pub fn can_update_project(&self, project: &ProjectId) -> bool {
        self.is_machine() || self.projects.can_write(project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exactly_one_principal() {
        let ws = WorkspaceFilter::unrestricted;
        let pj = ProjectFilter::unrestricted;

        assert!(Operator::from_parts(Some(UserId::new()), None, false, ws(), pj()).is_ok());
        assert!(Operator::from_parts(None, Some(IntegrationId::new()), false, ws(), pj()).is_ok());
        assert!(Operator::from_parts(None, None, true, ws(), pj()).is_ok());

        for (u, i, m) in [
            (None, None, false),
            (Some(UserId::new()), Some(IntegrationId::new()), false),
            (Some(UserId::new()), None, true),
            (None, Some(IntegrationId::new()), true),
        ] {
            let err = Operator::from_parts(u, i, m, ws(), pj()).unwrap_err();
            assert_eq!(err.kind(), crate::errors::ErrorKind::InvalidOperator);
        }
    }

    #[test]
    fn machine_ignores_scopes() {
        let op = Operator::new(Actor::Machine, WorkspaceFilter::none(), ProjectFilter::none());
        assert!(op.can_update_project(&ProjectId::new()));
        assert!(op.projects.is_unrestricted());
    }

    #[test]
    fn user_scopes_apply() {
        let p = ProjectId::new();
        let op = Operator::user(UserId::new(), WorkspaceFilter::none(), ProjectFilter::read_only(vec![p]));
        assert!(op.can_read_project(&p));
        assert!(!op.can_update_project(&p));
        assert!(!op.can_write_workspace(&WorkspaceId::new()));
        assert!(op.user_id().is_some());
        assert!(op.integration_id().is_none());
    }
}
