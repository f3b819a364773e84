//! Minimum-privilege role synthesis
//!
//! Every backend gets two identities: an ExecutionAgent that reads the
//! workload's injected secrets, and a TriggerAgent that launches exactly one
//! task in exactly one execution context. The algorithm is shared; each
//! backend supplies its vocabulary through [`RoleScope`].

use std::collections::BTreeSet;
use std::fmt;

use tracing::debug;

use crate::backend::BackendKind;
use crate::env::{ResolvedEnvironment, SecretBinding};
use crate::{Error, Result};

/// Which of the two workload identities a role is
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Identity {
    /// Identity the running container uses to read its injected secrets
    ExecutionAgent,
    /// Identity the scheduler uses to launch the task
    TriggerAgent,
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExecutionAgent => write!(f, "ExecutionAgent"),
            Self::TriggerAgent => write!(f, "TriggerAgent"),
        }
    }
}

/// Condition attached to a grant (IAM `Condition` block)
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrantCondition {
    /// Condition operator, e.g. `ArnEquals`
    pub operator: String,
    /// Condition key, e.g. `ecs:cluster`
    pub key: String,
    /// Expected value
    pub value: String,
}

/// A set of actions permitted on a set of resources
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Grant {
    /// Permitted actions
    pub actions: BTreeSet<String>,
    /// Resources the actions are scoped to
    pub resources: BTreeSet<String>,
    /// Optional condition narrowing the grant further
    pub condition: Option<GrantCondition>,
}

impl Grant {
    /// Grant `actions` on `resources`
    pub fn new<A, R>(actions: A, resources: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
            condition: None,
        }
    }

    /// Attach a condition
    pub fn with_condition(
        mut self,
        operator: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.condition = Some(GrantCondition {
            operator: operator.into(),
            key: key.into(),
            value: value.into(),
        });
        self
    }
}

/// A synthesized role
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleSpec {
    /// Which identity this is
    pub identity: Identity,
    /// Principal allowed to assume the role
    pub trust_principal: String,
    /// What the role may do
    pub grants: Vec<Grant>,
}

impl RoleSpec {
    /// Union of actions over all grants
    pub fn permitted_actions(&self) -> BTreeSet<&str> {
        self.grants
            .iter()
            .flat_map(|g| g.actions.iter().map(String::as_str))
            .collect()
    }

    /// Union of resources over all grants
    pub fn resource_scope(&self) -> BTreeSet<&str> {
        self.grants
            .iter()
            .flat_map(|g| g.resources.iter().map(String::as_str))
            .collect()
    }

    /// True if any resource pattern contains a wildcard
    pub fn has_wildcard(&self) -> bool {
        self.resource_scope().iter().any(|r| r.contains('*'))
    }
}

/// The two roles of a workload plus the roles the trigger may hand off
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RoleSet {
    /// Reads the workload's secrets
    pub execution: RoleSpec,
    /// Launches the workload
    pub trigger: RoleSpec,
    /// Role identifiers the trigger passes to the platform at launch
    pub handoff: BTreeSet<String>,
}

impl RoleSet {
    /// Check the minimum-privilege invariants:
    /// no wildcard resources, every grant names at least one resource, the
    /// invoke grant targets exactly one resource, and pass-role covers
    /// exactly the hand-off roles.
    pub fn is_minimal(&self) -> bool {
        if self.execution.has_wildcard() || self.trigger.has_wildcard() {
            return false;
        }
        let mut all_grants = self.execution.grants.iter().chain(&self.trigger.grants);
        if all_grants.any(|g| g.resources.is_empty() || g.actions.is_empty()) {
            return false;
        }

        let mut trigger_grants = self.trigger.grants.iter();
        let invoke_is_single = trigger_grants
            .next()
            .is_some_and(|invoke| invoke.resources.len() == 1);
        let handoff_matches = match trigger_grants.next() {
            Some(pass_role) => pass_role.resources == self.handoff,
            None => self.handoff.is_empty(),
        };
        invoke_is_single && handoff_matches && trigger_grants.next().is_none()
    }
}

/// Backend vocabulary for role synthesis
pub trait RoleScope {
    /// Backend this scope belongs to
    fn backend(&self) -> BackendKind;

    /// Principal allowed to assume `identity`.
    ///
    /// Fails with `UnsupportedBackend` when the principal is unknown.
    fn trust_principal(&self, identity: Identity) -> Result<String>;

    /// Minimum read grants covering exactly `bindings`
    fn secret_read_grants(&self, bindings: &[SecretBinding]) -> Result<Vec<Grant>>;

    /// Grant to launch exactly one task in exactly one execution context
    fn invoke_grant(&self) -> Grant;

    /// Roles the trigger hands to the platform at launch
    fn handoff_roles(&self) -> BTreeSet<String> {
        BTreeSet::new()
    }

    /// Action used to hand a role off, if the backend has one
    fn pass_role_action(&self) -> Option<&'static str> {
        None
    }
}

/// Derive the ExecutionAgent and TriggerAgent roles for a workload.
pub fn synthesize(env: &ResolvedEnvironment, scope: &dyn RoleScope) -> Result<RoleSet> {
    let backend = scope.backend();

    let execution = RoleSpec {
        identity: Identity::ExecutionAgent,
        trust_principal: scope.trust_principal(Identity::ExecutionAgent)?,
        grants: scope.secret_read_grants(env.secret_bindings())?,
    };

    let handoff = scope.handoff_roles();
    let mut trigger_grants = vec![scope.invoke_grant()];
    if !handoff.is_empty() {
        let action = scope.pass_role_action().ok_or_else(|| {
            Error::unsupported(backend, "role hand-off requested but no pass-role action exists")
        })?;
        trigger_grants.push(Grant::new([action], handoff.iter().cloned()));
    }

    let trigger = RoleSpec {
        identity: Identity::TriggerAgent,
        trust_principal: scope.trust_principal(Identity::TriggerAgent)?,
        grants: trigger_grants,
    };

    let roles = RoleSet {
        execution,
        trigger,
        handoff,
    };
    if !roles.is_minimal() {
        return Err(Error::unsupported(
            backend,
            "synthesized roles are not minimally scoped",
        ));
    }

    debug!(
        backend = %backend,
        execution_actions = ?roles.execution.permitted_actions(),
        trigger_actions = ?roles.trigger.permitted_actions(),
        "synthesized roles"
    );
    Ok(roles)
}
