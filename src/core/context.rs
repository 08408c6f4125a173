use crate::core::errors::CoreError;

/// Who is acting in the current unit of execution.
///
/// `System` is the background worker runtime; it is elevated for reads and
/// owns the worker-only status transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActorRole {
    Teacher,
    Coordinator,
    System,
}

/// Tenant and actor identity for one request or one job run.
///
/// Construction is the single enforcement point for tenant scoping: the
/// identity triple arrives from the external authentication collaborator and
/// a blank tenant id fails with `ContextMissing` before any data operation
/// can run. Every repository call takes the context (or a tenant id drawn
/// from it), so an unscoped query cannot be expressed.
#[derive(Debug, Clone)]
pub struct RequestContext {
    tenant_id: String,
    user_id: String,
    role: ActorRole,
}

impl RequestContext {
    pub fn new(
        tenant_id: impl Into<String>,
        user_id: impl Into<String>,
        role: ActorRole,
    ) -> Result<Self, CoreError> {
        let tenant_id = tenant_id.into();
        if tenant_id.trim().is_empty() {
            return Err(CoreError::ContextMissing);
        }
        let user_id = user_id.into();
        if user_id.trim().is_empty() {
            return Err(CoreError::ContextMissing);
        }
        Ok(Self { tenant_id, user_id, role })
    }

    /// Context for one background job run. The job row is the source of the
    /// tenant id; a job persisted without one is a defense-in-depth trip.
    pub fn for_job(tenant_id: impl Into<String>) -> Result<Self, CoreError> {
        Self::new(tenant_id, "system", ActorRole::System)
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn role(&self) -> ActorRole {
        self.role
    }

    /// Elevated roles widen read scope beyond lessons the actor owns.
    /// Write operations stay owner-only regardless.
    pub fn is_elevated(&self) -> bool {
        matches!(self.role, ActorRole::Coordinator | ActorRole::System)
    }

    pub fn is_system(&self) -> bool {
        self.role == ActorRole::System
    }

    pub fn owns(&self, teacher_id: &str) -> bool {
        self.user_id == teacher_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_tenant_fails_with_context_missing() {
        let result = RequestContext::new("", "teacher-1", ActorRole::Teacher);
        assert!(matches!(result, Err(CoreError::ContextMissing)));

        let result = RequestContext::new("   ", "teacher-1", ActorRole::Teacher);
        assert!(matches!(result, Err(CoreError::ContextMissing)));
    }

    #[test]
    fn blank_user_fails_with_context_missing() {
        let result = RequestContext::new("tenant-1", "", ActorRole::Teacher);
        assert!(matches!(result, Err(CoreError::ContextMissing)));
    }

    #[test]
    fn job_context_is_system_and_elevated() {
        let ctx = RequestContext::for_job("tenant-1").expect("context");
        assert!(ctx.is_system());
        assert!(ctx.is_elevated());
        assert_eq!(ctx.tenant_id(), "tenant-1");
    }

    #[test]
    fn job_context_rejects_blank_tenant() {
        assert!(matches!(RequestContext::for_job(""), Err(CoreError::ContextMissing)));
        assert!(matches!(RequestContext::for_job("   "), Err(CoreError::ContextMissing)));
    }

    #[test]
    fn teacher_is_not_elevated() {
        let ctx = RequestContext::new("tenant-1", "teacher-1", ActorRole::Teacher).expect("context");
        assert!(!ctx.is_elevated());
        assert!(ctx.owns("teacher-1"));
        assert!(!ctx.owns("teacher-2"));
    }
}
