use crate::error::AppError;
use crate::registry::ProcedureRegistration;
use std::collections::HashSet;

/// Identity handed over by the authentication layer: a role set and an optional client session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Caller {
    pub roles: HashSet<String>,
    pub session_id: Option<String>,
}

impl Caller {
    pub fn with_roles<I, S>(roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Caller { roles: roles.into_iter().map(Into::into).collect(), session_id: None }
    }

    pub fn anonymous() -> Self {
        Caller::default()
    }

    pub fn session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Parses a comma separated role header value, dropping blanks.
    pub fn parse_roles(header: &str) -> HashSet<String> {
        header
            .split(',')
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    NotFound,
    Forbidden,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Allow,
    Deny(DenyReason),
}

impl GateDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, GateDecision::Allow)
    }

    pub fn into_result(self, procedure: &str) -> Result<(), AppError> {
        match self {
            GateDecision::Allow => Ok(()),
            GateDecision::Deny(DenyReason::NotFound) => Err(AppError::not_found(format!("procedure {} not found", procedure))),
            GateDecision::Deny(DenyReason::Forbidden) => Err(AppError::unauthorized(format!("not authorized to execute {}", procedure))),
        }
    }
}

/// Decides whether `caller` may dispatch the registered procedure.
///
/// Unknown or inactive names are `NotFound`. Auth-required procedures with no usable role
/// (empty list or blank entries only) deny everybody.
pub fn authorize(registration: Option<&ProcedureRegistration>, caller: &Caller) -> GateDecision {
    let registration = match registration {
        Some(r) if r.is_active => r,
        _ => return GateDecision::Deny(DenyReason::NotFound),
    };
    if !registration.requires_auth {
        return GateDecision::Allow;
    }
    let granted = registration
        .allowed_roles
        .iter()
        .map(|role| role.trim())
        .filter(|role| !role.is_empty())
        .any(|role| caller.roles.contains(role));
    if granted {
        GateDecision::Allow
    } else {
        GateDecision::Deny(DenyReason::Forbidden)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    fn buses() -> ProcedureRegistration {
        ProcedureRegistration::new("sp_Grid_Buses", "main").roles(["Admin", "User"])
    }

    #[test]
    fn intersecting_role_is_allowed() {
        assert_eq!(authorize(Some(&buses()), &Caller::with_roles(["User"])), GateDecision::Allow);
        assert_eq!(authorize(Some(&buses()), &Caller::with_roles(["Guest", "Admin"])), GateDecision::Allow);
    }

    #[test]
    fn disjoint_roles_are_forbidden_even_when_active() {
        let decision = authorize(Some(&buses()), &Caller::with_roles(["Guest"]));
        assert_eq!(decision, GateDecision::Deny(DenyReason::Forbidden));
        assert_eq!(decision.into_result("sp_Grid_Buses").unwrap_err().code(), ErrorCode::Unauthorized);
        assert_eq!(authorize(Some(&buses()), &Caller::anonymous()), GateDecision::Deny(DenyReason::Forbidden));
    }

    #[test]
    fn role_match_is_case_sensitive() {
        assert_eq!(authorize(Some(&buses()), &Caller::with_roles(["user"])), GateDecision::Deny(DenyReason::Forbidden));
    }

    #[test]
    fn inactive_or_missing_is_not_found_regardless_of_role() {
        let inactive = buses().inactive();
        assert_eq!(authorize(Some(&inactive), &Caller::with_roles(["Admin"])), GateDecision::Deny(DenyReason::NotFound));
        assert_eq!(authorize(None, &Caller::with_roles(["Admin"])), GateDecision::Deny(DenyReason::NotFound));
        let err = GateDecision::Deny(DenyReason::NotFound).into_result("sp_Grid_Gone").unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[test]
    fn auth_free_procedure_admits_anyone() {
        let open = ProcedureRegistration::new("sp_Grid_Lookups", "main").public();
        assert!(authorize(Some(&open), &Caller::anonymous()).is_allowed());
    }

    #[test]
    fn empty_or_blank_allowed_roles_fail_closed() {
        let empty = ProcedureRegistration::new("sp_Grid_Buses", "main");
        assert_eq!(authorize(Some(&empty), &Caller::with_roles(["Admin"])), GateDecision::Deny(DenyReason::Forbidden));

        let blank = ProcedureRegistration::new("sp_Grid_Buses", "main").roles(["", "  "]);
        let caller = Caller { roles: [String::new(), "  ".to_string()].into_iter().collect(), session_id: None };
        assert_eq!(authorize(Some(&blank), &caller), GateDecision::Deny(DenyReason::Forbidden));
    }

    #[test]
    fn role_header_parsing_trims_and_skips_blanks() {
        let roles = Caller::parse_roles(" Admin, ,User ,");
        assert_eq!(roles.len(), 2);
        assert!(roles.contains("Admin") && roles.contains("User"));
    }
}
