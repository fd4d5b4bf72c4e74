use crate::model::audit::Actor;
use crate::model::role::Role;
use actix_web::error::{ErrorForbidden, ErrorUnauthorized};
use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

/// Identity placed in the request extensions by `auth_middleware`.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: u64,
    pub username: String,
    pub role: Role,

    /// Present only if this user is linked to a staff record
    pub staff_id: Option<u64>,
    pub display_name: Option<String>,
    pub phone: Option<String>,
}

impl FromRequest for AuthUser {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(
            req.extensions()
                .get::<AuthUser>()
                .cloned()
                .ok_or_else(|| ErrorUnauthorized("Missing token")),
        )
    }
}

impl AuthUser {
    pub fn require_admin(&self) -> actix_web::Result<()> {
        if self.role == Role::Admin {
            Ok(())
        } else {
            Err(ErrorForbidden("Admin only"))
        }
    }

    pub fn require_hr_or_admin(&self) -> actix_web::Result<()> {
        if self.role.manages_payroll() {
            Ok(())
        } else {
            Err(ErrorForbidden("HR/Admin only"))
        }
    }

    pub fn require_finance_or_admin(&self) -> actix_web::Result<()> {
        if self.role.releases_funds() {
            Ok(())
        } else {
            Err(ErrorForbidden("Finance/Admin only"))
        }
    }

    /// Returns true if the user is an employee
    pub fn is_employee(&self) -> bool {
        self.role == Role::Employee
    }

    /// Staff id an employee is confined to; `None` means every staff member is visible.
    pub fn visible_staff(&self) -> actix_web::Result<Option<u64>> {
        if !self.is_employee() {
            return Ok(None);
        }
        self.staff_id
            .map(Some)
            .ok_or_else(|| ErrorForbidden("No staff record linked to this account"))
    }

    pub fn require_staff_access(&self, staff_id: u64) -> actix_web::Result<()> {
        match self.visible_staff()? {
            Some(own) if own != staff_id => Err(ErrorForbidden("Not your record")),
            _ => Ok(()),
        }
    }

    /// Who the audit trail attributes this user's transitions to.
    pub fn actor(&self) -> Actor {
        Actor {
            user_id: self.user_id,
            display_name: self
                .display_name
                .clone()
                .unwrap_or_else(|| self.username.clone()),
            contact: self.phone.clone(),
        }
    }
}
