//! The access guard: the single authorization decision point for the
//! back-office.
//!
//! Both the server-side request path (hard boundary) and the section
//! visibility reported to the client (soft UX hint) go through the same
//! pure functions over the same static route-requirement table, so the two
//! can never drift apart.

use crate::{
    error::AppError,
    models::{Brand, Permission, PermissionSet, SectionVisibility},
};

// --- Route Requirement Table ---

/// Section
///
/// The protected areas of the back-office. Every brand-scoped route belongs
/// to exactly one section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Dashboard,
    Reviews,
    Emails,
    Users,
}

impl Section {
    pub const ALL: [Section; 4] = [
        Section::Dashboard,
        Section::Reviews,
        Section::Emails,
        Section::Users,
    ];
}

/// RouteRequirement
///
/// Declarative mapping from a section to the minimal permission required to
/// reach it. This table is the single source of truth consulted by the
/// server guard and by `section_visibility`.
#[derive(Debug, Clone, Copy)]
pub struct RouteRequirement {
    pub section: Section,
    pub required: Permission,
}

pub const ROUTE_REQUIREMENTS: [RouteRequirement; 4] = [
    RouteRequirement {
        section: Section::Dashboard,
        required: Permission::Ver,
    },
    RouteRequirement {
        section: Section::Reviews,
        required: Permission::Ver,
    },
    RouteRequirement {
        section: Section::Emails,
        required: Permission::Editar,
    },
    RouteRequirement {
        section: Section::Users,
        required: Permission::Administracion,
    },
];

/// Looks up the declared requirement for a section.
///
/// `validate_requirements` runs before the router is built, so a miss here
/// is unreachable in a started process; it still fails loudly rather than
/// defaulting open.
pub fn required_permission(section: Section) -> Permission {
    ROUTE_REQUIREMENTS
        .iter()
        .find(|r| r.section == section)
        .map(|r| r.required)
        .unwrap_or_else(|| panic!("FATAL: no route requirement declared for {:?}", section))
}

/// Startup check: every section must be declared exactly once. A gap or a
/// duplicate is a programming mistake, not a runtime condition, and aborts
/// boot.
pub fn validate_requirements() -> Result<(), String> {
    for section in Section::ALL {
        let count = ROUTE_REQUIREMENTS
            .iter()
            .filter(|r| r.section == section)
            .count();
        match count {
            1 => {}
            0 => return Err(format!("section {:?} has no declared requirement", section)),
            n => {
                return Err(format!(
                    "section {:?} declared {} times in the route table",
                    section, n
                ));
            }
        }
    }
    Ok(())
}

// --- Decision Function ---

/// Actor
///
/// The authenticated requester as the guard sees it: capability set plus
/// brand affiliation. Borrowed from the resolved session user.
#[derive(Debug, Clone, Copy)]
pub struct Actor<'a> {
    pub permissions: &'a PermissionSet,
    /// `None` = cross-brand staff, allowed on every brand.
    pub brand: Option<Brand>,
}

/// Denial
///
/// Why a request was refused. Denial is a normal return value, not an
/// exceptional control path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    Unauthenticated,
    InsufficientPermission,
    BrandMismatch,
}

impl From<Denial> for AppError {
    fn from(denial: Denial) -> Self {
        match denial {
            Denial::Unauthenticated => AppError::Unauthenticated,
            Denial::InsufficientPermission => AppError::Forbidden("insufficient-permission"),
            Denial::BrandMismatch => AppError::Forbidden("brand-mismatch"),
        }
    }
}

/// Decides whether `actor` may perform an action requiring `required` on
/// `requested_brand` (pass `None` for resources with no brand scope).
///
/// Deny-by-default, in a fixed order:
/// 1. no actor → `Unauthenticated`, before any permission or brand logic;
/// 2. missing the exact required tag → `InsufficientPermission` — the three
///    flags are independent, holding `administracion` grants nothing else;
/// 3. actor pinned to a different brand → `BrandMismatch`.
///
/// Pure over its inputs; safe to call concurrently from request handlers
/// and from profile assembly.
pub fn authorize(
    actor: Option<Actor<'_>>,
    required: Permission,
    requested_brand: Option<Brand>,
) -> Result<(), Denial> {
    let actor = actor.ok_or(Denial::Unauthenticated)?;

    if !actor.permissions.contains(required) {
        return Err(Denial::InsufficientPermission);
    }

    if let (Some(assigned), Some(requested)) = (actor.brand, requested_brand) {
        if assigned != requested {
            return Err(Denial::BrandMismatch);
        }
    }

    Ok(())
}

/// Computes the per-section visibility flags for a capability set, from the
/// same table `authorize` consults. Used to build `UserProfile.sections`.
pub fn section_visibility(permissions: &PermissionSet) -> SectionVisibility {
    let visible = |section| permissions.contains(required_permission(section));
    SectionVisibility {
        dashboard: visible(Section::Dashboard),
        reviews: visible(Section::Reviews),
        emails: visible(Section::Emails),
        users: visible(Section::Users),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(perms: &[Permission]) -> PermissionSet {
        perms.iter().copied().collect()
    }

    #[test]
    fn unauthenticated_denied_before_everything_else() {
        // Even with an invalid-looking brand situation, the reason is
        // always `Unauthenticated` when there is no actor.
        let denied = authorize(None, Permission::Ver, Some(Brand::Lu1));
        assert_eq!(denied, Err(Denial::Unauthenticated));
    }

    #[test]
    fn empty_set_denies_every_section() {
        let empty = PermissionSet::new();
        let actor = Actor {
            permissions: &empty,
            brand: None,
        };
        for section in Section::ALL {
            let result = authorize(Some(actor), required_permission(section), Some(Brand::No1));
            assert_eq!(result, Err(Denial::InsufficientPermission), "{:?}", section);
        }
    }

    #[test]
    fn administracion_does_not_imply_ver() {
        // Regression test for the flat (non-hierarchical) permission model.
        let admin_only = set(&[Permission::Administracion]);
        let actor = Actor {
            permissions: &admin_only,
            brand: None,
        };
        let dashboard = authorize(
            Some(actor),
            required_permission(Section::Dashboard),
            Some(Brand::Lu1),
        );
        assert_eq!(dashboard, Err(Denial::InsufficientPermission));

        let users = authorize(
            Some(actor),
            required_permission(Section::Users),
            Some(Brand::Lu1),
        );
        assert_eq!(users, Ok(()));
    }

    #[test]
    fn brand_mismatch_never_allows() {
        let ver = set(&[Permission::Ver]);
        for assigned in Brand::ALL {
            for requested in Brand::ALL {
                let actor = Actor {
                    permissions: &ver,
                    brand: Some(assigned),
                };
                let result = authorize(Some(actor), Permission::Ver, Some(requested));
                if assigned == requested {
                    assert_eq!(result, Ok(()));
                } else {
                    assert_eq!(result, Err(Denial::BrandMismatch));
                }
            }
        }
    }

    #[test]
    fn cross_brand_staff_pass_the_brand_check() {
        let ver = set(&[Permission::Ver]);
        let actor = Actor {
            permissions: &ver,
            brand: None,
        };
        for requested in Brand::ALL {
            assert_eq!(authorize(Some(actor), Permission::Ver, Some(requested)), Ok(()));
        }
    }

    #[test]
    fn insufficient_permission_reported_before_brand_mismatch() {
        // A user lacking the tag gets `insufficient-permission` even when
        // the brand would also mismatch.
        let editar = set(&[Permission::Editar]);
        let actor = Actor {
            permissions: &editar,
            brand: Some(Brand::Lu1),
        };
        let result = authorize(Some(actor), Permission::Ver, Some(Brand::Ma1));
        assert_eq!(result, Err(Denial::InsufficientPermission));
    }

    #[test]
    fn visibility_follows_the_requirement_table() {
        let sections = section_visibility(&set(&[Permission::Ver]));
        assert!(sections.dashboard);
        assert!(sections.reviews);
        assert!(!sections.emails);
        assert!(!sections.users);

        let sections = section_visibility(&set(&[Permission::Editar]));
        assert_eq!(
            sections,
            SectionVisibility {
                dashboard: false,
                reviews: false,
                emails: true,
                users: false,
            }
        );

        let sections = section_visibility(&PermissionSet::new());
        assert_eq!(sections, SectionVisibility::default());
    }

    #[test]
    fn requirement_table_is_well_formed() {
        assert!(validate_requirements().is_ok());
    }
}
