/// Router Module Index
///
/// Organizes the routing surface into security-segregated modules so the
/// session and CSRF layers are applied per module, never per handler.
///
/// Authorization order per request: authentication (session extractor),
/// then CSRF on mutating methods, then the access guard's permission and
/// brand checks inside the handler.

/// Routes accessible without a session: login, password policy, brand
/// themes, survey intake, health.
pub mod public;

/// Routes requiring a valid session. Per-section permission checks run
/// inside the handlers against the route requirement table.
pub mod authenticated;

/// User administration routes (`administracion` holders only), nested
/// under `/usuarios`.
pub mod admin;
