use std::collections::HashMap;

use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
};
use serde::Serialize;
use ts_rs::TS;
use utoipa::ToSchema;

use crate::{error::AppError, models::Brand};

impl Brand {
    /// The closed brand set.
    pub const ALL: [Brand; 3] = [Brand::Lu1, Brand::No1, Brand::Ma1];

    /// Canonical code, as it appears in URLs and stored rows.
    pub fn as_code(&self) -> &'static str {
        match self {
            Brand::Lu1 => "LU1",
            Brand::No1 => "NO1",
            Brand::Ma1 => "MA1",
        }
    }

    /// Customer-facing brand name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Brand::Lu1 => "Luuna",
            Brand::No1 => "Nooz",
            Brand::Ma1 => "Mappa",
        }
    }

    /// Resolves a URL path segment to a brand.
    ///
    /// Codes are matched exactly (case-sensitive, as the client emits
    /// them). Anything else resolves to `None`; there is deliberately no
    /// fallback brand, so a mistyped or probed segment can never land on
    /// another tenant's data. Resolution is a pure lookup and therefore
    /// idempotent.
    pub fn resolve(segment: &str) -> Option<Brand> {
        match segment {
            "LU1" => Some(Brand::Lu1),
            "NO1" => Some(Brand::No1),
            "MA1" => Some(Brand::Ma1),
            _ => None,
        }
    }

    /// Resolution with the boundary error applied, for handlers that
    /// receive the segment through a multi-parameter `Path` tuple instead
    /// of the `BrandPath` extractor.
    pub fn resolve_segment(segment: &str) -> Result<Brand, AppError> {
        Brand::resolve(segment).ok_or(AppError::InvalidBrand)
    }

    /// Theme variables for this brand, consumed by the client as CSS
    /// custom properties.
    pub fn theme(&self) -> BrandTheme {
        match self {
            Brand::Lu1 => BrandTheme {
                brand: *self,
                name: self.display_name(),
                primary: "#4a7ba7",
                secondary: "#668bbb",
                nav: "#2e3d50",
            },
            Brand::No1 => BrandTheme {
                brand: *self,
                name: self.display_name(),
                primary: "#fff1d4",
                secondary: "#ffe4a3",
                nav: "#8b7355",
            },
            Brand::Ma1 => BrandTheme {
                brand: *self,
                name: self.display_name(),
                primary: "#1a1a1a",
                secondary: "#333333",
                nav: "#000000",
            },
        }
    }
}

impl std::fmt::Display for Brand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_code())
    }
}

/// BrandTheme
///
/// Per-brand presentation metadata (display name and color scheme) exposed
/// at `GET /brands/{marca}/theme`.
#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct BrandTheme {
    pub brand: Brand,
    pub name: &'static str,
    pub primary: &'static str,
    pub secondary: &'static str,
    pub nav: &'static str,
}

/// BrandPath
///
/// Extractor for the `{marca}` path parameter. Rejects unrecognized
/// segments with `invalid-brand` before the handler body runs, so no
/// handler ever sees an unvalidated brand.
#[derive(Debug, Clone, Copy)]
pub struct BrandPath(pub Brand);

impl<S> FromRequestParts<S> for BrandPath
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(params): Path<HashMap<String, String>> =
            Path::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::InvalidBrand)?;

        let segment = params.get("marca").ok_or(AppError::InvalidBrand)?;
        Brand::resolve(segment).map(BrandPath).ok_or(AppError::InvalidBrand)
    }
}
