use magnus_stella::models::{
    Brand, CreateUserRequest, Permission, PermissionSet, QuestionKind, SortOrder, SurveyOutcome,
};

// --- Closed-set serialization ---

#[test]
fn test_brand_codes_round_trip() {
    for (brand, code) in [
        (Brand::Lu1, "\"LU1\""),
        (Brand::No1, "\"NO1\""),
        (Brand::Ma1, "\"MA1\""),
    ] {
        assert_eq!(serde_json::to_string(&brand).unwrap(), code);
        let parsed: Brand = serde_json::from_str(code).unwrap();
        assert_eq!(parsed, brand);
    }
}

#[test]
fn test_unknown_brand_rejected_by_serde() {
    assert!(serde_json::from_str::<Brand>("\"XX1\"").is_err());
    assert!(serde_json::from_str::<Brand>("\"lu1\"").is_err());
}

#[test]
fn test_permission_tags_round_trip() {
    for (permission, tag) in [
        (Permission::Ver, "\"ver\""),
        (Permission::Editar, "\"editar\""),
        (Permission::Administracion, "\"administracion\""),
    ] {
        assert_eq!(serde_json::to_string(&permission).unwrap(), tag);
        let parsed: Permission = serde_json::from_str(tag).unwrap();
        assert_eq!(parsed, permission);
    }
}

#[test]
fn test_unknown_permission_tag_rejected_at_the_boundary() {
    // An unknown tag must fail the whole payload, not be silently dropped.
    let payload = serde_json::json!({
        "name": "Ana",
        "email": "ana@example.com",
        "password": "Abcdef123!",
        "brand": "LU1",
        "permissions": ["ver", "superadmin"],
    });
    let parsed = serde_json::from_value::<CreateUserRequest>(payload);
    assert!(parsed.is_err());
}

#[test]
fn test_permission_set_deduplicates() {
    let set: PermissionSet =
        serde_json::from_str("[\"ver\", \"ver\", \"editar\", \"ver\"]").unwrap();
    assert!(set.contains(Permission::Ver));
    assert!(set.contains(Permission::Editar));
    assert!(!set.contains(Permission::Administracion));
    assert_eq!(set.iter().count(), 2);

    // Serialization carries each tag once.
    let json = serde_json::to_string(&set).unwrap();
    assert_eq!(json, "[\"ver\",\"editar\"]");
}

#[test]
fn test_permission_set_from_stored_tags() {
    let set = PermissionSet::try_from_tags(["ver", "administracion"]).unwrap();
    assert!(set.contains(Permission::Ver));
    assert!(set.contains(Permission::Administracion));

    let err = PermissionSet::try_from_tags(["ver", "root"]).unwrap_err();
    assert_eq!(err, "root");
}

// --- Brand resolution ---

#[test]
fn test_brand_resolution_is_idempotent() {
    for brand in Brand::ALL {
        let first = Brand::resolve(brand.as_code());
        let second = Brand::resolve(brand.as_code());
        assert_eq!(first, Some(brand));
        assert_eq!(first, second);
    }
}

#[test]
fn test_brand_resolution_rejects_without_fallback() {
    // No silent default: unrecognized segments resolve to nothing.
    for segment in ["", "LU2", "lu1", "LU1 ", "ADMIN", "NO", "MA11"] {
        assert_eq!(Brand::resolve(segment), None, "segment {segment:?}");
    }
}

#[test]
fn test_brand_themes_are_distinct() {
    let themes: Vec<_> = Brand::ALL.iter().map(|b| b.theme()).collect();
    assert_eq!(themes[0].name, "Luuna");
    assert_eq!(themes[1].name, "Nooz");
    assert_eq!(themes[2].name, "Mappa");
    // Each brand keeps its own primary color.
    assert_ne!(themes[0].primary, themes[1].primary);
    assert_ne!(themes[1].primary, themes[2].primary);
}

// --- Remaining closed vocabularies ---

#[test]
fn test_question_kind_and_outcome_tags() {
    assert_eq!(
        serde_json::to_string(&QuestionKind::Cerrada).unwrap(),
        "\"cerrada\""
    );
    assert_eq!(
        serde_json::to_string(&QuestionKind::Abierta).unwrap(),
        "\"abierta\""
    );
    assert_eq!(
        serde_json::to_string(&SurveyOutcome::Exitosa).unwrap(),
        "\"exitosa\""
    );
    assert_eq!(
        serde_json::to_string(&SurveyOutcome::Repetida).unwrap(),
        "\"repetida\""
    );
    let order: SortOrder = serde_json::from_str("\"descendente\"").unwrap();
    assert_eq!(order, SortOrder::Descendente);
}
