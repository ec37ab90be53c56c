//! PostgreSQL role pack catalog.
//!
//! A role pack is a named, versioned bundle of grants backed by a NOLOGIN
//! role the bootstrap installs (`gk_role_<name>`). Packs are never mutated
//! in place; a new version is a new pack.

use gatekeeper_providers::{DatabaseEngine, RolePack};

/// Version tag of the packs shipped with this provider.
pub const ROLE_PACK_VERSION: &str = "pg-1.0.0";

/// Role backing a pack name, e.g. "read" -> "gk_role_read".
pub fn pack_role_name(pack: &str) -> String {
    format!("gk_role_{}", pack)
}

/// The packs this provider surfaces: read, write, admin.
///
/// The bootstrap additionally installs an `analyst` role for read-plus-temp
/// workloads; it is not part of the issuable catalog.
pub fn available_role_packs() -> Vec<RolePack> {
    vec![
        RolePack {
            engine: DatabaseEngine::Postgres,
            name: "read".to_string(),
            version: ROLE_PACK_VERSION.to_string(),
            description: "Read-only access to the public schema".to_string(),
            statements: vec![
                "GRANT USAGE ON SCHEMA public TO gk_role_read".to_string(),
                "GRANT SELECT ON ALL TABLES IN SCHEMA public TO gk_role_read".to_string(),
                "ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT SELECT ON TABLES TO gk_role_read"
                    .to_string(),
            ],
        },
        RolePack {
            engine: DatabaseEngine::Postgres,
            name: "write".to_string(),
            version: ROLE_PACK_VERSION.to_string(),
            description: "Read-write access to the public schema".to_string(),
            statements: vec![
                "GRANT USAGE ON SCHEMA public TO gk_role_write".to_string(),
                "GRANT SELECT, INSERT, UPDATE, DELETE ON ALL TABLES IN SCHEMA public TO gk_role_write"
                    .to_string(),
                "GRANT USAGE, SELECT ON ALL SEQUENCES IN SCHEMA public TO gk_role_write".to_string(),
                "ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT SELECT, INSERT, UPDATE, DELETE ON TABLES TO gk_role_write"
                    .to_string(),
            ],
        },
        RolePack {
            engine: DatabaseEngine::Postgres,
            name: "admin".to_string(),
            version: ROLE_PACK_VERSION.to_string(),
            description: "Full control of the public schema".to_string(),
            statements: vec![
                "GRANT ALL PRIVILEGES ON SCHEMA public TO gk_role_admin".to_string(),
                "GRANT ALL PRIVILEGES ON ALL TABLES IN SCHEMA public TO gk_role_admin".to_string(),
                "GRANT ALL PRIVILEGES ON ALL SEQUENCES IN SCHEMA public TO gk_role_admin".to_string(),
                "ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT ALL PRIVILEGES ON TABLES TO gk_role_admin"
                    .to_string(),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_names_and_version() {
        let packs = available_role_packs();
        let names: Vec<&str> = packs.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["read", "write", "admin"]);
        assert!(packs.iter().all(|p| p.version == ROLE_PACK_VERSION));
        assert!(packs.iter().all(|p| p.engine == DatabaseEngine::Postgres));
    }

    #[test]
    fn test_pack_role_name() {
        assert_eq!(pack_role_name("read"), "gk_role_read");
    }

    #[test]
    fn test_statements_target_backing_role() {
        for pack in available_role_packs() {
            let role = pack_role_name(&pack.name);
            assert!(
                pack.statements.iter().all(|s| s.contains(&role)),
                "pack {} has a statement not targeting {}",
                pack.name,
                role
            );
        }
    }
}
