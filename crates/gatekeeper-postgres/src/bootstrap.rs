//! Bootstrap schema installed in the target database.
//!
//! The install creates:
//! - the `gatekeeper` schema and the `gatekeeper_admin` principal the
//!   provider connects as
//! - the role-pack roles (`gk_role_read`, `gk_role_write`, `gk_role_admin`,
//!   plus `gk_role_analyst`) with their canonical grants
//! - the SECURITY DEFINER helper routines that are the only path by which
//!   logins are created or dropped
//! - the append-only `gatekeeper.audit_log` table
//!
//! `gatekeeper_admin` receives EXECUTE on the helpers and membership (with
//! ADMIN OPTION) in each role-pack role, nothing more. If the agent is ever
//! compromised, the blast radius is bounded by the helpers' input checks.
//!
//! Installation is idempotent: every statement is a conditional create or a
//! replace, and the `setup.completed` audit event is written only once.

use sqlx::postgres::PgPool;
use sqlx::Row;
use thiserror::Error;
use uuid::Uuid;

use gatekeeper_contracts::{AuditSink, NewAuditEvent, EVENT_SETUP_COMPLETED};

use crate::audit::PgAuditSink;
use crate::role_packs::ROLE_PACK_VERSION;

/// Bootstrap installation failure.
#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("bootstrap statement failed: {0}")]
    Sql(#[from] sqlx::Error),

    #[error("bootstrap audit write failed: {0}")]
    Audit(String),
}

/// One row of `gatekeeper.validate_setup()`.
#[derive(Debug, Clone)]
pub struct SetupCheck {
    pub check_name: String,
    pub status: String,
    pub details: String,
}

impl SetupCheck {
    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

const SQL_SCHEMA: &str = "CREATE SCHEMA IF NOT EXISTS gatekeeper";

// The admin principal the agent's pool authenticates as. LOGIN with no
// password until the operator (or `install`) sets one.
const SQL_ADMIN_ROLE: &str = r#"
DO $$
BEGIN
    IF NOT EXISTS (SELECT FROM pg_roles WHERE rolname = 'gatekeeper_admin') THEN
        CREATE ROLE gatekeeper_admin LOGIN;
    END IF;
END
$$
"#;

// Role-pack roles. NOLOGIN; ephemeral logins gain privileges only through
// membership.
const SQL_ROLE_PACK_ROLES: &str = r#"
DO $$
DECLARE
    pack text;
BEGIN
    FOREACH pack IN ARRAY ARRAY['gk_role_read', 'gk_role_write', 'gk_role_admin', 'gk_role_analyst']
    LOOP
        IF NOT EXISTS (SELECT FROM pg_roles WHERE rolname = pack) THEN
            EXECUTE format('CREATE ROLE %I NOLOGIN', pack);
        END IF;
    END LOOP;
END
$$
"#;

const SQL_ROLE_PACK_GRANTS: &str = r#"
DO $$
BEGIN
    -- read: SELECT over the public schema, now and for future tables
    GRANT USAGE ON SCHEMA public TO gk_role_read;
    GRANT SELECT ON ALL TABLES IN SCHEMA public TO gk_role_read;
    ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT SELECT ON TABLES TO gk_role_read;

    -- write: read plus DML and sequence use
    GRANT USAGE ON SCHEMA public TO gk_role_write;
    GRANT SELECT, INSERT, UPDATE, DELETE ON ALL TABLES IN SCHEMA public TO gk_role_write;
    GRANT USAGE, SELECT ON ALL SEQUENCES IN SCHEMA public TO gk_role_write;
    ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT SELECT, INSERT, UPDATE, DELETE ON TABLES TO gk_role_write;

    -- admin: full control of the public schema
    GRANT ALL PRIVILEGES ON SCHEMA public TO gk_role_admin;
    GRANT ALL PRIVILEGES ON ALL TABLES IN SCHEMA public TO gk_role_admin;
    GRANT ALL PRIVILEGES ON ALL SEQUENCES IN SCHEMA public TO gk_role_admin;
    ALTER DEFAULT PRIVILEGES IN SCHEMA public GRANT ALL PRIVILEGES ON TABLES TO gk_role_admin;

    -- analyst: read plus temporary tables for scratch work
    GRANT gk_role_read TO gk_role_analyst;
    EXECUTE format('GRANT TEMPORARY ON DATABASE %I TO gk_role_analyst', current_database());
END
$$
"#;

// Membership with ADMIN OPTION lets the SECURITY DEFINER helpers grant pack
// membership to fresh logins while gatekeeper_admin itself stays unprivileged.
const SQL_ADMIN_MEMBERSHIPS: &str = r#"
DO $$
DECLARE
    pack text;
BEGIN
    FOREACH pack IN ARRAY ARRAY['gk_role_read', 'gk_role_write', 'gk_role_admin', 'gk_role_analyst']
    LOOP
        EXECUTE format('GRANT %I TO gatekeeper_admin WITH ADMIN OPTION', pack);
    END LOOP;
END
$$
"#;

const SQL_AUDIT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS gatekeeper.audit_log (
    id              bigserial PRIMARY KEY,
    event_type      text        NOT NULL,
    session_id      text,
    username        text,
    correlation_id  uuid        NOT NULL,
    event_data      jsonb       NOT NULL DEFAULT '{}'::jsonb,
    created_at      timestamptz NOT NULL DEFAULT now(),
    prev_hash       text,
    event_hash      text        NOT NULL
)
"#;

const SQL_AUDIT_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS audit_log_session_id_idx
    ON gatekeeper.audit_log (session_id)
    WHERE session_id IS NOT NULL
"#;

// Creates one ephemeral login. Refuses bad names, empty passwords, past
// expiries, and unknown role packs, each with a distinct message the
// provider maps to a stable error code.
const SQL_FN_CREATE_EPHEMERAL: &str = r#"
CREATE OR REPLACE FUNCTION gatekeeper.create_ephemeral(
    p_name             text,
    p_password         text,
    p_valid_until      timestamptz,
    p_role_pack        text,
    p_connection_limit integer DEFAULT 2
) RETURNS boolean
LANGUAGE plpgsql
SECURITY DEFINER
SET search_path = pg_catalog, pg_temp
AS $$
DECLARE
    v_role text;
BEGIN
    IF p_name IS NULL OR p_name !~ '^gk_[a-zA-Z0-9_]+$'
       OR length(p_name) < 4 OR length(p_name) > 63 THEN
        RAISE EXCEPTION 'invalid ephemeral name: %', coalesce(p_name, '<null>');
    END IF;
    IF p_password IS NULL OR length(p_password) = 0 THEN
        RAISE EXCEPTION 'password must not be empty';
    END IF;
    IF p_valid_until IS NULL OR p_valid_until <= now() THEN
        RAISE EXCEPTION 'valid_until must be in the future, got %', p_valid_until;
    END IF;

    v_role := 'gk_role_' || p_role_pack;
    IF NOT EXISTS (SELECT FROM pg_roles WHERE rolname = v_role) THEN
        RAISE EXCEPTION 'unknown role pack: %', p_role_pack;
    END IF;
    IF EXISTS (SELECT FROM pg_roles WHERE rolname = p_name) THEN
        RAISE EXCEPTION 'role "%" already exists', p_name;
    END IF;

    EXECUTE format(
        'CREATE ROLE %I LOGIN PASSWORD %L VALID UNTIL %L CONNECTION LIMIT %s',
        p_name, p_password, p_valid_until, p_connection_limit
    );
    EXECUTE format('GRANT %I TO %I', v_role, p_name);
    EXECUTE format('ALTER ROLE %I SET search_path = public', p_name);
    RETURN true;
END
$$
"#;

// Drops one ephemeral login. Silent false when the login is absent. Active
// connections belonging to the login are terminated first, except the
// caller's own backend.
const SQL_FN_DROP_EPHEMERAL: &str = r#"
CREATE OR REPLACE FUNCTION gatekeeper.drop_ephemeral(
    p_name text
) RETURNS boolean
LANGUAGE plpgsql
SECURITY DEFINER
SET search_path = pg_catalog, pg_temp
AS $$
BEGIN
    IF p_name IS NULL OR p_name !~ '^gk_[a-zA-Z0-9_]+$' THEN
        RAISE EXCEPTION 'invalid ephemeral name: %', coalesce(p_name, '<null>');
    END IF;
    IF NOT EXISTS (SELECT FROM pg_roles WHERE rolname = p_name) THEN
        RETURN false;
    END IF;

    PERFORM pg_terminate_backend(pid)
    FROM pg_stat_activity
    WHERE usename = p_name AND pid <> pg_backend_pid();

    EXECUTE format('DROP OWNED BY %I', p_name);
    EXECUTE format('DROP ROLE %I', p_name);
    RETURN true;
END
$$
"#;

// Enumerates gk_-pattern logins only; anything ephemeral-looking that fails
// the pattern stays invisible. A NULL valid-until counts as expired so
// cleanup can reclaim it.
const SQL_FN_LIST_EPHEMERAL: &str = r#"
CREATE OR REPLACE FUNCTION gatekeeper.list_ephemeral()
RETURNS TABLE(
    username           text,
    expires_at         timestamptz,
    is_expired         boolean,
    connection_limit   integer,
    active_connections bigint
)
LANGUAGE sql
SECURITY DEFINER
SET search_path = pg_catalog, pg_temp
AS $$
    SELECT
        r.rolname::text,
        r.rolvaliduntil,
        coalesce(r.rolvaliduntil <= now(), true),
        r.rolconnlimit,
        (SELECT count(*) FROM pg_stat_activity a WHERE a.usename = r.rolname)
    FROM pg_roles r
    WHERE r.rolname ~ '^gk_[a-zA-Z0-9_]+$'
      AND r.rolname NOT LIKE 'gk_role_%'
    ORDER BY r.rolname
$$
"#;

// Drops every login expired for longer than the grace period. One row per
// candidate: dropped, expired-but-within-grace, or drop-failed with the
// error message.
const SQL_FN_CLEANUP_EXPIRED: &str = r#"
CREATE OR REPLACE FUNCTION gatekeeper.cleanup_expired(
    p_older_than_minutes integer DEFAULT 5
) RETURNS TABLE(
    username      text,
    was_expired   boolean,
    dropped       boolean,
    error_message text
)
LANGUAGE plpgsql
SECURITY DEFINER
SET search_path = pg_catalog, pg_temp
AS $$
DECLARE
    r        record;
    v_cutoff timestamptz := now() - make_interval(mins => greatest(p_older_than_minutes, 0));
BEGIN
    FOR r IN
        SELECT rolname, rolvaliduntil
        FROM pg_roles
        WHERE rolname ~ '^gk_[a-zA-Z0-9_]+$'
          AND rolname NOT LIKE 'gk_role_%'
          AND (rolvaliduntil IS NULL OR rolvaliduntil <= now())
        ORDER BY rolname
    LOOP
        username      := r.rolname;
        was_expired   := true;
        dropped       := false;
        error_message := NULL;

        IF r.rolvaliduntil IS NOT NULL AND r.rolvaliduntil > v_cutoff THEN
            -- expired, but still inside the grace period
            was_expired := false;
        ELSE
            BEGIN
                SELECT gatekeeper.drop_ephemeral(r.rolname) INTO dropped;
            EXCEPTION WHEN OTHERS THEN
                error_message := SQLERRM;
            END;
        END IF;
        RETURN NEXT;
    END LOOP;
END
$$
"#;

// Post-install self-check: admin principal, role-pack roles, helper
// routines, audit table, and the seed audit row.
const SQL_FN_VALIDATE_SETUP: &str = r#"
CREATE OR REPLACE FUNCTION gatekeeper.validate_setup()
RETURNS TABLE(check_name text, status text, details text)
LANGUAGE plpgsql
SECURITY DEFINER
SET search_path = pg_catalog, pg_temp
AS $$
DECLARE
    pack text;
    fn   text;
BEGIN
    check_name := 'admin_principal';
    IF EXISTS (SELECT FROM pg_roles WHERE rolname = 'gatekeeper_admin' AND rolcanlogin) THEN
        status := 'ok';      details := 'gatekeeper_admin exists and can log in';
    ELSE
        status := 'missing'; details := 'gatekeeper_admin absent or NOLOGIN';
    END IF;
    RETURN NEXT;

    FOREACH pack IN ARRAY ARRAY['gk_role_read', 'gk_role_write', 'gk_role_admin', 'gk_role_analyst']
    LOOP
        check_name := 'role_pack_' || pack;
        IF EXISTS (SELECT FROM pg_roles WHERE rolname = pack) THEN
            status := 'ok';      details := pack || ' exists';
        ELSE
            status := 'missing'; details := pack || ' absent';
        END IF;
        RETURN NEXT;
    END LOOP;

    FOREACH fn IN ARRAY ARRAY['create_ephemeral', 'drop_ephemeral', 'list_ephemeral', 'cleanup_expired']
    LOOP
        check_name := 'helper_' || fn;
        IF EXISTS (
            SELECT FROM pg_proc p
            JOIN pg_namespace n ON n.oid = p.pronamespace
            WHERE n.nspname = 'gatekeeper' AND p.proname = fn
        ) THEN
            status := 'ok';      details := 'gatekeeper.' || fn || ' installed';
        ELSE
            status := 'missing'; details := 'gatekeeper.' || fn || ' absent';
        END IF;
        RETURN NEXT;
    END LOOP;

    check_name := 'audit_log';
    IF to_regclass('gatekeeper.audit_log') IS NOT NULL THEN
        status := 'ok';      details := 'audit table present';
    ELSE
        status := 'missing'; details := 'audit table absent';
    END IF;
    RETURN NEXT;

    check_name := 'audit_seed';
    IF to_regclass('gatekeeper.audit_log') IS NOT NULL
       AND EXISTS (SELECT FROM gatekeeper.audit_log WHERE event_type = 'setup.completed') THEN
        status := 'ok';      details := 'setup.completed event recorded';
    ELSE
        status := 'missing'; details := 'no setup.completed event';
    END IF;
    RETURN NEXT;
END
$$
"#;

const SQL_GRANTS: &str = r#"
DO $$
DECLARE
    fn text;
BEGIN
    GRANT USAGE ON SCHEMA gatekeeper TO gatekeeper_admin;
    GRANT SELECT, INSERT ON gatekeeper.audit_log TO gatekeeper_admin;
    GRANT USAGE ON SEQUENCE gatekeeper.audit_log_id_seq TO gatekeeper_admin;

    FOREACH fn IN ARRAY ARRAY[
        'create_ephemeral(text, text, timestamptz, text, integer)',
        'drop_ephemeral(text)',
        'list_ephemeral()',
        'cleanup_expired(integer)',
        'validate_setup()'
    ]
    LOOP
        EXECUTE format('REVOKE EXECUTE ON FUNCTION gatekeeper.%s FROM PUBLIC', fn);
        EXECUTE format('GRANT EXECUTE ON FUNCTION gatekeeper.%s TO gatekeeper_admin', fn);
    END LOOP;
END
$$
"#;

/// All installation statements, in dependency order.
fn install_statements() -> [&'static str; 12] {
    [
        SQL_SCHEMA,
        SQL_ADMIN_ROLE,
        SQL_ROLE_PACK_ROLES,
        SQL_ROLE_PACK_GRANTS,
        SQL_ADMIN_MEMBERSHIPS,
        SQL_AUDIT_TABLE,
        SQL_AUDIT_INDEXES,
        SQL_FN_CREATE_EPHEMERAL,
        SQL_FN_DROP_EPHEMERAL,
        SQL_FN_LIST_EPHEMERAL,
        SQL_FN_CLEANUP_EXPIRED,
        SQL_FN_VALIDATE_SETUP,
    ]
}

/// Install the bootstrap schema into the target database.
///
/// Must run as a principal allowed to create roles and functions (the helper
/// routines inherit the installer's rights through SECURITY DEFINER). Safe to
/// run repeatedly; the `setup.completed` audit event is written only on the
/// first install.
pub async fn install(pool: &PgPool, admin_password: Option<&str>) -> Result<(), BootstrapError> {
    for statement in install_statements() {
        sqlx::query(statement).execute(pool).await?;
    }
    sqlx::query(SQL_GRANTS).execute(pool).await?;

    if let Some(password) = admin_password {
        // DDL cannot take bind parameters; escape the literal by doubling
        // single quotes.
        let statement = format!(
            "ALTER ROLE gatekeeper_admin WITH LOGIN PASSWORD '{}'",
            password.replace('\'', "''")
        );
        sqlx::query(&statement).execute(pool).await?;
    }

    let already_seeded: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT FROM gatekeeper.audit_log WHERE event_type = $1)",
    )
    .bind(EVENT_SETUP_COMPLETED)
    .fetch_one(pool)
    .await?;

    if !already_seeded {
        let sink = PgAuditSink::new(pool.clone());
        sink.append(
            NewAuditEvent::new(EVENT_SETUP_COMPLETED, Uuid::new_v4()).with_data(
                serde_json::json!({
                    "role_pack_version": ROLE_PACK_VERSION,
                    "helpers": ["create_ephemeral", "drop_ephemeral", "list_ephemeral", "cleanup_expired", "validate_setup"],
                }),
            ),
        )
        .await
        .map_err(|e| BootstrapError::Audit(e.to_string()))?;
        info!("bootstrap installed, setup.completed recorded");
    } else {
        debug!("bootstrap re-run, setup already recorded");
    }

    Ok(())
}

/// Run `gatekeeper.validate_setup()` and collect the check rows.
pub async fn validate_setup(pool: &PgPool) -> Result<Vec<SetupCheck>, sqlx::Error> {
    let rows = sqlx::query("SELECT check_name, status, details FROM gatekeeper.validate_setup()")
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| {
            Ok(SetupCheck {
                check_name: row.try_get("check_name")?,
                status: row.try_get("status")?,
                details: row.try_get("details")?,
            })
        })
        .collect()
}
