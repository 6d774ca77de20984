//! Table layout for the PostgreSQL store.

use sqlx::PgPool;

use super::errors::StoreResult;

/// Unique constraint guarding the idempotency key
pub const REQUEST_ID_CONSTRAINT: &str = "ledger_entries_request_id_key";

/// Unique constraint allowing one bet and one result per round and wallet
pub const ROUND_CONSTRAINT: &str = "ledger_entries_round_key";

const STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS accounts (
        player_id   TEXT PRIMARY KEY,
        wallet_id   TEXT NOT NULL,
        balance     NUMERIC NOT NULL DEFAULT 0,
        currency    TEXT NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        CONSTRAINT accounts_wallet_id_key UNIQUE (wallet_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS ledger_entries (
        id          BIGSERIAL PRIMARY KEY,
        request_id  TEXT NOT NULL,
        player_id   TEXT NOT NULL REFERENCES accounts (player_id),
        wallet_id   TEXT NOT NULL,
        round_id    TEXT NOT NULL,
        session_id  TEXT NOT NULL,
        game_code   TEXT NOT NULL,
        kind        TEXT NOT NULL CHECK (kind IN ('bet', 'result')),
        amount      NUMERIC NOT NULL,
        currency    TEXT NOT NULL,
        created_at  TIMESTAMPTZ NOT NULL,
        CONSTRAINT ledger_entries_request_id_key UNIQUE (request_id),
        CONSTRAINT ledger_entries_round_key UNIQUE (round_id, wallet_id, kind)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS ledger_entries_player_idx ON ledger_entries (player_id, id DESC)",
];

/// Create the ledger tables and indexes if they are missing
pub async fn ensure_schema(pool: &PgPool) -> StoreResult<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    tracing::debug!("Ledger schema ensured");
    Ok(())
}
