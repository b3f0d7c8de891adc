//! The `sqlx`-backed Postgres store, used by the running daemon.
//!
//! Mirrors `in_memory`'s shape (the same `DbRead`/`DbWrite` impls, built on
//! whatever backend owns `Self`) but against a real `PgPool`. Queries use
//! `sqlx::query`/`query_as` rather than the `query!` macro, since the latter
//! needs a live database at build time; amounts that can exceed `u64` (wei,
//! satoshis held in a `u128`) round-trip through `TEXT` rather than a numeric
//! column type Postgres doesn't natively have.

use std::str::FromStr;

use sqlx::{PgPool, Row};

use bridge_core::ChainTag;

use super::model::{
    ChainCursor, RawTransfer, Token, TransferStatus, UserAddress, UserTransfer, Utxo, UtxoOutpoint,
    UtxoRef, UtxoStatus, WithdrawRequest, WithdrawStatus,
};
use super::{DbRead, DbWrite};
use crate::error::Error;

fn tx_hash_hex(bytes: [u8; 32]) -> String {
    format!("0x{}", hex::encode(bytes))
}

fn tx_hash_bytes(hex_str: &str) -> Result<[u8; 32], Error> {
    let decoded = hex::decode(hex_str.trim_start_matches("0x"))
        .map_err(|_| Error::InvalidFormat { context: "stored utxo tx_hash", value: hex_str.to_string() })?;
    decoded
        .try_into()
        .map_err(|_| Error::InvalidFormat { context: "stored utxo tx_hash length", value: hex_str.to_string() })
}

fn to_sql_err(source: sqlx::Error) -> Error {
    Error::Storage(source)
}

/// A connected Postgres-backed store.
#[derive(Clone)]
pub struct Store {
    pool: PgPool,
}

impl Store {
    /// Connect to `database_url` and run any pending migrations. A network
    /// side effect, performed once at process startup.
    pub async fn connect(database_url: &str) -> Result<Self, Error> {
        let pool = PgPool::connect(database_url).await.map_err(to_sql_err)?;
        sqlx::migrate!("./migrations").run(&pool).await.map_err(Error::Migration)?;
        Ok(Self { pool })
    }
}

impl DbRead for Store {
    async fn get_active_addresses(&self, chain_tag: ChainTag) -> Result<Vec<UserAddress>, Error> {
        let rows = sqlx::query(
            "SELECT user_id, address, is_active FROM user_addresses WHERE chain_tag = $1 AND is_active",
        )
        .bind(chain_tag.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(to_sql_err)?;

        Ok(rows
            .into_iter()
            .map(|row| UserAddress {
                user_id: row.get::<i64, _>("user_id") as u64,
                address: row.get("address"),
                chain_tag,
                is_active: row.get("is_active"),
            })
            .collect())
    }

    async fn get_address(&self, chain_tag: ChainTag, user_id: u64) -> Result<Option<UserAddress>, Error> {
        let row = sqlx::query("SELECT address, is_active FROM user_addresses WHERE chain_tag = $1 AND user_id = $2")
            .bind(chain_tag.to_string())
            .bind(user_id as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(to_sql_err)?;

        Ok(row.map(|row| UserAddress {
            user_id,
            address: row.get("address"),
            chain_tag,
            is_active: row.get("is_active"),
        }))
    }

    async fn get_chain_cursor(&self, chain_tag: ChainTag) -> Result<Option<ChainCursor>, Error> {
        let row = sqlx::query("SELECT last_observed_block FROM chain_cursors WHERE chain_tag = $1")
            .bind(chain_tag.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(to_sql_err)?;

        Ok(row.map(|row| ChainCursor {
            chain_tag,
            last_observed_block: row.get::<i64, _>("last_observed_block") as u64,
        }))
    }

    async fn find_transfers_by_status(
        &self,
        chain_tag: ChainTag,
        status: TransferStatus,
    ) -> Result<Vec<UserTransfer>, Error> {
        let rows = sqlx::query(
            "SELECT tx_hash, tx_index, block_number, to_address, token_address, value, user_id, decimals \
             FROM transfers WHERE chain_tag = $1 AND status = $2 ORDER BY block_number, tx_index",
        )
        .bind(chain_tag.to_string())
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(to_sql_err)?;

        rows.into_iter()
            .map(|row| {
                let value: String = row.get("value");
                Ok(UserTransfer {
                    transfer: RawTransfer {
                        tx_hash: row.get("tx_hash"),
                        block_number: row.get::<i64, _>("block_number") as u64,
                        chain_tag,
                        to: row.get("to_address"),
                        token: row.get("token_address"),
                        value: value
                            .parse()
                            .map_err(|_| Error::InvalidFormat { context: "stored transfer value", value })?,
                        index: row.get::<i32, _>("tx_index") as u32,
                    },
                    user_id: row.get::<i64, _>("user_id") as u64,
                    decimals: row.get::<i16, _>("decimals") as u8,
                    status,
                })
            })
            .collect()
    }

    async fn get_token(&self, chain_tag: ChainTag, token_address: &str) -> Result<Option<Token>, Error> {
        let row = sqlx::query("SELECT decimals FROM tokens WHERE chain_tag = $1 AND token_address = $2")
            .bind(chain_tag.to_string())
            .bind(token_address.to_lowercase())
            .fetch_optional(&self.pool)
            .await
            .map_err(to_sql_err)?;

        Ok(row.map(|row| Token {
            chain_tag,
            token_address: token_address.to_lowercase(),
            decimals: row.get::<i16, _>("decimals") as u8,
        }))
    }

    async fn find_utxos_by_status(&self, status: UtxoStatus) -> Result<Vec<Utxo>, Error> {
        let rows = sqlx::query(
            "SELECT tx_hash, tx_index, salt, amount FROM utxos WHERE status = $1 ORDER BY inserted_at",
        )
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(to_sql_err)?;

        rows.into_iter()
            .map(|row| {
                let tx_hash: String = row.get("tx_hash");
                Ok(Utxo {
                    outpoint: UtxoOutpoint {
                        tx_hash: tx_hash_bytes(&tx_hash)?,
                        index: row.get::<i32, _>("tx_index") as u32,
                    },
                    salt: row.get::<i64, _>("salt") as u64,
                    amount: row.get::<i64, _>("amount") as u64,
                    status,
                })
            })
            .collect()
    }

    async fn get_withdraw_request(
        &self,
        chain_tag: ChainTag,
        nonce: u64,
    ) -> Result<Option<WithdrawRequest>, Error> {
        let row = sqlx::query(
            "SELECT user_id, recipient, token_address, amount, status, tx_hash, utxos, sat_per_byte \
             FROM withdraw_requests WHERE chain_tag = $1 AND nonce = $2",
        )
        .bind(chain_tag.to_string())
        .bind(nonce as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(to_sql_err)?;

        let Some(row) = row else { return Ok(None) };
        Ok(Some(row_to_withdraw(chain_tag, nonce, row)?))
    }

    async fn find_withdraw_requests_by_status(
        &self,
        chain_tag: ChainTag,
        status: WithdrawStatus,
    ) -> Result<Vec<WithdrawRequest>, Error> {
        let rows = sqlx::query(
            "SELECT nonce, user_id, recipient, token_address, amount, status, tx_hash, utxos, sat_per_byte \
             FROM withdraw_requests WHERE chain_tag = $1 AND status = $2 ORDER BY nonce",
        )
        .bind(chain_tag.to_string())
        .bind(status.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(to_sql_err)?;

        rows.into_iter()
            .map(|row| {
                let nonce = row.get::<i64, _>("nonce") as u64;
                row_to_withdraw(chain_tag, nonce, row)
            })
            .collect()
    }
}

fn row_to_withdraw(chain_tag: ChainTag, nonce: u64, row: sqlx::postgres::PgRow) -> Result<WithdrawRequest, Error> {
    let amount: String = row.get("amount");
    let status: String = row.get("status");
    let utxos_json: Option<serde_json::Value> = row.get("utxos");
    let utxos = utxos_json
        .map(|v| serde_json::from_value::<Vec<UtxoRef>>(v))
        .transpose()
        .map_err(|source| Error::Decode { context: "stored withdraw utxos", source })?;

    Ok(WithdrawRequest {
        nonce,
        chain_tag,
        user_id: row.get::<i64, _>("user_id") as u64,
        recipient: row.get("recipient"),
        token_address: row.get("token_address"),
        amount: amount.parse().map_err(|_| Error::InvalidFormat { context: "stored withdraw amount", value: amount })?,
        status: WithdrawStatus::from_str(&status)
            .map_err(|_| Error::InvalidFormat { context: "stored withdraw status", value: status })?,
        tx_hash: row.get("tx_hash"),
        utxos,
        sat_per_byte: row.get::<Option<i64>, _>("sat_per_byte").map(|v| v as u64),
    })
}

impl DbWrite for Store {
    async fn write_address(&self, address: UserAddress) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO user_addresses (chain_tag, user_id, address, is_active) VALUES ($1, $2, $3, $4) \
             ON CONFLICT (chain_tag, user_id) DO UPDATE SET address = EXCLUDED.address, is_active = EXCLUDED.is_active",
        )
        .bind(address.chain_tag.to_string())
        .bind(address.user_id as i64)
        .bind(address.address)
        .bind(address.is_active)
        .execute(&self.pool)
        .await
        .map_err(to_sql_err)?;
        Ok(())
    }

    async fn write_chain_cursor(&self, cursor: ChainCursor) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO chain_cursors (chain_tag, last_observed_block) VALUES ($1, $2) \
             ON CONFLICT (chain_tag) DO UPDATE SET last_observed_block = EXCLUDED.last_observed_block",
        )
        .bind(cursor.chain_tag.to_string())
        .bind(cursor.last_observed_block as i64)
        .execute(&self.pool)
        .await
        .map_err(to_sql_err)?;
        Ok(())
    }

    async fn write_transfer(&self, transfer: UserTransfer) -> Result<(), Error> {
        // Conditional insert, not an upsert: `set_transfer_status` is the
        // only thing allowed to move an existing row off PENDING, so a
        // retried batch that re-observes an already-finalized transfer must
        // not clobber it back to PENDING.
        sqlx::query(
            "INSERT INTO transfers \
             (chain_tag, tx_hash, tx_index, block_number, to_address, token_address, value, user_id, decimals, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (chain_tag, tx_hash, tx_index) DO NOTHING",
        )
        .bind(transfer.transfer.chain_tag.to_string())
        .bind(transfer.transfer.tx_hash)
        .bind(transfer.transfer.index as i32)
        .bind(transfer.transfer.block_number as i64)
        .bind(transfer.transfer.to)
        .bind(transfer.transfer.token)
        .bind(transfer.transfer.value.to_string())
        .bind(transfer.user_id as i64)
        .bind(transfer.decimals as i16)
        .bind(transfer.status.to_string())
        .execute(&self.pool)
        .await
        .map_err(to_sql_err)?;
        Ok(())
    }

    async fn set_transfer_status(
        &self,
        chain_tag: ChainTag,
        tx_hash: &str,
        index: u32,
        status: TransferStatus,
    ) -> Result<(), Error> {
        let result = sqlx::query(
            "UPDATE transfers SET status = $1 WHERE chain_tag = $2 AND tx_hash = $3 AND tx_index = $4",
        )
        .bind(status.to_string())
        .bind(chain_tag.to_string())
        .bind(tx_hash)
        .bind(index as i32)
        .execute(&self.pool)
        .await
        .map_err(to_sql_err)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("transfer"));
        }
        Ok(())
    }

    async fn write_token(&self, token: Token) -> Result<(), Error> {
        sqlx::query(
            "INSERT INTO tokens (chain_tag, token_address, decimals) VALUES ($1, $2, $3) \
             ON CONFLICT (chain_tag, token_address) DO UPDATE SET decimals = EXCLUDED.decimals",
        )
        .bind(token.chain_tag.to_string())
        .bind(token.token_address.to_lowercase())
        .bind(token.decimals as i16)
        .execute(&self.pool)
        .await
        .map_err(to_sql_err)?;
        Ok(())
    }

    async fn write_utxo(&self, utxo: Utxo) -> Result<(), Error> {
        // Conditional insert: re-observing the block that created this
        // output must not reset a UTXO a withdraw has already spent back to
        // UNSPENT; only `set_utxo_status` may move it off its initial state.
        sqlx::query(
            "INSERT INTO utxos (tx_hash, tx_index, salt, amount, status) VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (tx_hash, tx_index) DO NOTHING",
        )
        .bind(tx_hash_hex(utxo.outpoint.tx_hash))
        .bind(utxo.outpoint.index as i32)
        .bind(utxo.salt as i64)
        .bind(utxo.amount as i64)
        .bind(utxo.status.to_string())
        .execute(&self.pool)
        .await
        .map_err(to_sql_err)?;
        Ok(())
    }

    async fn set_utxo_status(&self, outpoint: UtxoOutpoint, status: UtxoStatus) -> Result<(), Error> {
        let result = sqlx::query("UPDATE utxos SET status = $1 WHERE tx_hash = $2 AND tx_index = $3")
            .bind(status.to_string())
            .bind(tx_hash_hex(outpoint.tx_hash))
            .bind(outpoint.index as i32)
            .execute(&self.pool)
            .await
            .map_err(to_sql_err)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("utxo"));
        }
        Ok(())
    }

    async fn write_withdraw_request(&self, request: WithdrawRequest) -> Result<(), Error> {
        let utxos_json = request
            .utxos
            .map(|u| serde_json::to_value(u))
            .transpose()
            .map_err(|source| Error::Decode { context: "withdraw utxos", source })?;
        sqlx::query(
            "INSERT INTO withdraw_requests \
             (chain_tag, nonce, user_id, recipient, token_address, amount, status, tx_hash, utxos, sat_per_byte) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             ON CONFLICT (chain_tag, nonce) DO UPDATE SET \
             user_id = EXCLUDED.user_id, recipient = EXCLUDED.recipient, token_address = EXCLUDED.token_address, \
             amount = EXCLUDED.amount, status = EXCLUDED.status, tx_hash = EXCLUDED.tx_hash, \
             utxos = EXCLUDED.utxos, sat_per_byte = EXCLUDED.sat_per_byte",
        )
        .bind(request.chain_tag.to_string())
        .bind(request.nonce as i64)
        .bind(request.user_id as i64)
        .bind(request.recipient)
        .bind(request.token_address)
        .bind(request.amount.to_string())
        .bind(request.status.to_string())
        .bind(request.tx_hash)
        .bind(utxos_json)
        .bind(request.sat_per_byte.map(|v| v as i64))
        .execute(&self.pool)
        .await
        .map_err(to_sql_err)?;
        Ok(())
    }

    async fn set_withdraw_status(
        &self,
        chain_tag: ChainTag,
        nonce: u64,
        status: WithdrawStatus,
        tx_hash: Option<String>,
    ) -> Result<(), Error> {
        let result = sqlx::query(
            "UPDATE withdraw_requests SET status = $1, tx_hash = COALESCE($2, tx_hash) \
             WHERE chain_tag = $3 AND nonce = $4",
        )
        .bind(status.to_string())
        .bind(tx_hash)
        .bind(chain_tag.to_string())
        .bind(nonce as i64)
        .execute(&self.pool)
        .await
        .map_err(to_sql_err)?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("withdraw_request"));
        }
        Ok(())
    }

    async fn assign_withdraw_utxos(
        &self,
        chain_tag: ChainTag,
        nonce: u64,
        utxos: Vec<UtxoRef>,
        sat_per_byte: u64,
    ) -> Result<(), Error> {
        let utxos_json = serde_json::to_value(&utxos).map_err(|source| Error::Decode { context: "withdraw utxos", source })?;
        sqlx::query(
            "UPDATE withdraw_requests SET utxos = $1, sat_per_byte = $2 \
             WHERE chain_tag = $3 AND nonce = $4 AND utxos IS NULL",
        )
        .bind(utxos_json)
        .bind(sat_per_byte as i64)
        .bind(chain_tag.to_string())
        .bind(nonce as i64)
        .execute(&self.pool)
        .await
        .map_err(to_sql_err)?;
        Ok(())
    }
}
