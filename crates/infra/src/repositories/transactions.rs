//! Transaction ledger persistence.

use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use coffer_core::{TransactionId, UserId};
use coffer_ledger::{expand_installments, NewTransaction, Transaction};

use crate::db::StoreError;

const INSERT_TRANSACTION_SQL: &str = r#"
    INSERT INTO transactions (
        id,
        user_id,
        source,
        external_id,
        product_id,
        price,
        tax_percentage,
        commission_percentage,
        takehome_percentage,
        takehome_amount,
        created_at,
        transacted_at,
        applied_at,
        currency,
        amortized_transaction_id
    )
    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
    ON CONFLICT (external_id, source) DO NOTHING
"#;

#[derive(Clone)]
pub struct TransactionsRepository {
    pool: PgPool,
}

impl TransactionsRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Record a purchase, fanning amortized durations out into parent +
    /// installment rows.
    ///
    /// All rows are written in one transaction. Natural-key duplicates are
    /// skipped by the unique constraint (`ON CONFLICT DO NOTHING`), so a
    /// resubmitted batch is idempotent. Any other failure rolls the batch
    /// back and each row is retried individually with its user link
    /// cleared, so a concurrently deleted user cannot sink sibling rows.
    ///
    /// Returns `(inserted, attempted)`.
    pub async fn insert_transaction(
        &self,
        new: &NewTransaction,
    ) -> Result<(u64, usize), StoreError> {
        let rows = expand_installments(new);
        let attempted = rows.len();

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;
        let mut batch_error = None;

        for row in &rows {
            match insert_row(&mut *tx, row).await {
                Ok(n) => inserted += n,
                Err(e) => {
                    batch_error = Some(e);
                    break;
                }
            }
        }

        let Some(err) = batch_error else {
            tx.commit().await?;
            return Ok((inserted, attempted));
        };

        tracing::warn!(
            external_id = %new.external_id,
            source = %new.source,
            "transaction batch failed, retrying row-by-row: {err}"
        );
        tx.rollback().await?;

        let mut orphaned = rows;
        for row in &mut orphaned {
            row.user_id = None;
        }

        inserted = 0;
        for row in &orphaned {
            inserted += insert_row(&self.pool, row).await.map_err(StoreError::from)?;
        }

        Ok((inserted, attempted))
    }

    /// Single-row insert with no amortization; a true no-op when a row
    /// with the same external id already exists.
    ///
    /// The existence check is a read before the write, so two concurrent
    /// identical inserts can race; the upstream producer delivers each
    /// external id once, and the unique constraint still backstops the
    /// pair `(external_id, source)`.
    pub async fn insert_transaction_no_duplicate(
        &self,
        new: &NewTransaction,
    ) -> Result<bool, StoreError> {
        let exists = sqlx::query("SELECT 1 FROM transactions WHERE external_id = $1")
            .bind(&new.external_id)
            .fetch_optional(&self.pool)
            .await?;

        if exists.is_some() {
            return Ok(false);
        }

        let row = Transaction {
            id: TransactionId::new(),
            user_id: new.user_id,
            source: new.source.clone(),
            external_id: new.external_id.clone(),
            product_id: new.product_id.clone(),
            price: new.price,
            tax_percentage: new.tax_percentage,
            commission_percentage: new.commission_percentage,
            takehome_percentage: Some(new.takehome_percentage),
            takehome_amount: new.takehome_amount,
            created_at: new.created_at,
            transacted_at: new.created_at,
            applied_at: Some(new.applied_at),
            currency: new.currency.clone(),
            amortized_transaction_id: None,
        };

        Ok(insert_row(&self.pool, &row).await? > 0)
    }

    /// Cancel an amortization schedule: drop the installments and make the
    /// parent's full amount apply at its creation time. No-op for an
    /// unknown external id.
    pub async fn delete_amortizations(&self, external_id: &str) -> Result<(), StoreError> {
        let parent = sqlx::query(
            "SELECT id FROM transactions WHERE external_id = $1 AND amortized_transaction_id IS NULL",
        )
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(parent) = parent else {
            return Ok(());
        };
        let parent_id: Uuid = parent.try_get("id")?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM transactions WHERE amortized_transaction_id = $1")
            .bind(parent_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query("UPDATE transactions SET applied_at = created_at WHERE id = $1")
            .bind(parent_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn get_transaction(
        &self,
        source: &str,
        external_id: &str,
    ) -> Result<Option<Transaction>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, source, external_id, product_id, price,
                   tax_percentage, commission_percentage, takehome_percentage,
                   takehome_amount, created_at, transacted_at, applied_at,
                   currency, amortized_transaction_id
            FROM transactions
            WHERE source = $1 AND external_id = $2
            "#,
        )
        .bind(source)
        .bind(external_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| map_transaction(&r)).transpose().map_err(StoreError::from)
    }
}

async fn insert_row<'e, E>(executor: E, row: &Transaction) -> Result<u64, sqlx::Error>
where
    E: sqlx::PgExecutor<'e>,
{
    let result = sqlx::query(INSERT_TRANSACTION_SQL)
        .bind(row.id.as_uuid())
        .bind(row.user_id.map(Uuid::from))
        .bind(&row.source)
        .bind(&row.external_id)
        .bind(&row.product_id)
        .bind(row.price)
        .bind(row.tax_percentage)
        .bind(row.commission_percentage)
        .bind(row.takehome_percentage)
        .bind(row.takehome_amount)
        .bind(row.created_at)
        .bind(row.transacted_at)
        .bind(row.applied_at)
        .bind(&row.currency)
        .bind(row.amortized_transaction_id.map(Uuid::from))
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

/// Explicit column-by-column mapping into the domain model.
fn map_transaction(row: &PgRow) -> Result<Transaction, sqlx::Error> {
    Ok(Transaction {
        id: TransactionId::from_uuid(row.try_get("id")?),
        user_id: row
            .try_get::<Option<Uuid>, _>("user_id")?
            .map(UserId::from_uuid),
        source: row.try_get("source")?,
        external_id: row.try_get("external_id")?,
        product_id: row.try_get("product_id")?,
        price: row.try_get("price")?,
        tax_percentage: row.try_get("tax_percentage")?,
        commission_percentage: row.try_get("commission_percentage")?,
        takehome_percentage: row.try_get("takehome_percentage")?,
        takehome_amount: row.try_get("takehome_amount")?,
        created_at: row.try_get("created_at")?,
        transacted_at: row.try_get("transacted_at")?,
        applied_at: row.try_get("applied_at")?,
        currency: row.try_get("currency")?,
        amortized_transaction_id: row
            .try_get::<Option<Uuid>, _>("amortized_transaction_id")?
            .map(TransactionId::from_uuid),
    })
}
