//! [`Payment`]-related [`Database`] implementations.

use common::{
    operations::{By, Insert, Lock, Select, Update},
    Money,
};
use postgres_types::Json;
use tokio_postgres::Row;
use tracerr::Traced;

use crate::{
    domain::{payment, Payment},
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
};

/// Columns of the `payments` table, in [`payment_from_row()`] order.
const COLUMNS: &str = "\
    id, item_id, checkout_id, phone, amount, amount_currency, status, \
    result_code, result_description, reservation, booking_id, attempts, \
    created_at, updated_at";

/// Parses a [`Payment`] out of the provided [`Row`].
fn payment_from_row(row: &Row) -> Payment {
    Payment {
        id: row.get("id"),
        item_id: row.get("item_id"),
        checkout_id: row.get("checkout_id"),
        phone: row.get("phone"),
        amount: Money {
            amount: row.get("amount"),
            currency: row.get("amount_currency"),
        },
        status: row.get("status"),
        result_code: row.get("result_code"),
        result_description: row.get("result_description"),
        reservation: row.get::<_, Json<_>>("reservation").0,
        booking_id: row.get("booking_id"),
        attempts: u16::try_from(row.get::<_, i32>("attempts"))
            .expect("`attempts` overflow"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl<C> Database<Select<By<Option<Payment>, payment::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Payment>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Payment>, payment::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: payment::Id = by.into_inner();

        let sql = format!(
            "SELECT {COLUMNS} \
             FROM payments \
             WHERE id = $1::UUID \
             LIMIT 1",
        );
        Ok(self
            .query_opt(sql.as_str(), &[&id])
            .await
            .map_err(tracerr::wrap!())?
            .as_ref()
            .map(payment_from_row))
    }
}

impl<C> Database<Select<By<Option<Payment>, payment::CheckoutId>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Payment>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Payment>, payment::CheckoutId>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let checkout_id: payment::CheckoutId = by.into_inner();

        let sql = format!(
            "SELECT {COLUMNS} \
             FROM payments \
             WHERE checkout_id = $1::VARCHAR \
             LIMIT 1",
        );
        Ok(self
            .query_opt(sql.as_str(), &[&checkout_id])
            .await
            .map_err(tracerr::wrap!())?
            .as_ref()
            .map(payment_from_row))
    }
}

impl<C> Database<Insert<Payment>> for Postgres<C>
where
    C: Connection,
    Self: Database<Update<Payment>, Ok = (), Err = Traced<database::Error>>,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(payment): Insert<Payment>,
    ) -> Result<Self::Ok, Self::Err> {
        self.execute(Update(payment)).await.map_err(tracerr::wrap!())
    }
}

impl<C> Database<Update<Payment>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(payment): Update<Payment>,
    ) -> Result<Self::Ok, Self::Err> {
        let Payment {
            id,
            item_id,
            checkout_id,
            phone,
            amount,
            status,
            result_code,
            result_description,
            reservation,
            booking_id,
            attempts,
            created_at,
            updated_at,
        } = payment;

        let reservation = Json(reservation);
        let attempts = i32::from(attempts);

        const SQL: &str = "\
            INSERT INTO payments (\
                id, item_id, checkout_id, phone, amount, amount_currency, \
                status, result_code, result_description, reservation, \
                booking_id, attempts, created_at, updated_at\
            ) VALUES (\
                $1::UUID, $2::UUID, $3::VARCHAR, $4::VARCHAR, \
                $5::NUMERIC, $6::INT2, \
                $7::INT2, $8::INT4, $9::TEXT, $10::JSONB, \
                $11::UUID, $12::INT4, $13::TIMESTAMPTZ, $14::TIMESTAMPTZ\
            ) \
            ON CONFLICT (id) DO UPDATE \
            SET checkout_id = EXCLUDED.checkout_id, \
                status = EXCLUDED.status, \
                result_code = EXCLUDED.result_code, \
                result_description = EXCLUDED.result_description, \
                booking_id = EXCLUDED.booking_id, \
                attempts = EXCLUDED.attempts, \
                updated_at = EXCLUDED.updated_at";
        self.exec(
            SQL,
            &[
                &id,
                &item_id,
                &checkout_id,
                &phone,
                &amount.amount,
                &amount.currency,
                &status,
                &result_code,
                &result_description,
                &reservation,
                &booking_id,
                &attempts,
                &created_at,
                &updated_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}

impl<C> Database<Lock<By<Payment, payment::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Lock(by): Lock<By<Payment, payment::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: payment::Id = by.into_inner();

        const SQL: &str = "\
            SELECT id \
            FROM payments \
            WHERE id = $1::UUID \
            FOR UPDATE";
        self.query(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}

impl<C> Database<Update<payment::Resolution>> for Postgres<C>
where
    C: Connection,
{
    type Ok = bool;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(resolution): Update<payment::Resolution>,
    ) -> Result<Self::Ok, Self::Err> {
        let status = resolution.status();
        let payment::Resolution {
            checkout_id,
            result_code,
            result_description,
            resolved_at,
        } = resolution;

        // Only a pending `Payment` is resolved, so duplicates are no-ops.
        const SQL: &str = "\
            UPDATE payments \
            SET status = $2::INT2, \
                result_code = $3::INT4, \
                result_description = $4::TEXT, \
                updated_at = $5::TIMESTAMPTZ \
            WHERE checkout_id = $1::VARCHAR \
              AND status = $6::INT2";
        self.exec(
            SQL,
            &[
                &checkout_id,
                &status,
                &result_code,
                &result_description,
                &resolved_at,
                &payment::Status::Pending,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(|updated| updated > 0)
    }
}

impl<C> Database<Update<payment::Expiration>> for Postgres<C>
where
    C: Connection,
{
    type Ok = u64;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Update(expiration): Update<payment::Expiration>,
    ) -> Result<Self::Ok, Self::Err> {
        let payment::Expiration {
            created_before,
            expired_at,
        } = expiration;

        const SQL: &str = "\
            UPDATE payments \
            SET status = $3::INT2, \
                result_code = NULL, \
                result_description = $4::TEXT, \
                updated_at = $2::TIMESTAMPTZ \
            WHERE status = $5::INT2 \
              AND created_at < $1::TIMESTAMPTZ";
        self.exec(
            SQL,
            &[
                &created_before,
                &expired_at,
                &payment::Status::Failed,
                &Payment::EXPIRED,
                &payment::Status::Pending,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
    }
}
