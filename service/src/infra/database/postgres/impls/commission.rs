//! [`Commission`]-related [`Database`] implementations.

use common::{
    operations::{By, Insert, Select},
    Money,
};
use tracerr::Traced;

use crate::{
    domain::{booking, referral, Commission},
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
};

impl<C> Database<Select<By<Option<referral::Referrer>, referral::Code>>>
    for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<referral::Referrer>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<referral::Referrer>, referral::Code>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let code: referral::Code = by.into_inner();

        const SQL: &str = "\
            SELECT id, code \
            FROM referrers \
            WHERE code = $1::VARCHAR \
            LIMIT 1";
        Ok(self
            .query_opt(SQL, &[&code])
            .await
            .map_err(tracerr::wrap!())?
            .map(|row| referral::Referrer {
                id: row.get("id"),
                code: row.get("code"),
            }))
    }
}

impl<C> Database<Insert<Commission>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(commission): Insert<Commission>,
    ) -> Result<Self::Ok, Self::Err> {
        let Commission {
            id,
            referrer_id,
            code,
            booking_id,
            amount,
            created_at,
        } = commission;

        // At most one `Commission` per `Booking`: a repeated award is a no-op.
        const SQL: &str = "\
            INSERT INTO commissions (\
                id, referrer_id, code, booking_id, \
                amount, amount_currency, created_at\
            ) VALUES (\
                $1::UUID, $2::UUID, $3::VARCHAR, $4::UUID, \
                $5::NUMERIC, $6::INT2, $7::TIMESTAMPTZ\
            ) \
            ON CONFLICT (booking_id) DO NOTHING";
        self.exec(
            SQL,
            &[
                &id,
                &referrer_id,
                &code,
                &booking_id,
                &amount.amount,
                &amount.currency,
                &created_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}

impl<C> Database<Select<By<Option<Commission>, booking::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Commission>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Commission>, booking::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let booking_id: booking::Id = by.into_inner();

        const SQL: &str = "\
            SELECT id, referrer_id, code, booking_id, \
                   amount, amount_currency, created_at \
            FROM commissions \
            WHERE booking_id = $1::UUID \
            LIMIT 1";
        Ok(self
            .query_opt(SQL, &[&booking_id])
            .await
            .map_err(tracerr::wrap!())?
            .map(|row| Commission {
                id: row.get("id"),
                referrer_id: row.get("referrer_id"),
                code: row.get("code"),
                booking_id: row.get("booking_id"),
                amount: Money {
                    amount: row.get("amount"),
                    currency: row.get("amount_currency"),
                },
                created_at: row.get("created_at"),
            }))
    }
}
