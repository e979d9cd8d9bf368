//! [`Booking`]- and [`ManualEntry`]-related [`Database`] implementations.

use common::{
    operations::{By, Insert, Select},
    Date, Money,
};
use postgres_types::Json;
use tokio_postgres::Row;
use tracerr::Traced;

use crate::{
    domain::{booking, item, Booking, ManualEntry},
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
    read::{
        capacity::BookedSlots,
        overlap::{Holds, Source},
    },
};

/// Parses a [`Booking`] out of the provided [`Row`].
fn booking_from_row(row: &Row) -> Booking {
    Booking {
        id: row.get("id"),
        item_id: row.get("item_id"),
        status: row.get("status"),
        payment_status: row.get("payment_status"),
        slots: u32::try_from(row.get::<_, i64>("slots"))
            .expect("`slots` overflow"),
        visit_date: row.get("visit_date"),
        detail: row.get::<_, Json<_>>("detail").0,
        payer: row.get::<_, Json<_>>("payer").0,
        total: Money {
            amount: row.get("total"),
            currency: row.get("total_currency"),
        },
        referral: row.get("referral"),
        payment_id: row.get("payment_id"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

impl<C> Database<Select<By<Option<Booking>, booking::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Booking>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Booking>, booking::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: booking::Id = by.into_inner();

        const SQL: &str = "\
            SELECT id, item_id, status, payment_status, slots, visit_date, \
                   detail, payer, total, total_currency, referral, \
                   payment_id, created_at, updated_at \
            FROM bookings \
            WHERE id = $1::UUID \
            LIMIT 1";
        Ok(self
            .query_opt(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())?
            .as_ref()
            .map(booking_from_row))
    }
}

impl<C> Database<Insert<Booking>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(booking): Insert<Booking>,
    ) -> Result<Self::Ok, Self::Err> {
        let Booking {
            id,
            item_id,
            status,
            payment_status,
            slots,
            visit_date,
            detail,
            payer,
            total,
            referral,
            payment_id,
            created_at,
            updated_at,
        } = booking;

        let slots = i64::from(slots);
        let detail = Json(detail);
        let payer = Json(payer);

        const SQL: &str = "\
            INSERT INTO bookings (\
                id, item_id, status, payment_status, slots, visit_date, \
                detail, payer, total, total_currency, referral, \
                payment_id, created_at, updated_at\
            ) VALUES (\
                $1::UUID, $2::UUID, $3::INT2, $4::INT2, $5::INT8, $6::DATE, \
                $7::JSONB, $8::JSONB, $9::NUMERIC, $10::INT2, $11::VARCHAR, \
                $12::UUID, $13::TIMESTAMPTZ, $14::TIMESTAMPTZ\
            )";
        self.exec(
            SQL,
            &[
                &id,
                &item_id,
                &status,
                &payment_status,
                &slots,
                &visit_date,
                &detail,
                &payer,
                &total.amount,
                &total.currency,
                &referral,
                &payment_id,
                &created_at,
                &updated_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}

impl<C> Database<Insert<ManualEntry>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Insert(entry): Insert<ManualEntry>,
    ) -> Result<Self::Ok, Self::Err> {
        let ManualEntry {
            id,
            item_id,
            host_id,
            status,
            slots,
            visit_date,
            detail,
            guest,
            created_at,
        } = entry;

        let slots = i64::from(slots);
        let detail = Json(detail);
        let guest = Json(guest);

        const SQL: &str = "\
            INSERT INTO manual_entries (\
                id, item_id, host_id, status, slots, visit_date, \
                detail, guest, created_at\
            ) VALUES (\
                $1::UUID, $2::UUID, $3::UUID, $4::INT2, $5::INT8, $6::DATE, \
                $7::JSONB, $8::JSONB, $9::TIMESTAMPTZ\
            )";
        self.exec(
            SQL,
            &[
                &id,
                &item_id,
                &host_id,
                &status,
                &slots,
                &visit_date,
                &detail,
                &guest,
                &created_at,
            ],
        )
        .await
        .map_err(tracerr::wrap!())
        .map(drop)
    }
}

impl<C> Database<Select<By<BookedSlots, (item::Id, Date)>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = BookedSlots;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<BookedSlots, (item::Id, Date)>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let (item_id, date): (item::Id, Date) = by.into_inner();

        const SQL: &str = "\
            SELECT booked \
            FROM booked_slots_by_date \
            WHERE item_id = $1::UUID \
              AND visit_date = $2::DATE";
        Ok(self
            .query_opt(SQL, &[&item_id, &date])
            .await
            .map_err(tracerr::wrap!())?
            .map_or(BookedSlots::default(), |row| {
                BookedSlots(
                    u32::try_from(row.get::<_, i64>("booked"))
                        .unwrap_or(u32::MAX),
                )
            }))
    }
}

impl<C> Database<Select<By<Holds, item::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Holds;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Holds, item::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let item_id: item::Id = by.into_inner();

        const SQL: &str = "\
            SELECT id, detail, false AS manual \
            FROM bookings \
            WHERE item_id = $1::UUID \
              AND status = $2::INT2 \
              AND detail->>'kind' = 'facility' \
            UNION ALL \
            SELECT id, detail, true AS manual \
            FROM manual_entries \
            WHERE item_id = $1::UUID \
              AND status = $2::INT2 \
              AND detail->>'kind' = 'facility'";
        let rows = self
            .query(SQL, &[&item_id, &booking::Status::Confirmed])
            .await
            .map_err(tracerr::wrap!())?;

        let mut holds = Holds::default();
        for row in rows {
            let source = if row.get("manual") {
                Source::ManualEntry(row.get("id"))
            } else {
                Source::Booking(row.get("id"))
            };
            let Json(detail) = row.get::<_, Json<booking::Detail>>("detail");
            holds.add(source, &detail);
        }
        Ok(holds)
    }
}
