//! [`Item`]-related [`Database`] implementations.

use common::operations::{By, Lock, Select};
use postgres_types::Json;
use tracerr::Traced;

use crate::{
    domain::{item, Item},
    infra::{
        database::{self, postgres::Connection, Postgres},
        Database,
    },
};

impl<C> Database<Select<By<Option<Item>, item::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = Option<Item>;
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Select(by): Select<By<Option<Item>, item::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: item::Id = by.into_inner();

        const SQL: &str = "\
            SELECT id, host_id, kind, name, currency, \
                   entrance, capacity, activities, visit \
            FROM items \
            WHERE id = $1::UUID \
            LIMIT 1";
        Ok(self
            .query_opt(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())?
            .map(|row| Item {
                id: row.get("id"),
                host_id: row.get("host_id"),
                kind: row.get("kind"),
                name: row.get("name"),
                currency: row.get("currency"),
                entrance: row.get::<_, Json<_>>("entrance").0,
                capacity: row.get::<_, Json<_>>("capacity").0,
                activities: row.get::<_, Json<_>>("activities").0,
                visit: row.get::<_, Json<_>>("visit").0,
            }))
    }
}

impl<C> Database<Lock<By<Item, item::Id>>> for Postgres<C>
where
    C: Connection,
{
    type Ok = ();
    type Err = Traced<database::Error>;

    async fn execute(
        &self,
        Lock(by): Lock<By<Item, item::Id>>,
    ) -> Result<Self::Ok, Self::Err> {
        // Avoid subtle change for SQL.
        let id: item::Id = by.into_inner();

        const SQL: &str = "\
            SELECT id \
            FROM items \
            WHERE id = $1::UUID \
            FOR UPDATE";
        self.query(SQL, &[&id])
            .await
            .map_err(tracerr::wrap!())
            .map(drop)
    }
}
