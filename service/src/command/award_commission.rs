//! [`Command`] for awarding a referral [`Commission`].

use common::{
    operations::{By, Insert, Select},
    DateTime, Money,
};
use derive_more::{Display, Error, From};
use tracerr::Traced;
use tracing as log;

use crate::{
    domain::{booking, commission, referral, Commission},
    infra::{database, Database},
    Service,
};

use super::Command;

/// [`Command`] for awarding a [`Commission`] on a referred [`Booking`].
///
/// Idempotent: a [`Booking`] earns at most one [`Commission`], so a repeated
/// award returns the existing one.
///
/// [`Booking`]: crate::domain::Booking
#[derive(Clone, Debug)]
pub struct AwardCommission {
    /// ID of the referred [`Booking`].
    ///
    /// [`Booking`]: crate::domain::Booking
    pub booking_id: booking::Id,

    /// Total of the referred [`Booking`].
    ///
    /// [`Booking`]: crate::domain::Booking
    pub amount: Money,

    /// [`referral::Code`] the [`Booking`] was made through.
    ///
    /// [`Booking`]: crate::domain::Booking
    pub code: referral::Code,
}

impl<Db, Gw> Command<AwardCommission> for Service<Db, Gw>
where
    Db: Database<
            Select<By<Option<referral::Referrer>, referral::Code>>,
            Ok = Option<referral::Referrer>,
            Err = Traced<database::Error>,
        > + Database<Insert<Commission>, Err = Traced<database::Error>>
        + Database<
            Select<By<Option<Commission>, booking::Id>>,
            Ok = Option<Commission>,
            Err = Traced<database::Error>,
        >,
{
    type Ok = Commission;
    type Err = Traced<ExecutionError>;

    async fn execute(
        &self,
        cmd: AwardCommission,
    ) -> Result<Self::Ok, Self::Err> {
        use ExecutionError as E;

        let AwardCommission {
            booking_id,
            amount,
            code,
        } = cmd;

        let referrer = self
            .database()
            .execute(Select(By::<Option<referral::Referrer>, _>::new(
                code.clone(),
            )))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or_else(|| E::UnknownReferral(code.clone()))
            .map_err(tracerr::wrap!())?;

        let commission = Commission {
            id: commission::Id::new(),
            referrer_id: referrer.id,
            code,
            booking_id,
            amount: self.config().commission.apply(amount),
            created_at: DateTime::now().coerce(),
        };
        self.database()
            .execute(Insert(commission))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))
            .map(drop)?;

        let awarded = self
            .database()
            .execute(Select(By::<Option<Commission>, _>::new(booking_id)))
            .await
            .map_err(tracerr::map_from_and_wrap!(=> E))?
            .ok_or(E::NotAwarded(booking_id))
            .map_err(tracerr::wrap!())?;

        log::info!(
            "`Commission(id: {})` of {} awarded to `Referrer(id: {})` for \
             `Booking(id: {booking_id})`",
            awarded.id,
            awarded.amount,
            awarded.referrer_id,
        );
        Ok(awarded)
    }
}

/// Error of [`AwardCommission`] [`Command`] execution.
#[derive(Debug, Display, Error, From)]
pub enum ExecutionError {
    /// [`Database`] error.
    #[display("`Database` operation failed: {_0}")]
    #[from]
    Db(database::Error),

    /// No [`referral::Referrer`] owns the provided [`referral::Code`].
    #[display("Unknown referral code `{_0}`")]
    UnknownReferral(#[error(not(source))] referral::Code),

    /// [`Commission`] is missing right after being awarded.
    #[display("`Commission` for `Booking(id: {_0})` is missing")]
    NotAwarded(#[error(not(source))] booking::Id),
}
