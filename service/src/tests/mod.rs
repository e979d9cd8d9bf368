//! End-to-end scenarios of the [`Service`] over the in-memory [`Database`]
//! and the scripted payment [`Gateway`].
//!
//! [`Database`]: crate::infra::Database
//! [`Gateway`]: crate::infra::Gateway

mod reconciliation;
mod referral_commission;
mod reservation;

use std::{str::FromStr as _, time::Duration};

use common::{
    money::Currency,
    operations::{Insert, Perform},
    Date, DateRange, DateTime, Handler as _, Money, Percent,
};
use tokio_util::sync::CancellationToken;

use crate::{
    command::{ResolvePayment, SubmitReservation, Submission},
    domain::{
        booking::{self, FacilitySelection},
        commission, item, payment, referral, Item, Payment, PaymentMethod,
    },
    infra::{database, gateway},
    task::{self, expire_stale_payments, ReconcilePayment},
    Config,
};

/// [`crate::Service`] under test.
type Service = crate::Service<database::Memory, gateway::Memory>;

/// [`Service`] along with its in-memory infrastructure.
struct Env {
    service: Service,
    db: database::Memory,
    gateway: gateway::Memory,
}

impl Env {
    /// Creates a new [`Env`] with empty infrastructure.
    fn new() -> Self {
        let db = database::Memory::new();
        let gateway = gateway::Memory::new();
        let config = Config {
            availability_cache_ttl: Duration::from_secs(30),
            commission: commission::Policy::Percentage(
                Percent::from_str("10").unwrap(),
            ),
            expire_stale_payments: expire_stale_payments::Config {
                interval: Duration::from_secs(3600),
                timeout: Duration::from_secs(24 * 3600),
            },
        };
        let (service, _) = Service::new(config, db.clone(), gateway.clone());
        Self {
            service,
            db,
            gateway,
        }
    }

    /// Stores the provided [`Item`].
    async fn seed(&self, item: &Item) {
        self.db.execute(Insert(item.clone())).await.unwrap();
    }

    /// Submits a reservation of the [`Item`] by a guest.
    async fn submit(
        &self,
        item_id: item::Id,
        request: booking::Request,
    ) -> Result<Submission, crate::command::submit_reservation::ExecutionError>
    {
        self.service
            .execute(SubmitReservation {
                item_id,
                request,
                payer: guest(),
                method: PaymentMethod::MobileMoney,
                referral: None,
            })
            .await
            .map_err(tracerr::Traced::into_inner)
    }

    /// Reports the provided `code` for the [`Payment`]'s latest charge.
    async fn resolve(&self, payment: &Payment, code: i32) -> Payment {
        self.service
            .execute(ResolvePayment {
                resolution: payment::Resolution {
                    checkout_id: payment.checkout_id.clone().unwrap(),
                    result_code: code.into(),
                    result_description: format!("result {code}"),
                    resolved_at: DateTime::now().coerce(),
                },
            })
            .await
            .unwrap()
    }

    /// Reconciles the [`Payment`] until a terminal outcome or the provided
    /// `cancel`lation.
    async fn reconcile(
        &self,
        payment_id: payment::Id,
        cancel: CancellationToken,
    ) -> Result<task::Outcome, task::reconcile_payment::ExecutionError> {
        self.service
            .execute(Perform(ReconcilePayment { payment_id, cancel }))
            .await
            .map_err(tracerr::Traced::into_inner)
    }
}

/// Parses the provided amount of Kenyan shillings.
fn kes(amount: &str) -> Money {
    Money::from_str(&format!("{amount}KES")).unwrap()
}

/// Returns the [`Date`] the provided number of `days` ahead of today.
fn day(days: i64) -> Date {
    Date::today().add_days(days).unwrap()
}

/// Returns a guest [`booking::Payer`] with full contacts.
fn guest() -> booking::Payer {
    booking::Payer {
        user_id: None,
        name: booking::GuestName::new("Jane Wanjiru"),
        email: booking::Email::new("jane@example.com"),
        phone: payment::Phone::new("0712345678"),
    }
}

/// Creates a slot-based [`Item`] with the provided number of slots.
fn slot_item(total: u32, entrance: item::Entrance) -> Item {
    Item {
        id: item::Id::new(),
        host_id: item::HostId::new(),
        kind: item::Kind::Trip,
        name: item::Name::new("Hell's Gate hike").unwrap(),
        currency: Currency::Kes,
        entrance,
        capacity: item::Capacity::Slots { total },
        activities: vec![],
        visit: item::Visit::Flexible {
            horizon_days: item::Visit::DEFAULT_HORIZON_DAYS,
        },
    }
}

/// Creates a paid slot-based [`Item`] with the provided number of slots.
fn paid_item(total: u32) -> Item {
    slot_item(
        total,
        item::Entrance::Paid {
            adult: kes("1500"),
            child: kes("750"),
        },
    )
}

/// Creates a facility-based [`Item`] renting a single "Cabin A".
fn cabin_item() -> Item {
    Item {
        id: item::Id::new(),
        host_id: item::HostId::new(),
        kind: item::Kind::Hotel,
        name: item::Name::new("Lake Naivasha lodge").unwrap(),
        currency: Currency::Kes,
        entrance: item::Entrance::Free,
        capacity: item::Capacity::Facilities {
            facilities: vec![item::Facility {
                name: cabin(),
                price_per_day: kes("4000"),
                capacity: None,
            }],
        },
        activities: vec![],
        visit: item::Visit::Flexible { horizon_days: 60 },
    }
}

/// Returns the name of the only facility of a [`cabin_item()`].
fn cabin() -> item::FacilityName {
    item::FacilityName::new("Cabin A").unwrap()
}

/// Requests the provided number of `adults` in three days.
fn adults(adults: u32) -> booking::Request {
    booking::Request {
        date: Some(day(3)),
        adults,
        ..booking::Request::default()
    }
}

/// Requests "Cabin A" from the `start` to the `end` day ahead of today.
fn cabin_for(start: i64, end: i64) -> booking::Request {
    booking::Request {
        facilities: vec![FacilitySelection {
            name: cabin(),
            range: DateRange::new(day(start), day(end)).unwrap(),
        }],
        ..booking::Request::default()
    }
}

/// Unwraps the [`Payment`] of a paid [`Submission`].
fn awaiting(submission: Submission) -> Payment {
    match submission {
        Submission::AwaitingPayment(payment) => payment,
        Submission::Confirmed(booking) => {
            panic!("expected a pending payment, got `{booking:?}`")
        }
    }
}

/// Creates a [`referral::Referrer`] owning the provided `code`.
fn referrer(code: &str) -> referral::Referrer {
    referral::Referrer {
        id: referral::ReferrerId::new(),
        code: referral::Code::new(code).unwrap(),
    }
}
