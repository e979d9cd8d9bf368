use std::sync::Arc;

use common::DateRange;
use futures::future;
use tokio_util::sync::CancellationToken;

use crate::{
    command::{
        create_manual_entry, retry_payment,
        submit_reservation::ExecutionError as E, CreateManualEntry,
        RetryPayment, SubmitReservation, Submission,
    },
    domain::{booking, item, payment, PaymentMethod},
    infra::gateway,
    query::availability,
    task::{reconcile_payment, Outcome},
    Command as _, Event,
};

use super::{
    adults, awaiting, cabin, cabin_for, cabin_item, day, guest, kes,
    paid_item, slot_item, Env,
};

#[tokio::test]
async fn last_slot_goes_to_exactly_one_request() {
    let env = Env::new();
    let item = slot_item(1, item::Entrance::Free);
    env.seed(&item).await;

    let (first, second) = tokio::join!(
        env.submit(item.id, adults(1)),
        env.submit(item.id, adults(1)),
    );

    let (ok, err) = match (first, second) {
        (Ok(ok), Err(err)) | (Err(err), Ok(ok)) => (ok, err),
        other => panic!("expected exactly one success, got {other:?}"),
    };
    assert!(matches!(ok, Submission::Confirmed(_)));
    assert!(matches!(err, E::InsufficientCapacity(_)), "{err}");
    assert_eq!(env.db.bookings().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_never_overbook() {
    let env = Arc::new(Env::new());
    let item = slot_item(5, item::Entrance::Free);
    env.seed(&item).await;

    let item_id = item.id;
    let results = future::join_all((0..12).map(|_| {
        let env = Arc::clone(&env);
        tokio::spawn(async move {
            env.service
                .execute(SubmitReservation {
                    item_id,
                    request: adults(1),
                    payer: guest(),
                    method: PaymentMethod::MobileMoney,
                    referral: None,
                })
                .await
                .map_err(tracerr::Traced::into_inner)
        })
    }))
    .await;

    let mut confirmed = 0;
    for res in results {
        match res.unwrap() {
            Ok(Submission::Confirmed(_)) => confirmed += 1,
            Ok(Submission::AwaitingPayment(p)) => panic!("paid: {p:?}"),
            Err(e) => assert!(matches!(e, E::InsufficientCapacity(_)), "{e}"),
        }
    }
    assert_eq!(confirmed, 5);

    let booked: u32 = env.db.bookings().iter().map(|b| b.slots).sum();
    assert_eq!(booked, 5);
}

#[tokio::test]
async fn facility_ranges_never_overlap() {
    let env = Env::new();
    let item = cabin_item();
    env.seed(&item).await;

    let entry = env
        .service
        .execute(CreateManualEntry {
            item_id: item.id,
            host_id: item.host_id,
            request: cabin_for(5, 9),
            guest: guest(),
        })
        .await
        .unwrap();
    assert_eq!(entry.visit_date, day(5));

    let err = env.submit(item.id, cabin_for(8, 11)).await.unwrap_err();
    let E::FacilityConflict(conflict) = err else {
        panic!("expected facility conflict, got {err}");
    };
    assert_eq!(conflict.facility, cabin());

    let payment =
        awaiting(env.submit(item.id, cabin_for(10, 12)).await.unwrap());
    assert_eq!(payment.amount, kes("8000"));

    let payment = env.resolve(&payment, 0).await;
    assert!(payment.booking_id.is_some());

    let busy = env
        .service
        .execute(availability::Facility {
            item_id: item.id,
            facility: cabin(),
            range: DateRange::new(day(12), day(13)).unwrap(),
        })
        .await
        .unwrap();
    assert!(busy.is_some());
}

#[tokio::test]
async fn free_reservation_is_confirmed_without_payment() {
    let env = Env::new();
    let item = slot_item(10, item::Entrance::Free);
    env.seed(&item).await;

    let Submission::Confirmed(booking) =
        env.submit(item.id, adults(3)).await.unwrap()
    else {
        panic!("free reservation awaits payment");
    };
    assert!(booking.is_confirmed());
    assert_eq!(booking.payment_status, booking::PaymentStatus::Completed);
    assert_eq!(booking.slots, 3);
    assert!(booking.total.is_zero());
    assert!(booking.payment_id.is_none());
    assert!(env.gateway.charges().is_empty());

    let left = env
        .service
        .execute(availability::Slots {
            item_id: item.id,
            date: day(3),
        })
        .await
        .unwrap();
    assert_eq!(left.remaining(), 7);
}

#[tokio::test]
async fn manual_entries_hold_capacity() {
    let env = Env::new();
    let item = slot_item(4, item::Entrance::Free);
    env.seed(&item).await;

    _ = env
        .service
        .execute(CreateManualEntry {
            item_id: item.id,
            host_id: item.host_id,
            request: adults(3),
            guest: guest(),
        })
        .await
        .unwrap();

    let err = env.submit(item.id, adults(2)).await.unwrap_err();
    assert!(matches!(err, E::InsufficientCapacity(_)), "{err}");
    assert!(env.submit(item.id, adults(1)).await.is_ok());

    let err = env
        .service
        .execute(CreateManualEntry {
            item_id: item.id,
            host_id: item::HostId::new(),
            request: adults(1),
            guest: guest(),
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_ref(),
        create_manual_entry::ExecutionError::NotItemHost { .. },
    ));
}

#[tokio::test]
async fn validates_requests_before_charging() {
    let env = Env::new();
    let item = paid_item(10);
    env.seed(&item).await;

    let err = env
        .submit(
            item.id,
            booking::Request {
                date: Some(day(-1)),
                ..adults(1)
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, E::DateOutOfPolicy(_)), "{err}");

    let err = env.submit(item.id, adults(0)).await.unwrap_err();
    assert!(
        matches!(err, E::Validation(booking::ValidationError::EmptySelection)),
        "{err}",
    );

    let err = env
        .service
        .execute(SubmitReservation {
            item_id: item.id,
            request: adults(1),
            payer: booking::Payer {
                email: None,
                ..guest()
            },
            method: PaymentMethod::MobileMoney,
            referral: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_ref(),
        E::Validation(booking::ValidationError::MissingGuestEmail),
    ));

    let err = env
        .service
        .execute(SubmitReservation {
            item_id: item.id,
            request: adults(1),
            payer: guest(),
            method: PaymentMethod::Card,
            referral: None,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_ref(),
        E::PaymentMethodUnsupported(PaymentMethod::Card),
    ));

    assert!(env.gateway.charges().is_empty());
}

#[tokio::test]
async fn paid_reservation_is_confirmed_once_payment_completes() {
    let env = Env::new();
    let item = paid_item(10);
    env.seed(&item).await;
    let mut events = env.service.subscribe();

    let payment = awaiting(env.submit(item.id, adults(2)).await.unwrap());
    assert_eq!(payment.amount, kes("3000"));
    assert_eq!(payment.status, payment::Status::Pending);
    assert_eq!(payment.attempts, 1);
    assert!(env.db.bookings().is_empty());

    let charges = env.gateway.charges();
    assert_eq!(charges.len(), 1);
    assert_eq!(charges[0].payment_id, payment.id);
    assert_eq!(charges[0].amount, kes("3000"));

    _ = env.resolve(&payment, 0).await;
    let Outcome::Completed(booking) = env
        .reconcile(payment.id, Default::default())
        .await
        .unwrap()
    else {
        panic!("reconciliation is cancelled");
    };
    assert_eq!(booking.payment_id, Some(payment.id));
    assert_eq!(booking.slots, 2);
    assert_eq!(env.db.bookings(), vec![booking.clone()]);

    match events.try_recv().unwrap() {
        Event::BookingConfirmed {
            booking: confirmed,
            item_name,
        } => {
            assert_eq!(confirmed, booking);
            assert_eq!(item_name, item.name);
        }
        e @ Event::PaymentFailed { .. } => panic!("{e:?}"),
    }
}

#[tokio::test]
async fn reports_failed_initiation() {
    let env = Env::new();
    let item = paid_item(10);
    env.seed(&item).await;
    env.gateway.reject_next(gateway::memory::Error::Unreachable);

    let err = env.submit(item.id, adults(1)).await.unwrap_err();
    assert!(matches!(err, E::PaymentInitiationFailed(_)), "{err}");
    assert!(env.db.bookings().is_empty());
}

#[tokio::test]
async fn fails_closed_when_store_is_unavailable() {
    let env = Env::new();
    let item = slot_item(10, item::Entrance::Free);
    env.seed(&item).await;

    env.db.set_unavailable(true);

    let err = env.submit(item.id, adults(1)).await.unwrap_err();
    assert!(matches!(err, E::Db(_)), "{err}");

    env.db.set_unavailable(false);
    assert!(env.db.bookings().is_empty());
    assert!(env.submit(item.id, adults(1)).await.is_ok());
}

#[tokio::test]
async fn single_flight_rejects_retry_while_reconciling() {
    let env = Env::new();
    let item = paid_item(10);
    env.seed(&item).await;
    let payment = awaiting(env.submit(item.id, adults(1)).await.unwrap());

    let cancel = CancellationToken::new();
    let (first, (second, retry)) = tokio::join!(
        env.reconcile(payment.id, cancel.clone()),
        async {
            tokio::task::yield_now().await;
            let second = env.reconcile(payment.id, cancel.clone()).await;
            let retry = env
                .service
                .execute(RetryPayment {
                    payment_id: payment.id,
                })
                .await;
            cancel.cancel();
            (second, retry)
        },
    );

    assert!(matches!(first.unwrap(), Outcome::Cancelled));
    assert!(matches!(
        second.unwrap_err(),
        reconcile_payment::ExecutionError::AlreadyReconciling(_),
    ));
    assert!(matches!(
        retry.unwrap_err().as_ref(),
        retry_payment::ExecutionError::AlreadyReconciling(_),
    ));
    assert!(!env.service.reconciling.contains(payment.id));
}

#[tokio::test]
async fn availability_rejects_wrong_capacity_mode() {
    use availability::ExecutionError as A;

    let env = Env::new();
    let slots = paid_item(5);
    let cabins = cabin_item();
    env.seed(&slots).await;
    env.seed(&cabins).await;

    let err = env
        .service
        .execute(availability::Facility {
            item_id: slots.id,
            facility: cabin(),
            range: DateRange::new(day(2), day(4)).unwrap(),
        })
        .await
        .unwrap_err()
        .into_inner();
    assert!(matches!(err, A::NotFacilityBased(id) if id == slots.id));

    let err = env
        .service
        .execute(availability::Slots {
            item_id: cabins.id,
            date: day(2),
        })
        .await
        .unwrap_err()
        .into_inner();
    assert!(matches!(err, A::NotSlotBased(id) if id == cabins.id));
}
