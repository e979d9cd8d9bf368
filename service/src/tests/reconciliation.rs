use std::time::Duration;

use common::{operations::Update, DateTime, Handler as _};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::{
    command::{
        finalize_payment, resolve_payment, retry_payment, FinalizePayment,
        ResolvePayment, RetryPayment,
    },
    domain::{payment, Payment},
    query,
    task::{
        reconcile_payment::{self, ExecutionError as E, BUDGET},
        Outcome,
    },
    Event,
};

use super::{
    adults, awaiting, cabin, cabin_for, cabin_item, paid_item, Env,
};

/// Submits a paid reservation of a fresh [`paid_item()`].
async fn pending(env: &Env) -> Payment {
    let item = paid_item(10);
    env.seed(&item).await;
    awaiting(env.submit(item.id, adults(1)).await.unwrap())
}

/// Reads the current state of the provided [`Payment`].
async fn reload(env: &Env, payment: &Payment) -> Payment {
    env.service
        .execute(query::payment::ById::by(payment.id))
        .await
        .unwrap()
        .unwrap()
}

/// Reports the provided [`Payment`] as paid by the gateway.
async fn complete(
    env: &Env,
    payment: &Payment,
) -> Result<Payment, resolve_payment::ExecutionError> {
    env.service
        .execute(ResolvePayment {
            resolution: payment::Resolution {
                checkout_id: payment.checkout_id.clone().unwrap(),
                result_code: 0_i32.into(),
                result_description: "The service request is processed \
                                     successfully."
                    .into(),
                resolved_at: DateTime::now().coerce(),
            },
        })
        .await
        .map_err(tracerr::Traced::into_inner)
}

#[tokio::test]
async fn cancelled_by_user_is_declined() {
    let env = Env::new();
    let payment = pending(&env).await;
    let mut events = env.service.subscribe();

    let failed = env.resolve(&payment, 1032).await;
    assert_eq!(failed.status, payment::Status::Failed);
    assert_eq!(
        failed.decline_reason(),
        Some(payment::DeclineReason::CancelledByUser),
    );

    let err = env
        .reconcile(payment.id, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(err.to_string(), "Payment declined: cancelled by user");
    assert!(env.db.bookings().is_empty());

    let Event::PaymentFailed { payment: p, reason } =
        events.try_recv().unwrap()
    else {
        panic!("expected `PaymentFailed` event");
    };
    assert_eq!(p.id, payment.id);
    assert_eq!(reason, payment::DeclineReason::CancelledByUser);
}

#[tokio::test]
async fn duplicate_resolutions_are_ignored() {
    let env = Env::new();
    let payment = pending(&env).await;
    let mut events = env.service.subscribe();

    let completed = env.resolve(&payment, 0).await;
    let again = env.resolve(&payment, 0).await;
    assert_eq!(completed.booking_id, again.booking_id);

    // Late decline of an already completed charge changes nothing.
    let late = env.resolve(&payment, 1032).await;
    assert_eq!(late.status, payment::Status::Completed);
    assert_eq!(late.booking_id, completed.booking_id);

    assert_eq!(env.db.bookings().len(), 1);
    assert!(matches!(
        events.try_recv().unwrap(),
        Event::BookingConfirmed { .. },
    ));
    assert!(events.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn times_out_once_budget_is_spent() {
    let env = Env::new();
    let payment = pending(&env).await;

    let started = Instant::now();
    let err = env
        .reconcile(payment.id, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, E::PaymentTimeout(id) if id == payment.id));
    assert!(err.is_retryable());
    assert!(started.elapsed() >= BUDGET);
    assert!(started.elapsed() < BUDGET + reconcile_payment::POLL_INTERVAL);

    let payment = reload(&env, &payment).await;
    assert_eq!(payment.status, payment::Status::Pending);
    assert!(env.db.bookings().is_empty());
}

#[tokio::test(start_paused = true)]
async fn completes_right_before_budget_is_spent() {
    let env = Env::new();
    let payment = pending(&env).await;

    let (outcome, ()) = tokio::join!(
        env.reconcile(payment.id, CancellationToken::new()),
        async {
            time::sleep(BUDGET - Duration::from_secs(3)).await;
            _ = env.resolve(&payment, 0).await;
        },
    );

    let Outcome::Completed(booking) = outcome.unwrap() else {
        panic!("reconciliation is cancelled");
    };
    assert_eq!(booking.payment_id, Some(payment.id));
    assert_eq!(env.db.bookings().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn cancellation_leaves_payment_as_is() {
    let env = Env::new();
    let payment = pending(&env).await;
    let cancel = CancellationToken::new();

    let started = Instant::now();
    let (outcome, ()) = tokio::join!(
        env.reconcile(payment.id, cancel.clone()),
        async {
            time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        },
    );

    assert!(matches!(outcome.unwrap(), Outcome::Cancelled));
    assert!(started.elapsed() < BUDGET);
    assert!(!env.service.reconciling.contains(payment.id));
    assert_eq!(
        reload(&env, &payment).await.status,
        payment::Status::Pending,
    );
}

#[tokio::test]
async fn retry_reuses_payment_and_books_once() {
    let env = Env::new();
    let payment = pending(&env).await;

    let declined = env.resolve(&payment, 1037).await;
    assert_eq!(declined.status, payment::Status::Failed);

    let retried = env
        .service
        .execute(RetryPayment {
            payment_id: payment.id,
        })
        .await
        .unwrap();
    assert_eq!(retried.id, payment.id);
    assert_eq!(retried.status, payment::Status::Pending);
    assert_eq!(retried.attempts, 2);
    assert!(retried.result_code.is_none());
    assert_ne!(retried.checkout_id, payment.checkout_id);
    assert_eq!(env.gateway.charges().len(), 2);

    let completed = env.resolve(&retried, 0).await;
    let booking_id = completed.booking_id.unwrap();

    let booking = env
        .service
        .execute(FinalizePayment {
            payment_id: payment.id,
        })
        .await
        .unwrap();
    assert_eq!(booking.id, booking_id);
    assert_eq!(env.db.bookings().len(), 1);

    let err = env
        .service
        .execute(RetryPayment {
            payment_id: payment.id,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_ref(),
        retry_payment::ExecutionError::AlreadyCompleted(_),
    ));
}

#[tokio::test]
async fn expired_payment_cannot_be_retried() {
    let env = Env::new();
    let payment = pending(&env).await;

    let expired = env
        .db
        .execute(Update(payment::Expiration {
            created_before: (DateTime::now() + Duration::from_secs(1))
                .coerce(),
            expired_at: DateTime::now().coerce(),
        }))
        .await
        .unwrap();
    assert_eq!(expired, 1);

    let payment = reload(&env, &payment).await;
    assert!(payment.is_expired());
    assert_eq!(
        payment.decline_reason(),
        Some(payment::DeclineReason::Expired),
    );

    let err = env
        .service
        .execute(RetryPayment {
            payment_id: payment.id,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err.as_ref(),
        retry_payment::ExecutionError::PaymentExpired(_),
    ));

    let err = env
        .reconcile(payment.id, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        E::PaymentDeclined(payment::DeclineReason::Expired),
    ));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn last_slot_is_confirmed_by_first_completed_payment_only() {
    use finalize_payment::ExecutionError as F;

    let env = Env::new();
    let item = paid_item(1);
    env.seed(&item).await;
    let first = awaiting(env.submit(item.id, adults(1)).await.unwrap());
    let second = awaiting(env.submit(item.id, adults(1)).await.unwrap());

    let paid = complete(&env, &first).await.unwrap();
    assert!(paid.booking_id.is_some());

    let err = complete(&env, &second).await.unwrap_err();
    assert!(
        matches!(
            err,
            resolve_payment::ExecutionError::Finalization(
                F::InsufficientCapacity(_)
            ),
        ),
        "expected insufficient capacity, got {err}",
    );

    let bookings = env.db.bookings();
    assert_eq!(bookings.len(), 1);
    assert_eq!(bookings[0].payment_id, Some(first.id));

    let second = reload(&env, &second).await;
    assert_eq!(second.status, payment::Status::Completed);
    assert!(second.booking_id.is_none());
}

#[tokio::test]
async fn overlapping_facility_is_confirmed_by_first_completed_payment_only() {
    use finalize_payment::ExecutionError as F;

    let env = Env::new();
    let item = cabin_item();
    env.seed(&item).await;
    let first = awaiting(env.submit(item.id, cabin_for(3, 6)).await.unwrap());
    let second = awaiting(env.submit(item.id, cabin_for(5, 8)).await.unwrap());

    let paid = complete(&env, &first).await.unwrap();
    assert!(paid.booking_id.is_some());

    let err = complete(&env, &second).await.unwrap_err();
    let resolve_payment::ExecutionError::Finalization(F::FacilityConflict(
        conflict,
    )) = err
    else {
        panic!("expected facility conflict, got {err}");
    };
    assert_eq!(conflict.facility, cabin());

    assert_eq!(env.db.bookings().len(), 1);
    assert!(reload(&env, &second).await.booking_id.is_none());
}
