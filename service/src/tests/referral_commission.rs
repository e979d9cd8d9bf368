use common::{operations::Insert, Handler as _};

use crate::{
    command::{
        award_commission, AwardCommission, FinalizePayment, SubmitReservation,
        Submission,
    },
    domain::{item, referral, PaymentMethod},
};

use super::{
    adults, awaiting, guest, kes, paid_item, referrer, slot_item, Env,
};

#[tokio::test]
async fn referred_booking_earns_single_commission() {
    let env = Env::new();
    let item = paid_item(10);
    env.seed(&item).await;
    let partner = referrer("SAFARI-PARTNER");
    env.db.execute(Insert(partner.clone())).await.unwrap();

    let submission = env
        .service
        .execute(SubmitReservation {
            item_id: item.id,
            request: adults(2),
            payer: guest(),
            method: PaymentMethod::MobileMoney,
            referral: Some(partner.code.clone()),
        })
        .await
        .unwrap();
    let payment = awaiting(submission);

    let completed = env.resolve(&payment, 0).await;
    let booking_id = completed.booking_id.unwrap();

    // Duplicated webhook delivery and repeated finalization.
    _ = env.resolve(&payment, 0).await;
    let booking = env
        .service
        .execute(FinalizePayment {
            payment_id: payment.id,
        })
        .await
        .unwrap();
    assert_eq!(booking.id, booking_id);
    assert_eq!(booking.referral.as_ref(), Some(&partner.code));

    let commissions = env.db.commissions();
    assert_eq!(commissions.len(), 1);
    assert_eq!(commissions[0].booking_id, booking_id);
    assert_eq!(commissions[0].referrer_id, partner.id);
    assert_eq!(commissions[0].amount, kes("300"));

    let again = env
        .service
        .execute(AwardCommission {
            booking_id,
            amount: booking.total,
            code: partner.code.clone(),
        })
        .await
        .unwrap();
    assert_eq!(again, commissions[0]);
    assert_eq!(env.db.commissions().len(), 1);
}

#[tokio::test]
async fn free_booking_earns_nothing() {
    let env = Env::new();
    let item = slot_item(10, item::Entrance::Free);
    env.seed(&item).await;
    let partner = referrer("SAFARI-PARTNER");
    env.db.execute(Insert(partner.clone())).await.unwrap();

    let submission = env
        .service
        .execute(SubmitReservation {
            item_id: item.id,
            request: adults(1),
            payer: guest(),
            method: PaymentMethod::MobileMoney,
            referral: Some(partner.code),
        })
        .await
        .unwrap();

    assert!(matches!(submission, Submission::Confirmed(_)));
    assert!(env.db.commissions().is_empty());
}

#[tokio::test]
async fn unknown_referral_is_reported() {
    let env = Env::new();

    let err = env
        .service
        .execute(AwardCommission {
            booking_id: crate::domain::booking::Id::new(),
            amount: kes("1000"),
            code: referral::Code::new("NOBODY").unwrap(),
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err.as_ref(),
        award_commission::ExecutionError::UnknownReferral(_),
    ));
    assert!(env.db.commissions().is_empty());
}
