use super::*;
use crate::notify::RecordingNotifier;
use chrono::NaiveDateTime;
use tokio_test::{assert_err, assert_ok};

fn test_wal_path(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join("agenda_test_engine");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    let _ = std::fs::remove_file(&path);
    path
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, d).unwrap()
}

fn at(date: NaiveDate, h: u32, m: u32) -> NaiveDateTime {
    date.and_hms_opt(h, m, 0).unwrap()
}

/// A Saturday well before the bookings below.
fn now() -> NaiveDateTime {
    at(day(1), 8, 0)
}

const MONDAY: u32 = 10;
const TUESDAY: u32 = 11;

fn slot(s: &str) -> Slot {
    Slot::parse(s).unwrap()
}

fn slots(raw: &[&str]) -> Vec<Slot> {
    raw.iter().map(|s| slot(s)).collect()
}

struct Salon {
    engine: Engine,
    notifier: Arc<RecordingNotifier>,
    service: Ulid,
}

/// Weekdays 09/10/11/14h, one service.
async fn salon(name: &str) -> Salon {
    salon_at(test_wal_path(name)).await
}

async fn salon_at(path: PathBuf) -> Salon {
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = Engine::new(path, notifier.clone()).unwrap();
    engine
        .set_weekly_availability(
            vec![1, 2, 3, 4, 5],
            slots(&["09:00", "10:00", "11:00", "14:00"]),
            false,
            now(),
        )
        .await
        .unwrap();
    let service = Ulid::new();
    engine.create_service(service, "Corte", "45,00").await.unwrap();
    Salon {
        engine,
        notifier,
        service,
    }
}

impl Salon {
    async fn client(&self, name: &str) -> Ulid {
        let id = Ulid::new();
        self.engine
            .register_client(id, name, None, Some("+5511900000000".into()), Role::Customer, now())
            .await
            .unwrap();
        id
    }

    fn request(&self, client: ClientRef, date: NaiveDate, time: &str) -> BookingRequest {
        BookingRequest {
            id: Ulid::new(),
            client,
            service_id: self.service,
            date,
            time: slot(time),
            admin_id: None,
        }
    }

    async fn book(&self, client: Ulid, date: NaiveDate, time: &str) -> Appointment {
        self.engine
            .create_booking(self.request(ClientRef::Existing(client), date, time), now())
            .await
            .unwrap()
            .appointment
    }

    fn status(&self, client: Ulid) -> JourneyState {
        self.engine.get_client(&client).unwrap().status
    }

    fn appt_status(&self, id: Ulid) -> AppointmentStatus {
        self.engine.get_appointment(&id).unwrap().status
    }
}

/// Every write from here on fails as if the disk went away.
fn kill_wal(engine: &mut Engine) {
    let (tx, rx) = tokio::sync::mpsc::channel(1);
    drop(rx);
    engine.wal_tx = tx;
}

// ── Availability ─────────────────────────────────────────

#[tokio::test]
async fn weekday_slots_exclude_taken() {
    let s = salon("weekday_taken.wal").await;
    let ana = s.client("Ana").await;
    s.book(ana, day(MONDAY), "10:00").await;

    assert_eq!(
        s.engine.available_slots(day(MONDAY), now()),
        slots(&["09:00", "11:00", "14:00"])
    );
}

#[tokio::test]
async fn empty_override_closes_working_day() {
    let s = salon("empty_override.wal").await;
    let outcome = s
        .engine
        .set_override(day(MONDAY), vec![], false, now())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        EditOutcome::Committed {
            cancelled: vec![],
            churned: vec![]
        }
    );
    assert!(s.engine.available_slots(day(MONDAY), now()).is_empty());
    assert_eq!(
        s.engine.available_slots(day(TUESDAY), now()).len(),
        4,
        "other dates keep the defaults"
    );
}

#[tokio::test]
async fn weekend_is_closed_without_override() {
    let s = salon("weekend.wal").await;
    assert!(s.engine.available_slots(day(15), now()).is_empty());
    s.engine
        .set_override(day(15), slots(&["10:00"]), false, now())
        .await
        .unwrap();
    assert_eq!(s.engine.available_slots(day(15), now()), slots(&["10:00"]));
}

#[tokio::test]
async fn today_hides_elapsed_slots() {
    let s = salon("today_cutoff.wal").await;
    let free = s.engine.available_slots(day(MONDAY), at(day(MONDAY), 10, 0));
    assert_eq!(free, slots(&["11:00", "14:00"]));
}

#[tokio::test]
async fn no_weekly_configuration_means_no_slots() {
    let notifier = Arc::new(RecordingNotifier::new());
    let engine = Engine::new(test_wal_path("no_weekly.wal"), notifier).unwrap();
    engine
        .set_override(day(MONDAY), slots(&["09:00"]), false, now())
        .await
        .unwrap();
    assert!(engine.available_slots(day(MONDAY), now()).is_empty());
}

// ── Bookings ─────────────────────────────────────────────

#[tokio::test]
async fn booking_a_new_client_registers_and_schedules() {
    let s = salon("book_new_client.wal").await;
    let id = Ulid::new();
    let receipt = s
        .engine
        .create_booking(
            s.request(
                ClientRef::New {
                    id,
                    name: "  Bruna ".into(),
                    email: Some("bruna@example.com".into()),
                    phone: Some("+5511977776666".into()),
                },
                day(MONDAY),
                "09:00",
            ),
            now(),
        )
        .await
        .unwrap();

    assert!(receipt.warning.is_none());
    let client = s.engine.get_client(&id).unwrap();
    assert_eq!(client.name, "Bruna");
    assert_eq!(client.status, JourneyState::Scheduled);
    assert_eq!(receipt.appointment.client_name, "Bruna");
    assert_eq!(receipt.appointment.service_name, "Corte");
    assert_eq!(receipt.appointment.service_price, Price { cents: 4500 });
    assert_eq!(receipt.appointment.status, AppointmentStatus::Scheduled);

    let sent = s.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to.as_deref(), Some("+5511977776666"));
    assert!(sent[0].body.contains("Data: 10/06/2024"));
}

#[tokio::test]
async fn booking_promotes_from_any_state() {
    let s = salon("book_promotes.wal").await;
    let carla = s.client("Carla").await;
    assert_ok!(
        s.engine
            .move_client(carla, JourneyState::Registered, JourneyState::Churned)
            .await
    );
    s.book(carla, day(MONDAY), "09:00").await;
    assert_eq!(s.status(carla), JourneyState::Scheduled);
}

#[tokio::test]
async fn taken_slot_is_rejected_at_commit() {
    let s = salon("slot_taken.wal").await;
    let ana = s.client("Ana").await;
    let bia = s.client("Bia").await;
    s.book(ana, day(MONDAY), "10:00").await;

    let err = s
        .engine
        .create_booking(s.request(ClientRef::Existing(bia), day(MONDAY), "10:00"), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SlotUnavailable { .. }));
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(s.status(bia), JourneyState::Registered);
    assert_eq!(s.engine.appointments_on(day(MONDAY)).len(), 1);
}

#[tokio::test]
async fn slot_outside_the_day_is_rejected() {
    let s = salon("slot_outside.wal").await;
    let ana = s.client("Ana").await;
    let err = s
        .engine
        .create_booking(s.request(ClientRef::Existing(ana), day(MONDAY), "12:00"), now())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SlotUnavailable { .. }));
}

#[tokio::test]
async fn concurrent_bookings_for_one_slot_do_not_double_book() {
    let s = salon("double_book.wal").await;
    let ana = s.client("Ana").await;
    let bia = s.client("Bia").await;
    let engine = Arc::new(s.engine);

    let a = {
        let engine = engine.clone();
        let req = BookingRequest {
            id: Ulid::new(),
            client: ClientRef::Existing(ana),
            service_id: s.service,
            date: day(MONDAY),
            time: slot("09:00"),
            admin_id: None,
        };
        tokio::spawn(async move { engine.create_booking(req, now()).await })
    };
    let b = {
        let engine = engine.clone();
        let req = BookingRequest {
            id: Ulid::new(),
            client: ClientRef::Existing(bia),
            service_id: s.service,
            date: day(MONDAY),
            time: slot("09:00"),
            admin_id: None,
        };
        tokio::spawn(async move { engine.create_booking(req, now()).await })
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());
    assert!(a.is_ok() != b.is_ok(), "exactly one booking wins");
    assert_eq!(engine.appointments_on(day(MONDAY)).len(), 1);
}

#[tokio::test]
async fn booking_in_the_past_is_rejected() {
    let s = salon("book_past.wal").await;
    let ana = s.client("Ana").await;
    let err = s
        .engine
        .create_booking(
            s.request(ClientRef::Existing(ana), day(MONDAY), "09:00"),
            at(day(TUESDAY), 8, 0),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::DateInPast(_)));
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn booking_unknown_service_or_client_is_not_found() {
    let s = salon("book_unknown.wal").await;
    let ana = s.client("Ana").await;
    let mut req = s.request(ClientRef::Existing(ana), day(MONDAY), "09:00");
    req.service_id = Ulid::new();
    assert_eq!(
        s.engine.create_booking(req, now()).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
    let req = s.request(ClientRef::Existing(Ulid::new()), day(MONDAY), "09:00");
    assert_eq!(
        s.engine.create_booking(req, now()).await.unwrap_err().kind(),
        ErrorKind::NotFound
    );
}

#[tokio::test]
async fn notification_failure_is_a_warning() {
    let notifier = Arc::new(RecordingNotifier::failing());
    let engine = Engine::new(test_wal_path("notify_fail.wal"), notifier).unwrap();
    engine
        .set_weekly_availability(vec![1], slots(&["09:00"]), false, now())
        .await
        .unwrap();
    let service = Ulid::new();
    engine.create_service(service, "Escova", "60").await.unwrap();
    let client = Ulid::new();
    engine
        .register_client(client, "Dani", None, None, Role::Customer, now())
        .await
        .unwrap();

    let receipt = engine
        .create_booking(
            BookingRequest {
                id: Ulid::new(),
                client: ClientRef::Existing(client),
                service_id: service,
                date: day(MONDAY),
                time: slot("09:00"),
                admin_id: None,
            },
            now(),
        )
        .await
        .unwrap();
    assert!(receipt.warning.is_some());
    assert!(engine.get_appointment(&receipt.appointment.id).is_some());
    assert_eq!(
        engine.get_client(&client).unwrap().status,
        JourneyState::Scheduled
    );
}

#[tokio::test]
async fn admin_booking_notifies_admin_line() {
    let s = salon("admin_booking.wal").await;
    let ana = s.client("Ana").await;
    let mut req = s.request(ClientRef::Existing(ana), day(MONDAY), "09:00");
    req.admin_id = Some(Ulid::new());
    s.engine.create_booking(req, now()).await.unwrap();
    assert!(s.notifier.sent()[0].to.is_none());
}

// ── Cancellation ─────────────────────────────────────────

#[tokio::test]
async fn cancelling_the_last_booking_churns() {
    let s = salon("cancel_churns.wal").await;
    let ana = s.client("Ana").await;
    let appt = s.book(ana, day(MONDAY), "09:00").await;

    let receipt = s.engine.cancel_booking(appt.id, now()).await.unwrap();
    assert_eq!(receipt.appointment.status, AppointmentStatus::Cancelled);
    assert_eq!(receipt.client_status, Some(JourneyState::Churned));
    assert_eq!(s.appt_status(appt.id), AppointmentStatus::Cancelled);
    assert_eq!(s.status(ana), JourneyState::Churned);
    assert_eq!(
        s.engine.available_slots(day(MONDAY), now()).len(),
        4,
        "slot is free again"
    );
}

#[tokio::test]
async fn cancelling_keeps_status_while_another_booking_remains() {
    let s = salon("cancel_keeps.wal").await;
    let ana = s.client("Ana").await;
    let first = s.book(ana, day(MONDAY), "09:00").await;
    s.book(ana, day(TUESDAY), "09:00").await;

    let receipt = s.engine.cancel_booking(first.id, now()).await.unwrap();
    assert_eq!(receipt.client_status, Some(JourneyState::Scheduled));
    assert_eq!(s.status(ana), JourneyState::Scheduled);
}

#[tokio::test]
async fn cancelling_twice_is_rejected() {
    let s = salon("cancel_twice.wal").await;
    let ana = s.client("Ana").await;
    let appt = s.book(ana, day(MONDAY), "09:00").await;
    assert_ok!(s.engine.cancel_booking(appt.id, now()).await);

    let err = s.engine.cancel_booking(appt.id, now()).await.unwrap_err();
    assert!(matches!(err, EngineError::NotScheduled(_)));
    assert_eq!(s.engine.client_stats(&ana).unwrap().cancellations, 1);
    assert_err!(s.engine.cancel_booking(Ulid::new(), now()).await);
}

/// Weekdays of June 2024 from the 10th on.
fn june_weekdays() -> Vec<NaiveDate> {
    [10, 11, 12, 13, 14, 17, 18, 19, 20, 21].into_iter().map(day).collect()
}

/// Whichever write lands first, the loser must fail and the board must agree
/// with the appointment row.
fn assert_consistent(
    engine: &Engine,
    client: Ulid,
    appt: Ulid,
    cancel_won: bool,
    complete_won: bool,
) {
    assert!(cancel_won != complete_won, "exactly one write wins");
    let status = engine.get_client(&client).unwrap().status;
    match engine.get_appointment(&appt).unwrap().status {
        AppointmentStatus::Completed => {
            assert!(complete_won);
            assert_eq!(status, JourneyState::Completed);
        }
        AppointmentStatus::Cancelled => {
            assert!(cancel_won);
            assert_eq!(status, JourneyState::Churned);
        }
        AppointmentStatus::Scheduled => panic!("appointment left scheduled"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cancel_racing_completion_settles_one_way() {
    let s = salon("cancel_vs_complete.wal").await;
    let mut pairs = Vec::new();
    for date in june_weekdays() {
        for time in ["09:00", "10:00", "11:00", "14:00"] {
            let client = s.client("Cora").await;
            let appt = s.book(client, date, time).await;
            pairs.push((client, appt.id));
        }
    }
    let engine = Arc::new(s.engine);

    for (client, appt) in pairs {
        let cancel = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.cancel_booking(appt, now()).await })
        };
        let complete = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .move_client(client, JourneyState::Scheduled, JourneyState::Completed)
                    .await
            })
        };
        let (cancel, complete) = (cancel.await.unwrap(), complete.await.unwrap());
        assert_consistent(&engine, client, appt, cancel.is_ok(), complete.is_ok());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn closing_a_day_racing_completion_settles_one_way() {
    let s = salon("close_vs_complete.wal").await;
    let mut booked = Vec::new();
    for date in june_weekdays() {
        let client = s.client("Cora").await;
        let appt = s.book(client, date, "09:00").await;
        booked.push((date, client, appt.id));
    }
    let engine = Arc::new(s.engine);

    for (date, client, appt) in booked {
        let close = {
            let engine = engine.clone();
            tokio::spawn(async move { engine.set_override(date, vec![], true, now()).await })
        };
        let complete = {
            let engine = engine.clone();
            tokio::spawn(async move {
                engine
                    .move_client(client, JourneyState::Scheduled, JourneyState::Completed)
                    .await
            })
        };
        let closed = match close.await.unwrap().unwrap() {
            EditOutcome::Committed { cancelled, .. } => cancelled.contains(&appt),
            EditOutcome::NeedsConfirmation(_) => panic!("confirmed edit asked again"),
        };
        let completed = complete.await.unwrap().is_ok();
        assert_consistent(&engine, client, appt, closed, completed);
    }
}

// ── Journey ──────────────────────────────────────────────

#[tokio::test]
async fn two_bookings_suspend_a_churn_until_resolved() {
    let s = salon("scenario_c.wal").await;
    let c = s.client("Cida").await;
    let a1 = s.book(c, day(MONDAY), "09:00").await;
    let a2 = s.book(c, day(TUESDAY), "10:00").await;

    let outcome = s
        .engine
        .move_client(c, JourneyState::Scheduled, JourneyState::Churned)
        .await
        .unwrap();
    let TransitionOutcome::PendingConfirmation(set) = outcome else {
        panic!("expected a suspended transition");
    };
    let mut ids: Vec<Ulid> = set.appointments.iter().map(|a| a.id).collect();
    ids.sort();
    let mut expected = vec![a1.id, a2.id];
    expected.sort();
    assert_eq!(ids, expected);
    assert_eq!(s.status(c), JourneyState::Scheduled);
    assert_eq!(s.appt_status(a1.id), AppointmentStatus::Scheduled);
    assert_eq!(s.engine.pending_conflict(&c), Some(set));

    let done = s
        .engine
        .resolve_conflict(c, &[a1.id, a2.id])
        .await
        .unwrap();
    assert_eq!(done, ConfirmOutcome::Committed(JourneyState::Churned));
    assert_eq!(s.status(c), JourneyState::Churned);
    assert_eq!(s.appt_status(a1.id), AppointmentStatus::Cancelled);
    assert_eq!(s.appt_status(a2.id), AppointmentStatus::Cancelled);
    assert!(s.engine.pending_conflict(&c).is_none());
}

#[tokio::test]
async fn partial_resolution_vetoes_the_move() {
    let s = salon("partial_veto.wal").await;
    let c = s.client("Cida").await;
    let a1 = s.book(c, day(MONDAY), "09:00").await;
    let a2 = s.book(c, day(TUESDAY), "10:00").await;
    s.engine
        .move_client(c, JourneyState::Scheduled, JourneyState::NoShow)
        .await
        .unwrap();

    let outcome = s.engine.resolve_conflict(c, &[a1.id]).await.unwrap();
    let ConfirmOutcome::Vetoed { remaining } = outcome else {
        panic!("expected a veto");
    };
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, a2.id);
    assert_eq!(s.status(c), JourneyState::Scheduled);
    assert_eq!(s.appt_status(a1.id), AppointmentStatus::Cancelled);
    assert_eq!(s.appt_status(a2.id), AppointmentStatus::Scheduled);
    assert!(s.engine.pending_conflict(&c).is_none());
}

#[tokio::test]
async fn bad_resolutions_keep_the_suspension() {
    let s = salon("bad_resolution.wal").await;
    let c = s.client("Cida").await;
    let a1 = s.book(c, day(MONDAY), "09:00").await;
    s.book(c, day(TUESDAY), "10:00").await;
    s.engine
        .move_client(c, JourneyState::Scheduled, JourneyState::Churned)
        .await
        .unwrap();

    let empty = s.engine.resolve_conflict(c, &[]).await.unwrap_err();
    assert_eq!(empty.kind(), ErrorKind::Validation);

    let foreign = s.engine.resolve_conflict(c, &[Ulid::new()]).await.unwrap_err();
    assert_eq!(foreign.kind(), ErrorKind::Validation);

    let completed = s
        .engine
        .confirm_transition(c, vec![(a1.id, AppointmentStatus::Completed)])
        .await
        .unwrap_err();
    assert_eq!(completed.kind(), ErrorKind::Validation);

    assert!(s.engine.pending_conflict(&c).is_some());
    assert_eq!(s.appt_status(a1.id), AppointmentStatus::Scheduled);
}

#[tokio::test]
async fn completing_with_several_bookings_accepts_completed_outcomes() {
    let s = salon("complete_many.wal").await;
    let c = s.client("Cida").await;
    let a1 = s.book(c, day(MONDAY), "09:00").await;
    let a2 = s.book(c, day(TUESDAY), "10:00").await;
    s.engine
        .move_client(c, JourneyState::Scheduled, JourneyState::Completed)
        .await
        .unwrap();

    let outcome = s
        .engine
        .confirm_transition(
            c,
            vec![
                (a1.id, AppointmentStatus::Completed),
                (a2.id, AppointmentStatus::Cancelled),
            ],
        )
        .await
        .unwrap();
    assert_eq!(outcome, ConfirmOutcome::Committed(JourneyState::Completed));
    assert_eq!(s.appt_status(a1.id), AppointmentStatus::Completed);
    assert_eq!(s.appt_status(a2.id), AppointmentStatus::Cancelled);
}

#[tokio::test]
async fn abandoning_writes_nothing() {
    let s = salon("abandon.wal").await;
    let c = s.client("Cida").await;
    s.book(c, day(MONDAY), "09:00").await;
    s.book(c, day(TUESDAY), "10:00").await;
    s.engine
        .move_client(c, JourneyState::Scheduled, JourneyState::Churned)
        .await
        .unwrap();

    let set = s.engine.abandon_transition(c).unwrap();
    assert_eq!(set.to, JourneyState::Churned);
    assert!(s.engine.pending_conflict(&c).is_none());
    assert_eq!(s.status(c), JourneyState::Scheduled);
    assert!(matches!(
        s.engine.abandon_transition(c),
        Err(EngineError::NoPendingTransition(_))
    ));
    assert!(matches!(
        s.engine.resolve_conflict(c, &[]).await,
        Err(EngineError::NoPendingTransition(_))
    ));
}

#[tokio::test]
async fn single_booking_completes_in_one_step() {
    let s = salon("scenario_d.wal").await;
    let d = s.client("Duda").await;
    let appt = s.book(d, day(MONDAY), "11:00").await;

    let outcome = s
        .engine
        .move_client(d, JourneyState::Scheduled, JourneyState::Completed)
        .await
        .unwrap();
    assert_eq!(
        outcome,
        TransitionOutcome::Applied {
            settled: vec![(appt.id, AppointmentStatus::Completed)]
        }
    );
    assert_eq!(s.status(d), JourneyState::Completed);
    assert_eq!(s.appt_status(appt.id), AppointmentStatus::Completed);
}

#[tokio::test]
async fn single_booking_is_cancelled_on_churn() {
    let s = salon("single_churn.wal").await;
    let d = s.client("Duda").await;
    let appt = s.book(d, day(MONDAY), "11:00").await;
    s.engine
        .move_client(d, JourneyState::Scheduled, JourneyState::Churned)
        .await
        .unwrap();
    assert_eq!(s.appt_status(appt.id), AppointmentStatus::Cancelled);
    assert!(s.engine.client_bookings(&d, now()).is_empty());
}

#[tokio::test]
async fn registered_cannot_jump_to_completed() {
    let s = salon("skip_to_completed.wal").await;
    let e = s.client("Elis").await;
    let err = s
        .engine
        .move_client(e, JourneyState::Registered, JourneyState::Completed)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::CompletedRequiresScheduled { .. }));
    assert_eq!(s.status(e), JourneyState::Registered);
}

#[tokio::test]
async fn forward_moves_and_backward_guard() {
    let s = salon("forward_backward.wal").await;
    let e = s.client("Elis").await;
    assert_eq!(
        s.engine
            .move_client(e, JourneyState::Registered, JourneyState::Contacted)
            .await
            .unwrap(),
        TransitionOutcome::Applied { settled: vec![] }
    );
    let err = s
        .engine
        .move_client(e, JourneyState::Contacted, JourneyState::Registered)
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "cannot move to an earlier stage (contatado -> cadastrado)");
    assert_eq!(s.status(e), JourneyState::Contacted);
}

#[tokio::test]
async fn stale_and_same_state_moves() {
    let s = salon("stale_move.wal").await;
    let f = s.client("Fabi").await;
    let stale = s
        .engine
        .move_client(f, JourneyState::Contacted, JourneyState::Churned)
        .await
        .unwrap_err();
    assert!(matches!(stale, EngineError::StaleState { .. }));
    assert_eq!(stale.kind(), ErrorKind::Conflict);

    assert_eq!(
        s.engine
            .move_client(f, JourneyState::Registered, JourneyState::Registered)
            .await
            .unwrap(),
        TransitionOutcome::Unchanged
    );
}

#[tokio::test]
async fn board_load_marks_past_bookings_as_no_show() {
    let s = salon("no_show.wal").await;
    let g = s.client("Gabi").await;
    let h = s.client("Helo").await;
    let past = s.book(g, day(MONDAY), "09:00").await;
    s.book(h, day(TUESDAY), "09:00").await;

    let board = s.engine.load_board(at(day(MONDAY), 10, 0)).await;
    assert_eq!(board.reconciled, vec![g]);
    assert_eq!(board.column(JourneyState::NoShow).len(), 1);
    assert_eq!(board.column(JourneyState::Scheduled)[0].id, h);
    assert_eq!(s.appt_status(past.id), AppointmentStatus::Scheduled);

    let again = s.engine.load_board(at(day(MONDAY), 10, 0)).await;
    assert!(again.reconciled.is_empty());
}

#[tokio::test]
async fn board_lists_customers_only_in_journey_order() {
    let s = salon("board_order.wal").await;
    s.client("zilda").await;
    s.client("Amanda").await;
    s.engine
        .register_client(Ulid::new(), "Admin", None, None, Role::Admin, now())
        .await
        .unwrap();

    let board = s.engine.load_board(now()).await;
    let states: Vec<JourneyState> = board.columns.iter().map(|c| c.state).collect();
    assert_eq!(states, JourneyState::ALL.to_vec());
    let names: Vec<&str> = board
        .column(JourneyState::Registered)
        .iter()
        .map(|c| c.name.as_str())
        .collect();
    assert_eq!(names, vec!["Amanda", "zilda"]);
}

// ── Availability editor ──────────────────────────────────

#[tokio::test]
async fn shrinking_defaults_reports_orphaned_bookings() {
    let s = salon("scenario_e.wal").await;
    let i = s.client("Iara").await;
    let appt = s.book(i, day(MONDAY), "14:00").await;

    let outcome = s
        .engine
        .set_weekly_availability(
            vec![1, 2, 3, 4, 5],
            slots(&["09:00", "10:00", "11:00"]),
            false,
            now(),
        )
        .await
        .unwrap();
    let EditOutcome::NeedsConfirmation(conflicts) = outcome else {
        panic!("expected a conflict");
    };
    assert_eq!(conflicts.len(), 1);
    assert_eq!(conflicts[0].id, appt.id);
    assert_eq!(
        s.engine.weekly_availability().unwrap().default_time_slots.len(),
        4,
        "nothing saved"
    );

    let outcome = s
        .engine
        .set_weekly_availability(
            vec![1, 2, 3, 4, 5],
            slots(&["09:00", "10:00", "11:00"]),
            true,
            now(),
        )
        .await
        .unwrap();
    assert_eq!(
        outcome,
        EditOutcome::Committed {
            cancelled: vec![appt.id],
            churned: vec![i]
        }
    );
    assert_eq!(s.appt_status(appt.id), AppointmentStatus::Cancelled);
    assert_eq!(s.status(i), JourneyState::Churned);
}

#[tokio::test]
async fn dropping_a_working_day_orphans_its_bookings() {
    let s = salon("drop_day.wal").await;
    let i = s.client("Iara").await;
    s.book(i, day(MONDAY), "09:00").await;
    let outcome = s
        .engine
        .set_weekly_availability(
            vec![2, 3, 4, 5],
            slots(&["09:00", "10:00", "11:00", "14:00"]),
            false,
            now(),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, EditOutcome::NeedsConfirmation(ref c) if c.len() == 1));
}

#[tokio::test]
async fn overridden_dates_ignore_default_changes() {
    let s = salon("override_shields.wal").await;
    let i = s.client("Iara").await;
    s.engine
        .set_override(day(MONDAY), slots(&["14:00"]), false, now())
        .await
        .unwrap();
    s.book(i, day(MONDAY), "14:00").await;
    let outcome = s
        .engine
        .set_weekly_availability(vec![1, 2, 3, 4, 5], slots(&["09:00"]), false, now())
        .await
        .unwrap();
    assert!(matches!(outcome, EditOutcome::Committed { .. }));
}

#[tokio::test]
async fn override_shrink_needs_confirmation() {
    let s = salon("override_shrink.wal").await;
    let j = s.client("Jade").await;
    let k = s.client("Kika").await;
    let keep = s.book(j, day(MONDAY), "09:00").await;
    let orphan = s.book(k, day(MONDAY), "11:00").await;
    s.book(k, day(TUESDAY), "11:00").await;

    let outcome = s
        .engine
        .set_override(day(MONDAY), slots(&["09:00", "10:00"]), false, now())
        .await
        .unwrap();
    assert_eq!(outcome, EditOutcome::NeedsConfirmation(vec![
        s.engine.get_appointment(&orphan.id).unwrap()
    ]));
    assert!(s.engine.list_overrides().is_empty());

    let outcome = s
        .engine
        .set_override(day(MONDAY), slots(&["09:00", "10:00"]), true, now())
        .await
        .unwrap();
    assert_eq!(
        outcome,
        EditOutcome::Committed {
            cancelled: vec![orphan.id],
            churned: vec![]
        }
    );
    assert_eq!(s.appt_status(keep.id), AppointmentStatus::Scheduled);
    assert_eq!(s.status(k), JourneyState::Scheduled, "Tuesday booking remains");
    assert_eq!(s.engine.list_overrides()[0].date, day(MONDAY));
}

#[tokio::test]
async fn deleting_an_override_reverts_with_confirmation() {
    let s = salon("delete_override.wal").await;
    let l = s.client("Lia").await;
    s.engine
        .set_override(day(MONDAY), slots(&["09:00", "15:00"]), false, now())
        .await
        .unwrap();
    let late = s.book(l, day(MONDAY), "15:00").await;

    let outcome = s.engine.delete_override(day(MONDAY), false, now()).await.unwrap();
    assert!(matches!(outcome, EditOutcome::NeedsConfirmation(ref c) if c[0].id == late.id));

    let outcome = s.engine.delete_override(day(MONDAY), true, now()).await.unwrap();
    assert_eq!(
        outcome,
        EditOutcome::Committed {
            cancelled: vec![late.id],
            churned: vec![l]
        }
    );
    assert!(s.engine.list_overrides().is_empty());
    assert_eq!(s.engine.available_slots(day(MONDAY), now()).len(), 4);

    let err = s.engine.delete_override(day(MONDAY), false, now()).await.unwrap_err();
    assert!(matches!(err, EngineError::OverrideNotFound(_)));
}

// ── Catalog and clients ──────────────────────────────────

#[tokio::test]
async fn service_catalog_validation() {
    let s = salon("services.wal").await;
    let bad_price = s.engine.create_service(Ulid::new(), "Luzes", "abc").await;
    assert!(matches!(bad_price, Err(EngineError::Invalid(_))));
    let no_name = s.engine.create_service(Ulid::new(), "   ", "10").await;
    assert!(matches!(no_name, Err(EngineError::Validation(_))));

    assert_ok!(s.engine.update_service(s.service, "Corte feminino", "R$ 80,00").await);
    let listed = s.engine.list_services();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].price.to_string(), "R$ 80,00");

    assert_ok!(s.engine.delete_service(s.service).await);
    assert!(s.engine.list_services().is_empty());
    assert_err!(s.engine.delete_service(s.service).await);
}

#[tokio::test]
async fn appointments_keep_their_price_snapshot() {
    let s = salon("price_snapshot.wal").await;
    let m = s.client("Mari").await;
    let appt = s.book(m, day(MONDAY), "09:00").await;
    s.engine
        .update_service(s.service, "Corte", "99")
        .await
        .unwrap();
    assert_eq!(
        s.engine.get_appointment(&appt.id).unwrap().service_price,
        Price { cents: 4500 }
    );
}

#[tokio::test]
async fn client_registration_and_notes() {
    let s = salon("clients.wal").await;
    let n = s.client("Nina").await;
    let dup = s
        .engine
        .register_client(n, "Nina", None, None, Role::Customer, now())
        .await;
    assert!(matches!(dup, Err(EngineError::AlreadyExists(_))));

    s.engine
        .update_client_notes(n, Some("alérgica a amônia".into()))
        .await
        .unwrap();
    assert_eq!(
        s.engine.get_client(&n).unwrap().notes.as_deref(),
        Some("alérgica a amônia")
    );
    s.engine.update_client_notes(n, Some("  ".into())).await.unwrap();
    assert!(s.engine.get_client(&n).unwrap().notes.is_none());
}

#[tokio::test]
async fn client_stats_and_listings() {
    let s = salon("stats.wal").await;
    let escova = Ulid::new();
    s.engine.create_service(escova, "Escova", "60").await.unwrap();
    let o = s.client("Olga").await;

    let first = s.book(o, day(3), "09:00").await;
    s.engine
        .move_client(o, JourneyState::Scheduled, JourneyState::Completed)
        .await
        .unwrap();
    let mut second = s.request(ClientRef::Existing(o), day(4), "10:00");
    second.service_id = escova;
    s.engine.create_booking(second, now()).await.unwrap();
    let cancelled = s.book(o, day(MONDAY), "09:00").await;
    s.engine.cancel_booking(cancelled.id, now()).await.unwrap();

    let stats = s.engine.client_stats(&o).unwrap();
    assert_eq!(stats.total_visits, 1);
    assert_eq!(stats.cancellations, 1);
    assert_eq!(stats.most_frequent_service.as_deref(), Some("Corte"));
    assert_eq!(stats.last_visit, Some(first.date));

    let history = s.engine.client_history(&o);
    assert_eq!(history.len(), 3);
    assert_eq!(history[0].id, cancelled.id, "newest first");

    assert_eq!(s.engine.upcoming_appointments(now().date()).len(), 1);
    assert_eq!(s.engine.client_bookings(&o, now()).len(), 1);
    assert!(s.engine.client_stats(&Ulid::new()).is_err());
}

// ── Persistence ──────────────────────────────────────────

#[tokio::test]
async fn failed_write_leaves_state_untouched() {
    let mut s = salon("wal_failure.wal").await;
    let p = s.client("Paula").await;
    let appt = s.book(p, day(MONDAY), "09:00").await;
    kill_wal(&mut s.engine);

    let err = s
        .engine
        .move_client(p, JourneyState::Scheduled, JourneyState::Completed)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(s.status(p), JourneyState::Scheduled);
    assert_eq!(s.appt_status(appt.id), AppointmentStatus::Scheduled);

    let err = s
        .engine
        .create_booking(s.request(ClientRef::Existing(p), day(TUESDAY), "09:00"), now())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(s.engine.client_history(&p).len(), 1);
    assert!(s.notifier.sent().len() == 1, "no notice for a failed booking");

    let err = s.engine.cancel_booking(appt.id, now()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(s.appt_status(appt.id), AppointmentStatus::Scheduled);
}

#[tokio::test]
async fn state_survives_restart() {
    let path = test_wal_path("restart.wal");
    let (q, appt) = {
        let s = salon_at(path.clone()).await;
        let q = s.client("Quel").await;
        let appt = s.book(q, day(MONDAY), "10:00").await;
        s.engine
            .set_override(day(TUESDAY), vec![], false, now())
            .await
            .unwrap();
        s.engine
            .update_client_notes(q, Some("pontual".into()))
            .await
            .unwrap();
        (q, appt)
    };

    let engine = Engine::new(path, Arc::new(RecordingNotifier::new())).unwrap();
    let client = engine.get_client(&q).unwrap();
    assert_eq!(client.status, JourneyState::Scheduled);
    assert_eq!(client.notes.as_deref(), Some("pontual"));
    assert_eq!(engine.get_appointment(&appt.id), Some(appt));
    assert!(engine.available_slots(day(TUESDAY), now()).is_empty());
    assert_eq!(
        engine.available_slots(day(MONDAY), now()),
        slots(&["09:00", "11:00", "14:00"])
    );
}

#[tokio::test]
async fn compaction_keeps_state_and_resets_counter() {
    let path = test_wal_path("compaction.wal");
    let s = salon_at(path.clone()).await;
    let r = s.client("Rita").await;
    for time in ["09:00", "10:00", "11:00"] {
        let appt = s.book(r, day(MONDAY), time).await;
        s.engine.cancel_booking(appt.id, now()).await.unwrap();
    }
    let kept = s.book(r, day(TUESDAY), "14:00").await;
    assert!(s.engine.wal_appends_since_compact().await > 0);

    s.engine.compact_wal().await.unwrap();
    assert_eq!(s.engine.wal_appends_since_compact().await, 0);

    let reopened = Engine::new(path, Arc::new(RecordingNotifier::new())).unwrap();
    assert_eq!(reopened.get_client(&r), s.engine.get_client(&r));
    assert_eq!(reopened.get_client(&r).unwrap().status, JourneyState::Scheduled);
    assert_eq!(reopened.client_history(&r).len(), 4);
    assert_eq!(reopened.get_appointment(&kept.id), Some(kept));
    assert_eq!(reopened.weekly_availability(), s.engine.weekly_availability());
}

#[tokio::test]
async fn refresh_rebuilds_and_invalidate_drops_suspensions() {
    let s = salon("refresh.wal").await;
    let t = s.client("Tati").await;
    s.book(t, day(MONDAY), "09:00").await;
    s.book(t, day(TUESDAY), "09:00").await;
    s.engine
        .move_client(t, JourneyState::Scheduled, JourneyState::Churned)
        .await
        .unwrap();
    assert!(s.engine.pending_conflict(&t).is_some());

    s.engine.invalidate();
    assert!(s.engine.pending_conflict(&t).is_none());

    s.engine.refresh().await.unwrap();
    assert_eq!(s.status(t), JourneyState::Scheduled);
    assert_eq!(s.engine.client_history(&t).len(), 2);
    assert_eq!(s.engine.list_services().len(), 1);
}
